//! Expression checking.
//!
//! Unsuffixed integer literals have no type of their own: they adopt the
//! type the context expects (an integer annotation, the other operand of a
//! binary operator, a generic parameter already bound) and default to
//! `I32`. Chains built only from such literals are folded at compile time.

use tracing::trace;

use super::{Checker, Item, SubstValue};
use crate::ast::{BinaryOp, Expr, ExprKind, Ident, TypeExpr, UnaryOp};
use crate::error::CoreError;
use crate::hir::{Callee, HirExpr, HirExprKind};
use crate::intrinsics::find_intrinsic;
use crate::lower;
use crate::mono::{Bindings, GenericArg};
use crate::resolve::{
    check_binary, check_range, decode_escapes, resolve_annotation, resolve_char, resolve_float,
    resolve_int, resolve_negated_int,
};
use crate::span::Span;
use crate::types::{ArrayDim, Primitive, PrimitiveClass, PrimitiveTable, TypeRef};

/// Where an lvalue ultimately lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Place {
    /// Rooted in a local binding.
    Binding(String),
    /// Reached through a pointer of the given mutability.
    Through { mutable: bool },
}

pub(super) fn place_of(expr: &HirExpr) -> Option<Place> {
    match &expr.kind {
        HirExprKind::Var(name) => Some(Place::Binding(name.clone())),
        HirExprKind::Field {
            base,
            through_pointer: true,
            ..
        }
        | HirExprKind::Deref(base) => match &base.ty {
            TypeRef::Pointer { mutable, .. } => Some(Place::Through { mutable: *mutable }),
            _ => None,
        },
        HirExprKind::Field { base, .. } | HirExprKind::Index { base, .. } | HirExprKind::Paren(base) => {
            place_of(base)
        }
        _ => None,
    }
}

pub(super) fn strip_parens(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Paren(inner) => strip_parens(inner),
        _ => expr,
    }
}

/// Whether `expr` is built only from unsuffixed integer literals.
pub(super) fn is_flexible(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Int(text) => text.bytes().all(|b| b.is_ascii_digit() || b == b'_'),
        ExprKind::Paren(inner) => is_flexible(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => is_flexible(operand),
        ExprKind::Binary { op, lhs, rhs } if op.is_arithmetic() => {
            is_flexible(lhs) && is_flexible(rhs)
        }
        _ => false,
    }
}

/// Fold an integer-literal chain with C semantics (truncating division).
pub(super) fn const_eval(table: &PrimitiveTable, expr: &Expr) -> Result<i128, CoreError> {
    match &expr.kind {
        ExprKind::Int(text) => Ok(resolve_int(table, text, expr.span)?.value),
        ExprKind::Paren(inner) => const_eval(table, inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => Ok(-const_eval(table, operand)?),
        ExprKind::Binary { op, lhs, rhs } => {
            let left = const_eval(table, lhs)?;
            let right = const_eval(table, rhs)?;
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && right == 0 {
                return Err(CoreError::range(
                    expr.span,
                    "division by zero in constant expression",
                ));
            }
            let value = match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Sub => left.checked_sub(right),
                BinaryOp::Mul => left.checked_mul(right),
                BinaryOp::Div => left.checked_div(right),
                BinaryOp::Rem => left.checked_rem(right),
                _ => None,
            };
            value.ok_or_else(|| CoreError::range(expr.span, "constant expression overflows"))
        }
        _ => Err(CoreError::type_error(expr.span, "not a constant expression")),
    }
}

impl<'p> Checker<'p> {
    /// Check `expr` and convert it to `target`, wrapping union members.
    pub(super) fn check_against(
        &mut self,
        expr: &Expr,
        target: &TypeRef,
    ) -> Result<HirExpr, CoreError> {
        let value = self.check_expr(expr, Some(target))?;
        self.coerce(value, target).map_err(|value| {
            CoreError::type_error(expr.span, format!("expected {target}, found {}", value.ty))
        })
    }

    /// `Err` hands the value back when it cannot be stored as `target`.
    pub(super) fn coerce(&self, value: HirExpr, target: &TypeRef) -> Result<HirExpr, HirExpr> {
        if value.ty.assignable_to(target) {
            return Ok(value);
        }
        if let TypeRef::Union { members, .. } = target {
            if let Some(tag) = members.iter().position(|m| value.ty.assignable_to(m)) {
                return Ok(HirExpr::new(
                    HirExprKind::UnionLit {
                        tag,
                        value: Box::new(value),
                    },
                    target.clone(),
                ));
            }
        }
        Err(value)
    }

    pub(super) fn check_expr(
        &mut self,
        expr: &Expr,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        let span = expr.span;
        if is_flexible(expr) {
            let value = const_eval(self.table, expr)?;
            let primitive = self.flexible_int_type(expected);
            check_range(self.table, value, primitive, span)?;
            return Ok(HirExpr::int(value, TypeRef::Primitive(primitive)));
        }
        match &expr.kind {
            ExprKind::Int(text) => {
                let literal = resolve_int(self.table, text, span)?;
                let primitive = literal.suffix.unwrap_or(Primitive::I32);
                Ok(HirExpr::int(literal.value, TypeRef::Primitive(primitive)))
            }
            ExprKind::Float(text) => {
                let (number, mut primitive) = resolve_float(self.table, text, span)?;
                if !text.contains('F') && expected == Some(&TypeRef::Primitive(Primitive::F64)) {
                    primitive = Primitive::F64;
                }
                Ok(HirExpr::new(
                    HirExprKind::Float(number),
                    TypeRef::Primitive(primitive),
                ))
            }
            ExprKind::Bool(value) => Ok(HirExpr::new(HirExprKind::Bool(*value), TypeRef::BOOL)),
            ExprKind::Char(content) => {
                let byte = resolve_char(content, span)?;
                Ok(HirExpr::int(i128::from(byte), TypeRef::U8))
            }
            ExprKind::Str(content) => self.check_string(content, span, expected),
            ExprKind::Ident(name) => self.check_ident(name, span),
            ExprKind::Array(elements) => self.check_array(elements, span, expected),
            ExprKind::StructLit {
                name,
                type_args,
                fields,
            } => self.check_struct_lit(name, type_args, fields, span, expected),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, span, expected),
            ExprKind::Ref { mutable, operand } => self.check_ref(*mutable, operand, span),
            ExprKind::Deref(operand) => {
                let pointer = self.check_expr(operand, None)?;
                let TypeRef::Pointer { target, .. } = &pointer.ty else {
                    return Err(CoreError::borrow(
                        span,
                        format!("cannot dereference a value of type {}", pointer.ty),
                    ));
                };
                let ty = (**target).clone();
                Ok(HirExpr::new(HirExprKind::Deref(Box::new(pointer)), ty))
            }
            ExprKind::Binary { op, lhs, rhs } => self.check_binary_expr(*op, lhs, rhs, span, expected),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.check_call(callee, type_args, args, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.check_method_call(receiver, method, args, span),
            ExprKind::Field { base, field } => self.check_field(base, field),
            ExprKind::Index { base, index } => self.check_index(base, index, span),
            ExprKind::Is { operand, ty } => self.check_is(operand, ty),
            ExprKind::Paren(inner) => {
                let inner = self.check_expr(inner, expected)?;
                let ty = inner.ty.clone();
                Ok(HirExpr::new(HirExprKind::Paren(Box::new(inner)), ty))
            }
        }
    }

    /// Type an unsuffixed literal takes from its context.
    fn flexible_int_type(&self, expected: Option<&TypeRef>) -> Primitive {
        match expected {
            Some(TypeRef::Primitive(p)) if self.table.is_integer(*p) => *p,
            Some(TypeRef::Union { members, .. }) => {
                if members.contains(&TypeRef::I32) {
                    return Primitive::I32;
                }
                members
                    .iter()
                    .filter_map(TypeRef::primitive)
                    .find(|p| self.table.is_integer(*p))
                    .unwrap_or(Primitive::I32)
            }
            _ => Primitive::I32,
        }
    }

    fn check_string(
        &mut self,
        content: &str,
        span: Span,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        let bytes = decode_escapes(content).map_err(|bad| {
            CoreError::array(
                span,
                format!("invalid escape sequence '\\{bad}' in string literal"),
            )
        })?;
        if let Some(TypeRef::CStr) = expected {
            return Ok(HirExpr::new(HirExprKind::CString(bytes), TypeRef::CStr));
        }
        let ty = match expected {
            Some(
                ty @ TypeRef::Array {
                    element,
                    dims,
                },
            ) if **element == TypeRef::U8 && dims.len() == 1 => {
                if dims[0] != ArrayDim::Known(bytes.len() as u64) {
                    return Err(CoreError::array(
                        span,
                        format!(
                            "string literal has {} characters, which does not fit {ty}",
                            bytes.len()
                        ),
                    ));
                }
                ty.clone()
            }
            _ => {
                if bytes.is_empty() {
                    return Err(CoreError::array(span, "empty string literal"));
                }
                TypeRef::array(TypeRef::U8, vec![bytes.len() as u64])
            }
        };
        let chars = bytes
            .into_iter()
            .map(|b| HirExpr::new(HirExprKind::Char(b), TypeRef::U8))
            .collect();
        Ok(HirExpr::new(HirExprKind::Array(chars), ty))
    }

    fn check_ident(&mut self, name: &str, span: Span) -> Result<HirExpr, CoreError> {
        if let Some(id) = self.ctx.scopes.lookup(name) {
            let ty = self.ctx.scopes.binding(id).ty.clone();
            return Ok(HirExpr::var(name, ty));
        }
        if let Some(SubstValue::Length(n)) = self.ctx.subst.get(name) {
            return Ok(HirExpr::int(i128::from(*n), TypeRef::USIZE));
        }
        match self.items.get(name).copied() {
            Some(Item::Fn) => {
                let params = self
                    .plain
                    .get(name)
                    .map(|p| p.sig.params.clone())
                    .unwrap_or_default();
                let ret = self.plain_return_type(name, span)?;
                Ok(HirExpr::new(
                    HirExprKind::FnRef(name.to_string()),
                    TypeRef::Function {
                        params,
                        ret: Box::new(ret),
                    },
                ))
            }
            Some(Item::GenericFn(_)) => Err(CoreError::type_error(
                span,
                format!("generic function '{name}' can only be called"),
            )),
            Some(Item::Extern) | Some(Item::IntrinsicDecl) => Err(CoreError::type_error(
                span,
                format!("foreign function '{name}' can only be called"),
            )),
            _ => Err(CoreError::scope(span, format!("unbound identifier '{name}'"))),
        }
    }

    fn check_array(
        &mut self,
        elements: &[Expr],
        span: Span,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        if elements.is_empty() {
            return Err(CoreError::array(span, "empty array literal"));
        }
        if let Some(ty @ TypeRef::Array { element, dims }) = expected {
            if dims.iter().all(|d| matches!(d, ArrayDim::Known(_))) {
                return self.check_array_against(elements, element, dims, ty, span);
            }
        }

        if elements.iter().all(is_flexible) {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push((const_eval(self.table, element)?, element.span));
            }
            let primitive = if values.iter().all(|(v, _)| (0..=255).contains(v)) {
                Primitive::U8
            } else {
                Primitive::I32
            };
            let mut items = Vec::with_capacity(values.len());
            for (value, span) in values {
                check_range(self.table, value, primitive, span)?;
                items.push(HirExpr::int(value, TypeRef::Primitive(primitive)));
            }
            let ty = TypeRef::array(TypeRef::Primitive(primitive), vec![items.len() as u64]);
            return Ok(HirExpr::new(HirExprKind::Array(items), ty));
        }

        let anchor = elements.iter().position(|e| !is_flexible(e)).unwrap_or(0);
        let first = self.check_expr(&elements[anchor], None)?;
        let element_ty = first.ty.clone();
        if element_ty.is_void() {
            return Err(CoreError::array(span, "array elements cannot be Void"));
        }
        let mut first = Some(first);
        let mut items = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let checked = if index == anchor { first.take() } else { None };
            let value = match checked {
                Some(value) => value,
                None => self.check_against(element, &element_ty)?,
            };
            items.push(value);
        }
        let count = ArrayDim::Known(items.len() as u64);
        let ty = match element_ty {
            TypeRef::Array { element, mut dims } => {
                dims.insert(0, count);
                TypeRef::Array { element, dims }
            }
            other => TypeRef::Array {
                element: Box::new(other),
                dims: vec![count],
            },
        };
        Ok(HirExpr::new(HirExprKind::Array(items), ty))
    }

    /// Literal against a known array type. Multi-dimensional targets accept
    /// nested rows or one flat list in row-major order.
    fn check_array_against(
        &mut self,
        elements: &[Expr],
        element_ty: &TypeRef,
        dims: &[ArrayDim],
        ty: &TypeRef,
        span: Span,
    ) -> Result<HirExpr, CoreError> {
        let lengths: Vec<u64> = dims
            .iter()
            .map(|d| match d {
                ArrayDim::Known(n) => *n,
                ArrayDim::Param(_) => 0,
            })
            .collect();
        let nested = elements
            .iter()
            .all(|e| matches!(e.kind, ExprKind::Array(_) | ExprKind::Str(_)));

        if lengths.len() > 1 && !nested {
            let total: u64 = lengths.iter().product();
            if elements.len() as u64 != total {
                return Err(CoreError::array(
                    span,
                    format!(
                        "array literal has {} elements, but {ty} needs {total}",
                        elements.len()
                    ),
                ));
            }
            let mut flat = Vec::with_capacity(elements.len());
            for element in elements {
                flat.push(self.check_against(element, element_ty)?);
            }
            return Ok(regroup(flat, element_ty, &lengths));
        }

        if elements.len() as u64 != lengths[0] {
            return Err(CoreError::array(
                span,
                format!(
                    "array literal has {} elements, but {ty} needs {}",
                    elements.len(),
                    lengths[0]
                ),
            ));
        }
        let inner = ty.index_result().unwrap_or_else(|| element_ty.clone());
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(self.check_against(element, &inner)?);
        }
        Ok(HirExpr::new(HirExprKind::Array(items), ty.clone()))
    }

    fn check_struct_lit(
        &mut self,
        name: &Ident,
        type_args: &[TypeExpr],
        fields: &[(Ident, Expr)],
        span: Span,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        let Some(Item::Struct(decl)) = self.items.get(&name.name).copied() else {
            return Err(CoreError::type_error(
                name.span,
                format!("unknown struct '{}'", name.name),
            ));
        };
        for (index, (field, _)) in fields.iter().enumerate() {
            if !decl.fields.iter().any(|f| f.name.name == field.name) {
                return Err(CoreError::type_error(
                    field.span,
                    format!("struct '{}' has no field '{}'", name.name, field.name),
                ));
            }
            if fields[..index].iter().any(|(f, _)| f.name == field.name) {
                return Err(CoreError::type_error(
                    field.span,
                    format!("field '{}' is given twice", field.name),
                ));
            }
        }
        // Initializers in declaration order.
        let mut ordered = Vec::with_capacity(decl.fields.len());
        for declared in &decl.fields {
            let Some((_, value)) = fields.iter().find(|(f, _)| f.name == declared.name.name)
            else {
                return Err(CoreError::type_error(
                    span,
                    format!(
                        "missing field '{}' in '{}' literal",
                        declared.name.name, name.name
                    ),
                ));
            };
            ordered.push(value);
        }

        let expected_args = match expected {
            Some(TypeRef::Named { name: n, args }) if *n == name.name => Some(args.clone()),
            _ => None,
        };
        let args = if !type_args.is_empty() {
            let mut args = Vec::with_capacity(type_args.len());
            for arg in type_args {
                args.push(resolve_annotation(self, arg)?);
            }
            args
        } else if decl.type_params.is_empty() {
            Vec::new()
        } else if let Some(args) = expected_args {
            args
        } else {
            // Infer the arguments from the field initializers.
            let params: Vec<(String, bool)> = decl
                .type_params
                .iter()
                .map(|p| (p.name.name.clone(), false))
                .collect();
            let saved = std::mem::replace(&mut self.ctx.subst, super::Subst::open(&params));
            let patterns: Result<Vec<TypeRef>, CoreError> = decl
                .fields
                .iter()
                .map(|f| resolve_annotation(self, &f.ty))
                .collect();
            self.ctx.subst = saved;
            let patterns = patterns?;
            let exprs: Vec<Expr> = ordered.iter().map(|e| (*e).clone()).collect();
            let mut bindings = Bindings::new();
            let values = self.check_generic_args(&patterns, &exprs, &mut bindings, span)?;
            let mut args = Vec::with_capacity(params.len());
            for (param, _) in &params {
                match bindings.get(param) {
                    Some(GenericArg::Type(ty)) => args.push(ty.clone()),
                    _ => {
                        return Err(CoreError::type_error(
                            span,
                            format!("cannot infer type parameter '{param}' of '{}'", name.name),
                        ));
                    }
                }
            }
            let ty = self.instantiate_struct(&name.name, args, span)?;
            return Ok(HirExpr::new(HirExprKind::StructLit(values), ty));
        };

        let ty = self.instantiate_struct(&name.name, args, name.span)?;
        let layout = self
            .layout(&ty)
            .map(|l| l.fields.clone())
            .unwrap_or_default();
        let mut values = Vec::with_capacity(layout.len());
        for ((_, field_ty), value) in layout.iter().zip(ordered) {
            values.push(self.check_against(value, field_ty)?);
        }
        Ok(HirExpr::new(HirExprKind::StructLit(values), ty))
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        span: Span,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        let value = match op {
            UnaryOp::Neg => {
                if let ExprKind::Int(text) = &operand.kind {
                    if let Some(literal) = resolve_negated_int(self.table, text, span)? {
                        let primitive = literal.suffix.unwrap_or(Primitive::I32);
                        return Ok(HirExpr::int(literal.value, TypeRef::Primitive(primitive)));
                    }
                }
                let value = self.check_expr(operand, expected)?;
                let signed = value.ty.primitive().is_some_and(|p| {
                    matches!(
                        self.table.info(p).class,
                        PrimitiveClass::Signed | PrimitiveClass::Float
                    )
                });
                if !signed {
                    return Err(CoreError::type_error(
                        span,
                        format!("cannot negate a value of type {}", value.ty),
                    ));
                }
                value
            }
            UnaryOp::Not => {
                let value = self.check_expr(operand, Some(&TypeRef::BOOL))?;
                if !value.ty.is_bool() {
                    return Err(CoreError::type_error(
                        span,
                        format!("'!' requires a Bool operand, found {}", value.ty),
                    ));
                }
                value
            }
        };
        let ty = value.ty.clone();
        Ok(HirExpr::new(
            HirExprKind::Unary {
                op,
                operand: Box::new(value),
            },
            ty,
        ))
    }

    fn check_ref(&mut self, mutable: bool, operand: &Expr, span: Span) -> Result<HirExpr, CoreError> {
        if matches!(strip_parens(operand).kind, ExprKind::Ref { .. }) {
            return Err(CoreError::type_error(
                span,
                "cannot take a reference to a reference",
            ));
        }
        let value = self.check_expr(operand, None)?;
        if value.ty.is_pointer() {
            return Err(CoreError::type_error(
                span,
                format!("pointers to pointers are not supported ({})", value.ty),
            ));
        }
        match place_of(&value) {
            Some(Place::Binding(name)) => self.ctx.scopes.borrow(&name, mutable, span)?,
            Some(Place::Through { mutable: false }) if mutable => {
                return Err(CoreError::borrow(
                    span,
                    "cannot borrow through an immutable pointer as mutable",
                ));
            }
            Some(Place::Through { .. }) => {}
            None => {
                return Err(CoreError::borrow(
                    span,
                    "cannot take a reference to a temporary value",
                ));
            }
        }
        let ty = TypeRef::pointer(value.ty.clone(), mutable);
        Ok(HirExpr::new(HirExprKind::AddrOf(Box::new(value)), ty))
    }

    fn check_binary_expr(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
        expected: Option<&TypeRef>,
    ) -> Result<HirExpr, CoreError> {
        let (left, right) = if op.is_logical() {
            (
                self.check_expr(lhs, Some(&TypeRef::BOOL))?,
                self.check_expr(rhs, Some(&TypeRef::BOOL))?,
            )
        } else {
            let operand_expected = if op.is_arithmetic() { expected } else { None };
            if is_flexible(lhs) && !is_flexible(rhs) {
                let right = self.check_expr(rhs, operand_expected)?;
                let left = self.check_expr(lhs, Some(&right.ty))?;
                (left, right)
            } else {
                let left = self.check_expr(lhs, operand_expected)?;
                let right = self.check_expr(rhs, Some(&left.ty))?;
                (left, right)
            }
        };
        let ty = check_binary(self.table, op, &left.ty, &right.ty, span)?;
        Ok(HirExpr::new(
            HirExprKind::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            },
            ty,
        ))
    }

    fn check_args(
        &mut self,
        name: &str,
        params: &[TypeRef],
        args: &[Expr],
        span: Span,
    ) -> Result<Vec<HirExpr>, CoreError> {
        if params.len() != args.len() {
            return Err(super::arity_error(name, params.len(), args.len(), span));
        }
        args.iter()
            .zip(params)
            .map(|(arg, param)| self.check_against(arg, param))
            .collect()
    }

    fn check_call(
        &mut self,
        callee: &Ident,
        type_args: &[TypeExpr],
        args: &[Expr],
        span: Span,
    ) -> Result<HirExpr, CoreError> {
        let name = callee.name.as_str();
        let not_generic = |type_args: &[TypeExpr]| {
            if type_args.is_empty() {
                Ok(())
            } else {
                Err(CoreError::type_error(
                    span,
                    format!("'{name}' takes no type arguments"),
                ))
            }
        };

        if let Some(id) = self.ctx.scopes.lookup(name) {
            let TypeRef::Function { params, ret } = self.ctx.scopes.binding(id).ty.clone() else {
                return Err(CoreError::type_error(
                    callee.span,
                    format!("'{name}' is not a function"),
                ));
            };
            not_generic(type_args)?;
            let args = self.check_args(name, &params, args, span)?;
            return Ok(HirExpr::new(
                HirExprKind::Call {
                    callee: Callee::Local(name.to_string()),
                    args,
                },
                *ret,
            ));
        }

        match self.items.get(name).copied() {
            Some(Item::Fn) => {
                not_generic(type_args)?;
                let params = self
                    .plain
                    .get(name)
                    .map(|p| p.sig.params.clone())
                    .unwrap_or_default();
                let args = self.check_args(name, &params, args, span)?;
                let ret = self.plain_return_type(name, span)?;
                Ok(HirExpr::new(
                    HirExprKind::Call {
                        callee: Callee::Function(name.to_string()),
                        args,
                    },
                    ret,
                ))
            }
            Some(Item::GenericFn(decl)) => self.instantiate_fn_call(decl, type_args, args, span),
            Some(Item::Extern) => {
                not_generic(type_args)?;
                let (params, ret) = self.externs.get(name).cloned().ok_or_else(|| {
                    CoreError::scope(span, format!("extern '{name}' is not resolved"))
                })?;
                let args = self.check_args(name, &params, args, span)?;
                Ok(HirExpr::new(
                    HirExprKind::Call {
                        callee: Callee::Function(name.to_string()),
                        args,
                    },
                    ret,
                ))
            }
            Some(Item::IntrinsicDecl) | None => {
                let Some(intrinsic) = find_intrinsic(name) else {
                    return Err(CoreError::scope(
                        callee.span,
                        format!("unknown function '{name}'"),
                    ));
                };
                not_generic(type_args)?;
                let args = self.check_args(name, &intrinsic.param_types(), args, span)?;
                self.use_intrinsic(intrinsic);
                Ok(HirExpr::new(
                    HirExprKind::Call {
                        callee: Callee::Intrinsic(intrinsic),
                        args,
                    },
                    intrinsic.ret_type(),
                ))
            }
            Some(_) => Err(CoreError::type_error(
                callee.span,
                format!("'{name}' is a type, not a function"),
            )),
        }
    }

    fn check_method_call(
        &mut self,
        receiver: &Expr,
        method: &Ident,
        args: &[Expr],
        span: Span,
    ) -> Result<HirExpr, CoreError> {
        let receiver = self.check_expr(receiver, None)?;
        let struct_ty = match &receiver.ty {
            TypeRef::Named { .. } => receiver.ty.clone(),
            TypeRef::Pointer { target, .. } if matches!(**target, TypeRef::Named { .. }) => {
                (**target).clone()
            }
            other => {
                return Err(CoreError::type_error(
                    method.span,
                    format!("{other} has no methods"),
                ));
            }
        };
        let TypeRef::Named { name, .. } = &struct_ty else {
            return Err(CoreError::type_error(method.span, "receiver is not a struct"));
        };
        let Some(def) = self.methods.find(name, &method.name).cloned() else {
            return Err(CoreError::type_error(
                method.span,
                format!("no method '{}' on {struct_ty}", method.name),
            ));
        };
        let mutable = def.decl.mut_receiver;

        match (&receiver.ty, place_of(&receiver)) {
            (TypeRef::Pointer { mutable: false, .. }, _) if mutable => {
                return Err(CoreError::borrow(
                    span,
                    format!(
                        "cannot call mut method '{}' through an immutable pointer",
                        method.name
                    ),
                ));
            }
            (TypeRef::Pointer { .. }, _) => {}
            (_, Some(Place::Binding(root))) => self.ctx.scopes.borrow(&root, mutable, span)?,
            (_, Some(Place::Through { mutable: false })) if mutable => {
                return Err(CoreError::borrow(
                    span,
                    format!(
                        "cannot call mut method '{}' through an immutable pointer",
                        method.name
                    ),
                ));
            }
            (_, Some(Place::Through { .. })) => {}
            (_, None) => {
                return Err(CoreError::type_error(
                    span,
                    "method receiver must be a variable, field or element",
                ));
            }
        }

        let (symbol, sig) = self.resolve_method(&struct_ty, &def, span)?;
        let args = self.check_args(&method.name, &sig.params, args, span)?;
        let ret = sig.ret.unwrap_or(TypeRef::VOID);
        Ok(lower::lower_call(symbol, receiver, mutable, args, ret))
    }

    fn check_field(&mut self, base: &Expr, field: &Ident) -> Result<HirExpr, CoreError> {
        let base = self.check_expr(base, None)?;
        let (struct_ty, through_pointer) = match &base.ty {
            TypeRef::Named { .. } => (base.ty.clone(), false),
            TypeRef::Pointer { target, .. } if matches!(**target, TypeRef::Named { .. }) => {
                ((**target).clone(), true)
            }
            other => {
                return Err(CoreError::type_error(
                    field.span,
                    format!("{other} has no fields"),
                ));
            }
        };
        let Some(layout) = self.layout(&struct_ty) else {
            return Err(CoreError::type_error(
                field.span,
                format!("{struct_ty} has no fields"),
            ));
        };
        let Some((index, (_, field_ty))) = layout
            .fields
            .iter()
            .enumerate()
            .find(|(_, (name, _))| *name == field.name)
        else {
            return Err(CoreError::type_error(
                field.span,
                format!("{struct_ty} has no field '{}'", field.name),
            ));
        };
        let ty = field_ty.clone();
        Ok(HirExpr::new(
            HirExprKind::Field {
                base: Box::new(base),
                name: field.name.clone(),
                index,
                through_pointer,
            },
            ty,
        ))
    }

    fn check_index(&mut self, base: &Expr, index: &Expr, span: Span) -> Result<HirExpr, CoreError> {
        let base_value = self.check_expr(base, None)?;
        let Some(element) = base_value.ty.index_result() else {
            return Err(CoreError::type_error(
                span,
                format!("cannot index a value of type {}", base_value.ty),
            ));
        };
        let index_value = self.check_expr(index, None)?;
        let is_integer = index_value
            .ty
            .primitive()
            .is_some_and(|p| self.table.is_integer(p));
        if !is_integer {
            return Err(CoreError::type_error(
                index.span,
                format!("array index must be an integer, found {}", index_value.ty),
            ));
        }
        if let (true, Some(len)) = (is_flexible(index), base_value.ty.outer_len()) {
            let value = const_eval(self.table, index)?;
            if value < 0 || value >= i128::from(len) {
                return Err(CoreError::array(
                    index.span,
                    format!("index {value} is out of bounds for length {len}"),
                ));
            }
        }
        Ok(HirExpr::new(
            HirExprKind::Index {
                base: Box::new(base_value),
                index: Box::new(index_value),
            },
            element,
        ))
    }

    fn check_is(&mut self, operand: &Expr, ty: &TypeExpr) -> Result<HirExpr, CoreError> {
        let value = self.check_expr(operand, None)?;
        let target = resolve_annotation(self, ty)?;
        let TypeRef::Union { members, .. } = &value.ty else {
            // A non-union operand has a static type; the operand is not evaluated.
            trace!(ty = %value.ty, %target, "folded 'is' on a non-union operand");
            return Ok(HirExpr::new(HirExprKind::Bool(value.ty == target), TypeRef::BOOL));
        };
        let Some(tag) = members.iter().position(|m| *m == target) else {
            return Err(CoreError::type_error(
                ty.span,
                format!("{target} is not a member of {}", value.ty),
            ));
        };
        Ok(HirExpr::new(
            HirExprKind::Is {
                operand: Box::new(value),
                tag,
            },
            TypeRef::BOOL,
        ))
    }
}

/// Rebuild nested rows from a flat row-major list.
fn regroup(flat: Vec<HirExpr>, element_ty: &TypeRef, lengths: &[u64]) -> HirExpr {
    let ty = TypeRef::array(element_ty.clone(), lengths.to_vec());
    if lengths.len() == 1 {
        return HirExpr::new(HirExprKind::Array(flat), ty);
    }
    let row_len = lengths[1..].iter().product::<u64>() as usize;
    let mut rows = Vec::with_capacity(lengths[0] as usize);
    let mut rest = flat;
    while !rest.is_empty() {
        let tail = rest.split_off(row_len.min(rest.len()));
        rows.push(regroup(rest, element_ty, &lengths[1..]));
        rest = tail;
    }
    HirExpr::new(HirExprKind::Array(rows), ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{HirProgram, HirStmt};
    use crate::parser::parse;
    use crate::typecheck::check_program;

    fn check(source: &str) -> Result<HirProgram, CoreError> {
        let program = parse(source)?;
        check_program(&program, &PrimitiveTable::standard())
    }

    fn let_type(hir: &HirProgram, index: usize) -> TypeRef {
        match &hir.statements[index] {
            HirStmt::Let { ty, .. } => ty.clone(),
            other => panic!("expected let, found {other:?}"),
        }
    }

    #[test]
    fn unsuffixed_literal_adopts_context() {
        let hir = check("let x = 3U8; let y = x + 4; let z = 5;").unwrap();
        assert_eq!(let_type(&hir, 1), TypeRef::U8);
        assert_eq!(let_type(&hir, 2), TypeRef::I32);
        let hir = check("let a : I64 = 7;").unwrap();
        assert_eq!(let_type(&hir, 0), TypeRef::Primitive(Primitive::I64));
    }

    #[test]
    fn literal_chains_are_folded() {
        let hir = check("let x = 2 * (3 + 4);").unwrap();
        let HirStmt::Let { init, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        assert_eq!(init.kind, HirExprKind::Int(14));
        let err = check("let x = 1 / 0;").unwrap_err();
        assert!(matches!(err, CoreError::Range { .. }));
        let err = check("let x : U8 = 200 + 100;").unwrap_err();
        assert!(matches!(err, CoreError::Range { .. }));
    }

    #[test]
    fn mismatched_operands_are_type_errors() {
        let err = check("let a = 1U8; let b = 2I32; let c = a + b;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn char_literal_only_fits_u8() {
        assert!(check("let c : U8 = 'a';").is_ok());
        let err = check("let c : I32 = 'a';").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn string_must_match_array_length() {
        assert!(check("let s : [U8; 3] = \"abc\";").is_ok());
        let err = check("let s : [U8; 4] = \"abc\";").unwrap_err();
        assert!(matches!(err, CoreError::Array { .. }));
    }

    #[test]
    fn array_literal_defaults() {
        let hir = check("let a = [1, 2, 3]; let b = [1, 300]; let c = [[1, 2], [3, 4]];").unwrap();
        assert_eq!(let_type(&hir, 0), TypeRef::array(TypeRef::U8, vec![3]));
        assert_eq!(let_type(&hir, 1), TypeRef::array(TypeRef::I32, vec![2]));
        assert_eq!(let_type(&hir, 2), TypeRef::array(TypeRef::U8, vec![2, 2]));
    }

    #[test]
    fn flat_literal_fills_multi_dimensional_array() {
        let hir = check("let m : [I32; 2, 2] = [1, 2, 3, 4];").unwrap();
        let HirStmt::Let { init, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        let HirExprKind::Array(rows) = &init.kind else {
            panic!("expected array");
        };
        assert_eq!(rows.len(), 2);
        let err = check("let m : [I32; 2, 2] = [1, 2, 3];").unwrap_err();
        assert!(matches!(err, CoreError::Array { .. }));
    }

    #[test]
    fn constant_index_is_bounds_checked() {
        let err = check("let a = [1, 2, 3]; let b = a[3];").unwrap_err();
        assert!(matches!(err, CoreError::Array { .. }));
        assert!(check("let a = [1, 2, 3]; let b = a[2];").is_ok());
    }

    #[test]
    fn reference_rules() {
        let err = check("let x = 1; let y = &(&x);").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
        let err = check("let y = &(1 + 2);").unwrap_err();
        assert!(matches!(err, CoreError::Borrow { .. }));
        let err = check("let x = 1; let y = *x;").unwrap_err();
        assert!(matches!(err, CoreError::Borrow { .. }));
        let err = check("let mut x = 1; let y = &mut x; let z = &mut x;").unwrap_err();
        assert!(matches!(err, CoreError::Borrow { .. }));
    }

    #[test]
    fn union_members_are_wrapped_and_tested() {
        let hir = check("type Num = I32 | Bool; let n : Num = 5; let b = n is Bool;").unwrap();
        let HirStmt::Let { init, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        assert!(matches!(init.kind, HirExprKind::UnionLit { tag: 0, .. }));
        assert_eq!(let_type(&hir, 1), TypeRef::BOOL);
        let err = check("type Num = I32 | Bool; let n : Num = 5; let b = n is U8;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn is_on_a_plain_value_is_constant() {
        let hir = check("let x = 1U8; let a = x is U8; let b = x is I32;").unwrap();
        for (index, expected) in [(1, true), (2, false)] {
            let HirStmt::Let { init, .. } = &hir.statements[index] else {
                panic!("expected let");
            };
            assert_eq!(init.kind, HirExprKind::Bool(expected));
        }
    }

    #[test]
    fn negated_suffixed_literal_is_one_value() {
        let hir = check("let x = -128I8;").unwrap();
        let HirStmt::Let { init, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        assert_eq!(init.kind, HirExprKind::Int(-128));
        assert_eq!(init.ty, TypeRef::Primitive(Primitive::I8));
        let err = check("let x = -129I8;").unwrap_err();
        assert!(matches!(err, CoreError::Range { .. }));
        let err = check("let x = -1U8;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn struct_literal_needs_every_field() {
        let err = check("struct P { x : I32, y : I32 } let p = P { x : 1 };").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
        let hir = check("struct P { x : I32, y : I32 } let p = P { y : 2, x : 1 };").unwrap();
        let HirStmt::Let { init, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        let HirExprKind::StructLit(values) = &init.kind else {
            panic!("expected struct literal");
        };
        assert_eq!(values[0].kind, HirExprKind::Int(1));
    }

    #[test]
    fn unknown_function_is_scope_error() {
        let err = check("let x = missing(1);").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
        let err = check("let x = y;").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
    }
}
