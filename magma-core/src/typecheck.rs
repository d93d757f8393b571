//! Type checker and program builder.
//!
//! One pass over a parsed [`Program`]:
//!
//! 1. register every item name (functions, structs, aliases, unions,
//!    externs, intrinsic declarations), reserving output slots so that
//!    functions keep their source order;
//! 2. resolve declarations: struct layouts and named unions in source
//!    order, function signatures, and generic templates (which are only
//!    validated, never emitted);
//! 3. check bodies and top-level statements in source order. Generic
//!    templates are specialized on first use, methods are lowered to free
//!    functions, and functions whose return type is inferred are checked
//!    on demand when a caller needs that type.

mod expr;
mod stmt;

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::*;
use crate::error::CoreError;
use crate::hir::*;
use crate::intrinsics::{Intrinsic, find_intrinsic};
use crate::lower::{self, MethodDef, MethodTable};
use crate::mono::{Bindings, GenericArg, Instance, MonoKey, Monomorphizer, substitute};
use crate::resolve::{TypeEnv, resolve_annotation, resolve_union_members};
use crate::scope::SymbolTable;
use crate::span::Span;
use crate::types::{ArrayDim, PrimitiveTable, TypeRef};

pub fn check_program(program: &Program, table: &PrimitiveTable) -> Result<HirProgram, CoreError> {
    let mut checker = Checker::new(table);
    checker.register_items(program)?;
    checker.resolve_declarations(program)?;
    checker.sink = Sink::Specializations;
    checker.check_bodies(program)?;
    let generated = checker.mono.generated();
    let hir = checker.finish();
    debug!(
        generated,
        structs = hir.structs.len(),
        specializations = hir.specializations.len(),
        functions = hir.functions.len(),
        statements = hir.statements.len(),
        "checked program"
    );
    Ok(hir)
}

#[derive(Debug, Clone, Copy)]
enum Item<'p> {
    Fn,
    GenericFn(&'p FnDecl),
    Struct(&'p StructDecl),
    Alias(&'p TypeExpr),
    Union(&'p [TypeExpr]),
    Extern,
    IntrinsicDecl,
}

#[derive(Debug, Clone)]
struct FnSig {
    params: Vec<TypeRef>,
    ret: Option<TypeRef>,
}

#[derive(Debug, Clone)]
enum FnState {
    Pending,
    InProgress(Option<TypeRef>),
    Done(TypeRef),
}

/// A non-generic function or a method of a non-generic struct.
#[derive(Debug)]
struct PlainFn<'p> {
    decl: &'p FnDecl,
    receiver: Option<(TypeRef, bool)>,
    slot: usize,
    sig: FnSig,
    state: FnState,
}

/// Signature of a generic function with its parameters left open.
#[derive(Debug, Clone)]
struct GenericSig {
    /// Type and length parameters in declaration order.
    params_order: Vec<(String, bool)>,
    params: Vec<TypeRef>,
    variadic: bool,
    ret: Option<TypeRef>,
}

#[derive(Debug, Clone)]
struct StructLayout {
    fields: Vec<(String, TypeRef)>,
}

#[derive(Debug, Clone, PartialEq)]
enum SubstValue {
    Type(TypeRef),
    Length(u64),
    /// Declared but unbound: resolves to `TypeRef::Generic` while a
    /// template is validated.
    OpenType,
    OpenLength,
}

#[derive(Debug, Clone, Default)]
struct Subst {
    entries: HashMap<String, SubstValue>,
}

impl Subst {
    fn open(params: &[(String, bool)]) -> Self {
        let entries = params
            .iter()
            .map(|(name, length)| {
                let value = if *length {
                    SubstValue::OpenLength
                } else {
                    SubstValue::OpenType
                };
                (name.clone(), value)
            })
            .collect();
        Subst { entries }
    }

    fn from_bindings(bindings: &Bindings) -> Self {
        let entries = bindings
            .iter()
            .map(|(name, arg)| {
                let value = match arg {
                    GenericArg::Type(ty) => SubstValue::Type(ty.clone()),
                    GenericArg::Length(n) => SubstValue::Length(*n),
                };
                (name.clone(), value)
            })
            .collect();
        Subst { entries }
    }

    fn get(&self, name: &str) -> Option<&SubstValue> {
        self.entries.get(name)
    }
}

#[derive(Debug, Clone)]
enum Publish {
    Plain(String),
    Mono(MonoKey),
}

#[derive(Debug, Clone)]
enum ReturnSlot {
    TopLevel,
    Declared(TypeRef),
    Inferred {
        current: Option<TypeRef>,
        publish: Publish,
    },
}

/// Per-body checking state, swapped out while another body is checked.
#[derive(Debug)]
struct FnContext {
    scopes: SymbolTable,
    subst: Subst,
    ret: ReturnSlot,
}

impl FnContext {
    fn new(subst: Subst, ret: ReturnSlot) -> Self {
        FnContext {
            scopes: SymbolTable::new(),
            subst,
            ret,
        }
    }
}

struct FnJob<'d> {
    decl: &'d FnDecl,
    c_name: String,
    receiver: Option<(TypeRef, bool)>,
    subst: Subst,
    publish: Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Structs,
    Specializations,
}

struct Checker<'p> {
    table: &'p PrimitiveTable,
    items: HashMap<String, Item<'p>>,
    methods: MethodTable,
    mono: Monomorphizer,
    plain: HashMap<String, PlainFn<'p>>,
    generic_sigs: HashMap<String, GenericSig>,
    externs: HashMap<String, (Vec<TypeRef>, TypeRef)>,
    layouts: HashMap<String, StructLayout>,
    unions: HashSet<String>,
    specialized: HashSet<String>,
    aliases_in_progress: HashSet<String>,
    ctx: FnContext,
    sink: Sink,
    structs: Vec<Option<HirItem>>,
    specializations: Vec<Option<HirItem>>,
    slots: Vec<Option<HirItem>>,
    statements: Vec<HirStmt>,
    result: Option<HirExpr>,
    intrinsics: Vec<&'static Intrinsic>,
}

impl<'p> Checker<'p> {
    fn new(table: &'p PrimitiveTable) -> Self {
        Checker {
            table,
            items: HashMap::new(),
            methods: MethodTable::default(),
            mono: Monomorphizer::new(),
            plain: HashMap::new(),
            generic_sigs: HashMap::new(),
            externs: HashMap::new(),
            layouts: HashMap::new(),
            unions: HashSet::new(),
            specialized: HashSet::new(),
            aliases_in_progress: HashSet::new(),
            ctx: FnContext::new(Subst::default(), ReturnSlot::TopLevel),
            sink: Sink::Structs,
            structs: Vec::new(),
            specializations: Vec::new(),
            slots: Vec::new(),
            statements: Vec::new(),
            result: None,
            intrinsics: Vec::new(),
        }
    }

    fn finish(self) -> HirProgram {
        HirProgram {
            structs: self.structs.into_iter().flatten().collect(),
            specializations: self.specializations.into_iter().flatten().collect(),
            functions: self.slots.into_iter().flatten().collect(),
            statements: self.statements,
            result: self.result,
            intrinsics: self.intrinsics,
        }
    }

    fn emit_item(&mut self, item: HirItem) {
        let slot = self.reserve_item();
        self.fill_item(slot, item);
    }

    /// Claims the next output position before the item's dependencies are
    /// resolved, so items keep the order in which they were first named.
    fn reserve_item(&mut self) -> (Sink, usize) {
        let items = match self.sink {
            Sink::Structs => &mut self.structs,
            Sink::Specializations => &mut self.specializations,
        };
        items.push(None);
        (self.sink, items.len() - 1)
    }

    fn fill_item(&mut self, (sink, index): (Sink, usize), item: HirItem) {
        trace!(name = item.c_name(), ?sink, index, "emitting item");
        let items = match sink {
            Sink::Structs => &mut self.structs,
            Sink::Specializations => &mut self.specializations,
        };
        items[index] = Some(item);
    }

    /// Rejects a generated C name that is already taken by a declaration
    /// or by another generated name.
    fn claim_symbol(&mut self, symbol: &str, span: Span) -> Result<(), CoreError> {
        if self.items.contains_key(symbol)
            || self.plain.contains_key(symbol)
            || !self.specialized.insert(symbol.to_string())
        {
            return Err(CoreError::scope(
                span,
                format!("generated name '{symbol}' clashes with an existing declaration"),
            ));
        }
        Ok(())
    }

    fn use_intrinsic(&mut self, intrinsic: &'static Intrinsic) {
        if !self.intrinsics.iter().any(|i| i.name == intrinsic.name) {
            self.intrinsics.push(intrinsic);
        }
    }

    // ------------------------------------------------------------------
    // Pass 1: names
    // ------------------------------------------------------------------

    fn register_items(&mut self, program: &'p Program) -> Result<(), CoreError> {
        for decl in &program.declarations {
            let Some(name) = decl.kind.item_name() else {
                continue;
            };
            if self.items.contains_key(&name.name) {
                return Err(CoreError::scope(
                    name.span,
                    format!("'{}' is already declared", name.name),
                ));
            }
            let item = match &decl.kind {
                DeclarationKind::Fn(f) if f.type_params.is_empty() => Item::Fn,
                DeclarationKind::Fn(f) => Item::GenericFn(f),
                DeclarationKind::Struct(s) => Item::Struct(s),
                DeclarationKind::TypeAlias { target, .. } => Item::Alias(target),
                DeclarationKind::UnionType { members, .. } => Item::Union(members),
                DeclarationKind::Extern(_) => Item::Extern,
                DeclarationKind::Intrinsic(_) => Item::IntrinsicDecl,
                DeclarationKind::Let(_)
                | DeclarationKind::ClassImpl(_)
                | DeclarationKind::ExpressionStatement(_) => continue,
            };
            self.items.insert(name.name.clone(), item);
        }

        for decl in &program.declarations {
            match &decl.kind {
                DeclarationKind::Struct(s) => {
                    let params = type_param_names(&s.type_params);
                    for method in &s.methods {
                        self.methods
                            .register(&s.name.name, method.clone(), params.clone())?;
                    }
                }
                DeclarationKind::ClassImpl(imp) => {
                    let Some(Item::Struct(target)) = self.items.get(&imp.target.name).copied()
                    else {
                        return Err(CoreError::type_error(
                            imp.target.span,
                            format!("impl target '{}' is not a struct", imp.target.name),
                        ));
                    };
                    if imp.type_params.len() != target.type_params.len() {
                        return Err(CoreError::type_error(
                            imp.target.span,
                            format!(
                                "impl for '{}' declares {} type parameters, the struct has {}",
                                imp.target.name,
                                imp.type_params.len(),
                                target.type_params.len()
                            ),
                        ));
                    }
                    let params = type_param_names(&imp.type_params);
                    for method in &imp.methods {
                        self.methods
                            .register(&imp.target.name, method.clone(), params.clone())?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn reserve_slot(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    // ------------------------------------------------------------------
    // Pass 2: declarations
    // ------------------------------------------------------------------

    fn resolve_declarations(&mut self, program: &'p Program) -> Result<(), CoreError> {
        // Types first, so that layouts are emitted in source order.
        for decl in &program.declarations {
            match &decl.kind {
                DeclarationKind::Struct(s) if s.type_params.is_empty() => {
                    self.instantiate_struct(&s.name.name, Vec::new(), s.name.span)?;
                }
                DeclarationKind::UnionType { name, .. } | DeclarationKind::TypeAlias { name, .. } => {
                    self.resolve_named(&name.name, Vec::new(), name.span)?;
                }
                _ => {}
            }
        }

        for decl in &program.declarations {
            match &decl.kind {
                DeclarationKind::Struct(s) if s.type_params.is_empty() => {
                    let ty = self.instantiate_struct(&s.name.name, Vec::new(), s.name.span)?;
                    for method in &s.methods {
                        self.register_plain_method(&ty, method)?;
                    }
                }
                DeclarationKind::Struct(s) => self.validate_generic_struct(s)?,
                DeclarationKind::ClassImpl(imp) if imp.type_params.is_empty() => {
                    let ty =
                        self.instantiate_struct(&imp.target.name, Vec::new(), imp.target.span)?;
                    for method in &imp.methods {
                        self.register_plain_method(&ty, method)?;
                    }
                }
                DeclarationKind::ClassImpl(imp) => {
                    let params = type_params_order(&imp.type_params)?;
                    self.validate_methods(&imp.target.name, &params, &imp.methods)?;
                }
                DeclarationKind::Fn(f) if f.type_params.is_empty() => {
                    let sig = self.resolve_plain_signature(f)?;
                    let slot = self.reserve_slot();
                    self.plain.insert(
                        f.name.name.clone(),
                        PlainFn {
                            decl: f,
                            receiver: None,
                            slot,
                            sig,
                            state: FnState::Pending,
                        },
                    );
                }
                DeclarationKind::Fn(f) => {
                    let sig = self.validate_generic_fn(f)?;
                    self.generic_sigs.insert(f.name.name.clone(), sig);
                }
                DeclarationKind::Extern(sig) => {
                    let (params, ret) = self.resolve_foreign_signature(sig)?;
                    let slot = self.reserve_slot();
                    self.externs
                        .insert(sig.name.name.clone(), (params.clone(), ret.clone()));
                    self.slots[slot] = Some(HirItem::Extern(HirExtern {
                        c_name: sig.name.name.clone(),
                        params,
                        ret,
                    }));
                }
                DeclarationKind::Intrinsic(sig) => {
                    let intrinsic = find_intrinsic(&sig.name.name).ok_or_else(|| {
                        CoreError::scope(
                            sig.name.span,
                            format!("no intrinsic named '{}'", sig.name.name),
                        )
                    })?;
                    let (params, ret) = self.resolve_foreign_signature(sig)?;
                    if params != intrinsic.param_types() || ret != intrinsic.ret_type() {
                        return Err(CoreError::type_error(
                            sig.name.span,
                            format!(
                                "intrinsic '{}' is declared with a signature that does not match the host",
                                sig.name.name
                            ),
                        ));
                    }
                }
                DeclarationKind::UnionType { .. }
                | DeclarationKind::TypeAlias { .. }
                | DeclarationKind::Let(_)
                | DeclarationKind::ExpressionStatement(_) => {}
            }
        }
        Ok(())
    }

    fn register_plain_method(
        &mut self,
        struct_ty: &TypeRef,
        method: &'p FnDecl,
    ) -> Result<(), CoreError> {
        let sig = self.resolve_plain_signature(method)?;
        let symbol = lower::method_symbol(&method.name.name, &struct_ty.mangle());
        self.claim_symbol(&symbol, method.name.span)?;
        let slot = self.reserve_slot();
        self.plain.insert(
            symbol,
            PlainFn {
                decl: method,
                receiver: Some((struct_ty.clone(), method.mut_receiver)),
                slot,
                sig,
                state: FnState::Pending,
            },
        );
        Ok(())
    }

    fn resolve_plain_signature(&mut self, decl: &FnDecl) -> Result<FnSig, CoreError> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            if param.variadic {
                return Err(CoreError::type_error(
                    param.name.span,
                    "a variadic parameter needs a length type parameter",
                ));
            }
            let ty = resolve_annotation(self, &param.ty)?;
            check_value_type(&ty, param.ty.span, "parameter")?;
            params.push(ty);
        }
        let ret = self.resolve_return(decl)?;
        Ok(FnSig { params, ret })
    }

    fn resolve_return(&mut self, decl: &FnDecl) -> Result<Option<TypeRef>, CoreError> {
        let Some(ret) = &decl.ret else {
            return Ok(None);
        };
        let ty = resolve_annotation(self, ret)?;
        if matches!(ty, TypeRef::Array { .. }) {
            return Err(CoreError::type_error(
                ret.span,
                "functions cannot return arrays",
            ));
        }
        Ok(Some(ty))
    }

    fn resolve_foreign_signature(
        &mut self,
        sig: &FnSignature,
    ) -> Result<(Vec<TypeRef>, TypeRef), CoreError> {
        let mut params = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            if param.variadic {
                return Err(CoreError::type_error(
                    param.name.span,
                    "variadic parameters are not supported on foreign functions",
                ));
            }
            let ty = resolve_annotation(self, &param.ty)?;
            check_value_type(&ty, param.ty.span, "parameter")?;
            params.push(ty);
        }
        let ret = match &sig.ret {
            Some(ret) => resolve_annotation(self, ret)?,
            None => TypeRef::VOID,
        };
        Ok((params, ret))
    }

    /// Resolve a template signature with its parameters open, catching
    /// undeclared type parameters at declaration time.
    fn validate_generic_fn(&mut self, decl: &FnDecl) -> Result<GenericSig, CoreError> {
        let params_order = type_params_order(&decl.type_params)?;
        let saved = std::mem::replace(&mut self.ctx.subst, Subst::open(&params_order));

        let mut params = Vec::with_capacity(decl.params.len());
        let mut variadic = false;
        for (index, param) in decl.params.iter().enumerate() {
            let ty = resolve_annotation(self, &param.ty)?;
            if param.variadic {
                let is_length_array = matches!(
                    &ty,
                    TypeRef::Array { dims, .. }
                        if matches!(dims.as_slice(), [ArrayDim::Param(_)])
                );
                if index + 1 != decl.params.len() || !is_length_array {
                    return Err(CoreError::type_error(
                        param.name.span,
                        "a variadic parameter must be last and have type [T; Length]",
                    ));
                }
                variadic = true;
            }
            check_value_type(&ty, param.ty.span, "parameter")?;
            params.push(ty);
        }
        let ret = self.resolve_return(decl)?;
        self.validate_body_annotations(&decl.body)?;

        self.ctx.subst = saved;
        Ok(GenericSig {
            params_order,
            params,
            variadic,
            ret,
        })
    }

    fn validate_generic_struct(&mut self, decl: &StructDecl) -> Result<(), CoreError> {
        let params = type_params_order(&decl.type_params)?;
        if params.iter().any(|(_, length)| *length) {
            return Err(CoreError::type_error(
                decl.name.span,
                "structs cannot take length parameters",
            ));
        }
        let saved = std::mem::replace(&mut self.ctx.subst, Subst::open(&params));
        for field in &decl.fields {
            resolve_annotation(self, &field.ty)?;
        }
        self.ctx.subst = saved;
        self.validate_methods(&decl.name.name, &params, &decl.methods)
    }

    fn validate_methods(
        &mut self,
        struct_name: &str,
        params: &[(String, bool)],
        methods: &[FnDecl],
    ) -> Result<(), CoreError> {
        let saved = std::mem::replace(&mut self.ctx.subst, Subst::open(params));
        for method in methods {
            trace!(struct_name, method = %method.name.name, "validating generic method");
            for param in &method.params {
                resolve_annotation(self, &param.ty)?;
            }
            self.resolve_return(method)?;
            self.validate_body_annotations(&method.body)?;
        }
        self.ctx.subst = saved;
        Ok(())
    }

    fn validate_body_annotations(&mut self, body: &FnBody) -> Result<(), CoreError> {
        let mut annotations = Vec::new();
        match body {
            FnBody::Expr(expr) => collect_expr_annotations(expr, &mut annotations),
            FnBody::Block(block) => collect_block_annotations(block, &mut annotations),
        }
        for ty in annotations {
            resolve_annotation(self, ty)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structs and unions
    // ------------------------------------------------------------------

    fn instantiate_struct(
        &mut self,
        name: &str,
        args: Vec<TypeRef>,
        span: Span,
    ) -> Result<TypeRef, CoreError> {
        let Some(Item::Struct(decl)) = self.items.get(name).copied() else {
            return Err(CoreError::type_error(span, format!("unknown struct '{name}'")));
        };
        if args.len() != decl.type_params.len() {
            return Err(CoreError::type_error(
                span,
                format!(
                    "wrong number of type arguments for '{name}': expected {}, found {}",
                    decl.type_params.len(),
                    args.len()
                ),
            ));
        }
        let ty = TypeRef::struct_named(name, args.clone());
        if args.iter().any(TypeRef::contains_generic) {
            return Ok(ty);
        }
        let c_name = ty.mangle();
        if !args.is_empty() && self.items.contains_key(&c_name) {
            return Err(CoreError::scope(
                span,
                format!("generated name '{c_name}' clashes with an existing declaration"),
            ));
        }
        if self.layouts.contains_key(&c_name) {
            return Ok(ty);
        }
        if !args.is_empty() {
            self.claim_symbol(&c_name, span)?;
            let key = MonoKey::new(name, args.iter().cloned().map(GenericArg::Type).collect());
            self.mono.instantiate(key);
        }
        self.layouts.insert(c_name.clone(), StructLayout { fields: Vec::new() });
        let slot = self.reserve_item();

        let mut bindings = Bindings::new();
        for (param, arg) in decl.type_params.iter().zip(&args) {
            bindings.insert(param.name.name.clone(), GenericArg::Type(arg.clone()));
        }
        let saved = std::mem::replace(&mut self.ctx.subst, Subst::from_bindings(&bindings));
        let mut fields: Vec<(String, TypeRef)> = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            if fields.iter().any(|(n, _)| *n == field.name.name) {
                return Err(CoreError::scope(
                    field.name.span,
                    format!("field '{}' is already declared in '{name}'", field.name.name),
                ));
            }
            let field_ty = resolve_annotation(self, &field.ty)?;
            check_value_type(&field_ty, field.ty.span, "field")?;
            if field_ty == ty {
                return Err(CoreError::type_error(
                    field.ty.span,
                    format!("struct '{name}' cannot contain itself by value"),
                ));
            }
            fields.push((field.name.name.clone(), field_ty));
        }
        self.ctx.subst = saved;

        debug!(struct_name = %c_name, fields = fields.len(), "instantiated struct");
        self.fill_item(slot, HirItem::Struct(lower::lower_struct(&c_name, &fields)));
        self.layouts.insert(c_name, StructLayout { fields });
        Ok(ty)
    }

    fn layout(&self, ty: &TypeRef) -> Option<&StructLayout> {
        self.layouts.get(&ty.mangle())
    }

    fn register_union(&mut self, ty: &TypeRef) {
        let TypeRef::Union { members, .. } = ty else {
            return;
        };
        if ty.contains_generic() {
            return;
        }
        let c_name = ty.mangle();
        if self.unions.insert(c_name.clone()) {
            self.emit_item(HirItem::Union(HirUnion {
                c_name,
                members: members.clone(),
            }));
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: bodies
    // ------------------------------------------------------------------

    fn check_bodies(&mut self, program: &'p Program) -> Result<(), CoreError> {
        for decl in &program.declarations {
            match &decl.kind {
                DeclarationKind::Fn(f) if f.type_params.is_empty() => {
                    self.ensure_plain_checked(&f.name.name)?;
                }
                DeclarationKind::Struct(s) if s.type_params.is_empty() => {
                    for method in &s.methods {
                        let symbol = lower::method_symbol(&method.name.name, &s.name.name);
                        self.ensure_plain_checked(&symbol)?;
                    }
                }
                DeclarationKind::ClassImpl(imp) if imp.type_params.is_empty() => {
                    for method in &imp.methods {
                        let symbol = lower::method_symbol(&method.name.name, &imp.target.name);
                        self.ensure_plain_checked(&symbol)?;
                    }
                }
                DeclarationKind::Let(stmt) => {
                    let stmt = Stmt {
                        kind: StmtKind::Let(stmt.clone()),
                        span: decl.span,
                    };
                    let checked = self.check_stmt(&stmt)?;
                    self.statements.push(checked);
                }
                DeclarationKind::ExpressionStatement(stmt) => {
                    let checked = self.check_stmt(stmt)?;
                    self.statements.push(checked);
                }
                _ => {}
            }
        }

        if let Some(result) = &program.result {
            let value = self.check_expr(result, None)?;
            let is_integer = value
                .ty
                .primitive()
                .is_some_and(|p| self.table.is_integer(p));
            if !is_integer && !value.ty.is_bool() {
                return Err(CoreError::type_error(
                    result.span,
                    format!(
                        "program result must be an integer or Bool, found {}",
                        value.ty
                    ),
                ));
            }
            self.ctx.scopes.release_temporaries();
            self.result = Some(value);
        }
        Ok(())
    }

    fn ensure_plain_checked(&mut self, symbol: &str) -> Result<(), CoreError> {
        let Some(plain) = self.plain.get_mut(symbol) else {
            return Ok(());
        };
        if !matches!(plain.state, FnState::Pending) {
            return Ok(());
        }
        plain.state = FnState::InProgress(plain.sig.ret.clone());
        let job = FnJob {
            decl: plain.decl,
            c_name: symbol.to_string(),
            receiver: plain.receiver.clone(),
            subst: Subst::default(),
            publish: Publish::Plain(symbol.to_string()),
        };
        let slot = plain.slot;
        let function = self.check_function(job)?;
        let ret = function.ret.clone();
        self.slots[slot] = Some(HirItem::Function(function));
        if let Some(plain) = self.plain.get_mut(symbol) {
            plain.state = FnState::Done(ret);
        }
        Ok(())
    }

    /// Return type of a plain function, checking its body first when the
    /// type has to be inferred.
    fn plain_return_type(&mut self, symbol: &str, span: Span) -> Result<TypeRef, CoreError> {
        let Some(plain) = self.plain.get(symbol) else {
            return Err(CoreError::scope(span, format!("unknown function '{symbol}'")));
        };
        if let Some(ret) = &plain.sig.ret {
            return Ok(ret.clone());
        }
        match &plain.state {
            FnState::Done(ret) | FnState::InProgress(Some(ret)) => Ok(ret.clone()),
            FnState::InProgress(None) => Err(CoreError::type_error(
                span,
                format!("cannot infer the return type of recursive function '{symbol}'; add an annotation"),
            )),
            FnState::Pending => {
                self.ensure_plain_checked(symbol)?;
                match self.plain.get(symbol).map(|p| &p.state) {
                    Some(FnState::Done(ret)) => Ok(ret.clone()),
                    _ => Ok(TypeRef::VOID),
                }
            }
        }
    }

    fn publish_return(&mut self, publish: &Publish, ty: &TypeRef) {
        match publish {
            Publish::Plain(symbol) => {
                if let Some(plain) = self.plain.get_mut(symbol) {
                    plain.state = FnState::InProgress(Some(ty.clone()));
                }
            }
            Publish::Mono(key) => self.mono.set_return_type(key, ty.clone()),
        }
    }

    fn check_function(&mut self, job: FnJob<'_>) -> Result<HirFunction, CoreError> {
        debug!(function = %job.c_name, "checking function body");
        let saved = std::mem::replace(
            &mut self.ctx,
            FnContext::new(job.subst.clone(), ReturnSlot::TopLevel),
        );
        let result = self.check_function_body(&job);
        self.ctx = saved;
        result
    }

    fn check_function_body(&mut self, job: &FnJob<'_>) -> Result<HirFunction, CoreError> {
        let decl = job.decl;
        let mut params = Vec::with_capacity(decl.params.len() + 1);
        let mut body = Vec::new();

        if let Some((struct_ty, mutable)) = &job.receiver {
            let (name, ty) = lower::receiver_param(struct_ty, *mutable);
            self.ctx
                .scopes
                .declare(&name, ty.clone(), false, decl.name.span)?;
            params.push((name, ty));
        }

        for param in &decl.params {
            let ty = resolve_annotation(self, &param.ty)?;
            check_value_type(&ty, param.ty.span, "parameter")?;
            let name = &param.name.name;
            if param.variadic {
                let (element, count) = match &ty {
                    TypeRef::Array { element, dims } => match dims.as_slice() {
                        [ArrayDim::Known(n)] => ((**element).clone(), *n),
                        _ => {
                            return Err(CoreError::type_error(
                                param.name.span,
                                "variadic parameter length is unresolved",
                            ));
                        }
                    },
                    _ => {
                        return Err(CoreError::type_error(
                            param.name.span,
                            "a variadic parameter must have an array type",
                        ));
                    }
                };
                let mut elements = Vec::with_capacity(count as usize);
                for index in 0..count {
                    let scalar = format!("{name}_{index}");
                    params.push((scalar.clone(), element.clone()));
                    elements.push(HirExpr::var(scalar, element.clone()));
                }
                self.ctx
                    .scopes
                    .declare(name, ty.clone(), false, param.name.span)?;
                body.push(HirStmt::Let {
                    name: name.clone(),
                    ty: ty.clone(),
                    init: HirExpr::new(HirExprKind::Array(elements), ty),
                });
            } else {
                self.ctx
                    .scopes
                    .declare(name, ty.clone(), false, param.name.span)?;
                params.push((name.clone(), ty));
            }
        }

        self.ctx.ret = match self.resolve_return(decl)? {
            Some(ret) => ReturnSlot::Declared(ret),
            None => ReturnSlot::Inferred {
                current: None,
                publish: job.publish.clone(),
            },
        };

        match &decl.body {
            FnBody::Expr(expr) => body.push(self.check_tail(expr)?),
            FnBody::Block(block) => {
                for stmt in &block.stmts {
                    body.push(self.check_stmt(stmt)?);
                }
                if let Some(tail) = &block.tail {
                    body.push(self.check_tail(tail)?);
                }
            }
        }

        let ret = match &self.ctx.ret {
            ReturnSlot::Declared(ty) => ty.clone(),
            ReturnSlot::Inferred { current, .. } => current.clone().unwrap_or(TypeRef::VOID),
            ReturnSlot::TopLevel => TypeRef::VOID,
        };
        Ok(HirFunction {
            c_name: job.c_name.clone(),
            params,
            ret,
            body,
        })
    }

    // ------------------------------------------------------------------
    // Generic functions and methods
    // ------------------------------------------------------------------

    /// Specialize `decl` for the arguments at one call site.
    fn instantiate_fn_call(
        &mut self,
        decl: &'p FnDecl,
        type_args: &[TypeExpr],
        args: &[Expr],
        span: Span,
    ) -> Result<HirExpr, CoreError> {
        let name = &decl.name.name;
        let Some(sig) = self.generic_sigs.get(name).cloned() else {
            return Err(CoreError::type_error(
                span,
                format!("generic function '{name}' is not resolved"),
            ));
        };
        let mut bindings = Bindings::new();

        if !type_args.is_empty() {
            let type_names: Vec<&String> = sig
                .params_order
                .iter()
                .filter(|(_, length)| !*length)
                .map(|(n, _)| n)
                .collect();
            if type_args.len() != type_names.len() {
                return Err(CoreError::type_error(
                    span,
                    format!(
                        "wrong number of type arguments for '{name}': expected {}, found {}",
                        type_names.len(),
                        type_args.len()
                    ),
                ));
            }
            for (param, arg) in type_names.into_iter().zip(type_args) {
                let ty = resolve_annotation(self, arg)?;
                bindings.insert(param.clone(), GenericArg::Type(ty));
            }
        }

        let patterns = self.call_patterns(&sig, args.len(), &mut bindings, name, span)?;
        let checked = self.check_generic_args(&patterns, args, &mut bindings, span)?;

        let mut key_args = Vec::with_capacity(sig.params_order.len());
        for (param, _) in &sig.params_order {
            let Some(arg) = bindings.get(param) else {
                return Err(CoreError::type_error(
                    span,
                    format!("cannot infer type parameter '{param}' of '{name}'"),
                ));
            };
            key_args.push(arg.clone());
        }
        let key = MonoKey::new(name.clone(), key_args);

        let declared_ret = sig.ret.as_ref().map(|ret| substitute(ret, &bindings));
        if let Some(ret) = &declared_ret {
            self.ensure_instantiated(ret, span)?;
        }
        let instance = self.mono.instantiate(key.clone());
        if let Instance::Fresh(symbol) = &instance {
            self.claim_symbol(symbol, span)?;
            if let Some(ret) = &declared_ret {
                self.mono.set_return_type(&key, ret.clone());
            }
            let job = FnJob {
                decl,
                c_name: symbol.clone(),
                receiver: None,
                subst: Subst::from_bindings(&bindings),
                publish: Publish::Mono(key.clone()),
            };
            let function = self.check_function(job)?;
            self.mono.set_return_type(&key, function.ret.clone());
            self.emit_item(HirItem::Function(function));
        }

        let ret = match self.mono.return_type(&key) {
            Some(ret) => ret.clone(),
            None => {
                return Err(CoreError::type_error(
                    span,
                    format!("cannot infer the return type of recursive function '{name}'; add an annotation"),
                ));
            }
        };
        Ok(HirExpr::new(
            HirExprKind::Call {
                callee: Callee::Function(instance.symbol().to_string()),
                args: checked,
            },
            ret,
        ))
    }

    /// Parameter patterns for a call with `count` arguments, expanding a
    /// variadic parameter and binding its length.
    fn call_patterns(
        &self,
        sig: &GenericSig,
        count: usize,
        bindings: &mut Bindings,
        name: &str,
        span: Span,
    ) -> Result<Vec<TypeRef>, CoreError> {
        if !sig.variadic {
            if count != sig.params.len() {
                return Err(arity_error(name, sig.params.len(), count, span));
            }
            return Ok(sig.params.clone());
        }
        let fixed = sig.params.len() - 1;
        if count <= fixed {
            return Err(CoreError::array(
                span,
                format!("variadic call to '{name}' needs at least one variadic argument"),
            ));
        }
        let mut patterns = sig.params[..fixed].to_vec();
        if let Some(TypeRef::Array { element, dims }) = sig.params.last() {
            if let [ArrayDim::Param(length)] = dims.as_slice() {
                let variadic_count = (count - fixed) as u64;
                if let Some(existing) = bindings.get(length) {
                    if *existing != GenericArg::Length(variadic_count) {
                        return Err(arity_error(name, fixed, count, span));
                    }
                }
                bindings.insert(length.clone(), GenericArg::Length(variadic_count));
            }
            patterns.extend(std::iter::repeat_n((**element).clone(), count - fixed));
        }
        Ok(patterns)
    }

    /// Check arguments against open patterns: concrete arguments first so
    /// that unsuffixed literals can adopt an inferred type.
    fn check_generic_args(
        &mut self,
        patterns: &[TypeRef],
        args: &[Expr],
        bindings: &mut Bindings,
        span: Span,
    ) -> Result<Vec<HirExpr>, CoreError> {
        let mut checked: Vec<Option<HirExpr>> = vec![None; args.len()];
        for flexible_pass in [false, true] {
            for (index, (arg, pattern)) in args.iter().zip(patterns).enumerate() {
                if expr::is_flexible(arg) != flexible_pass {
                    continue;
                }
                let target = substitute(pattern, bindings);
                let value = if target.contains_generic() {
                    let value = self.check_expr(arg, None)?;
                    if !crate::mono::unify(pattern, &value.ty, bindings) {
                        return Err(CoreError::type_error(
                            arg.span,
                            format!("argument of type {} does not match parameter type {pattern}", value.ty),
                        ));
                    }
                    value
                } else {
                    self.check_against(arg, &target)?
                };
                checked[index] = Some(value);
            }
        }
        checked
            .into_iter()
            .map(|value| value.ok_or_else(|| CoreError::type_error(span, "unchecked argument")))
            .collect()
    }

    /// Walk a concrete type and instantiate any generic struct or union it
    /// mentions.
    fn ensure_instantiated(&mut self, ty: &TypeRef, span: Span) -> Result<(), CoreError> {
        match ty {
            TypeRef::Named { name, args } => {
                for arg in args {
                    self.ensure_instantiated(arg, span)?;
                }
                self.instantiate_struct(name, args.clone(), span)?;
            }
            TypeRef::Pointer { target, .. } => self.ensure_instantiated(target, span)?,
            TypeRef::Array { element, .. } => self.ensure_instantiated(element, span)?,
            TypeRef::Function { params, ret } => {
                for param in params {
                    self.ensure_instantiated(param, span)?;
                }
                self.ensure_instantiated(ret, span)?;
            }
            TypeRef::Union { members, .. } => {
                for member in members {
                    self.ensure_instantiated(member, span)?;
                }
                self.register_union(ty);
            }
            TypeRef::Primitive(_) | TypeRef::CStr | TypeRef::Generic(_) => {}
        }
        Ok(())
    }

    /// Signature and symbol of `method` on the concrete struct `struct_ty`,
    /// specializing it on first use when the struct is generic.
    fn resolve_method(
        &mut self,
        struct_ty: &TypeRef,
        def: &MethodDef,
        span: Span,
    ) -> Result<(String, FnSig), CoreError> {
        let TypeRef::Named { name, args } = struct_ty else {
            return Err(CoreError::type_error(span, format!("{struct_ty} has no methods")));
        };
        let symbol = lower::method_symbol(&def.decl.name.name, &struct_ty.mangle());
        if args.is_empty() {
            let Some(plain) = self.plain.get(&symbol) else {
                return Err(CoreError::type_error(
                    span,
                    format!("method '{}' is not resolved", def.decl.name.name),
                ));
            };
            let mut sig = plain.sig.clone();
            sig.ret = Some(self.plain_return_type(&symbol, span)?);
            return Ok((symbol, sig));
        }

        let mut bindings = Bindings::new();
        for (param, arg) in def.type_params.iter().zip(args) {
            bindings.insert(param.clone(), GenericArg::Type(arg.clone()));
        }
        let subst = Subst::from_bindings(&bindings);
        let saved = std::mem::replace(&mut self.ctx.subst, subst.clone());
        let mut params = Vec::with_capacity(def.decl.params.len());
        for param in &def.decl.params {
            params.push(resolve_annotation(self, &param.ty)?);
        }
        let declared_ret = self.resolve_return(&def.decl)?;
        self.ctx.subst = saved;

        let key = MonoKey::new(
            format!("{}@{name}", def.decl.name.name),
            args.iter().cloned().map(GenericArg::Type).collect(),
        );
        if let Instance::Fresh(symbol) = self.mono.instantiate_as(key.clone(), symbol.clone()) {
            self.claim_symbol(&symbol, span)?;
            if let Some(ret) = &declared_ret {
                self.mono.set_return_type(&key, ret.clone());
            }
            let job = FnJob {
                decl: &def.decl,
                c_name: symbol,
                receiver: Some((struct_ty.clone(), def.decl.mut_receiver)),
                subst,
                publish: Publish::Mono(key.clone()),
            };
            let function = self.check_function(job)?;
            self.mono.set_return_type(&key, function.ret.clone());
            self.emit_item(HirItem::Function(function));
        }
        let ret = self.mono.return_type(&key).cloned().ok_or_else(|| {
            CoreError::type_error(
                span,
                format!(
                    "cannot infer the return type of recursive method '{}'; add an annotation",
                    def.decl.name.name
                ),
            )
        })?;
        Ok((
            symbol,
            FnSig {
                params,
                ret: Some(ret),
            },
        ))
    }
}

impl TypeEnv for Checker<'_> {
    fn primitives(&self) -> &PrimitiveTable {
        self.table
    }

    fn resolve_named(
        &mut self,
        name: &str,
        args: Vec<TypeRef>,
        span: Span,
    ) -> Result<TypeRef, CoreError> {
        if let Some(value) = self.ctx.subst.get(name).cloned() {
            if !args.is_empty() {
                return Err(CoreError::type_error(
                    span,
                    format!("type parameter '{name}' takes no type arguments"),
                ));
            }
            return match value {
                SubstValue::Type(ty) => Ok(ty),
                SubstValue::OpenType => Ok(TypeRef::Generic(name.to_string())),
                SubstValue::Length(_) | SubstValue::OpenLength => Err(CoreError::type_error(
                    span,
                    format!("length parameter '{name}' cannot be used as a type"),
                )),
            };
        }

        let non_generic = |args: &[TypeRef]| {
            if args.is_empty() {
                Ok(())
            } else {
                Err(CoreError::type_error(
                    span,
                    format!("type '{name}' takes no type arguments"),
                ))
            }
        };
        match self.items.get(name).copied() {
            Some(Item::Struct(_)) => self.instantiate_struct(name, args, span),
            Some(Item::Alias(target)) => {
                non_generic(&args)?;
                if !self.aliases_in_progress.insert(name.to_string()) {
                    return Err(CoreError::type_error(
                        span,
                        format!("type alias '{name}' refers to itself"),
                    ));
                }
                let saved = std::mem::take(&mut self.ctx.subst);
                let resolved = resolve_annotation(self, target);
                self.ctx.subst = saved;
                self.aliases_in_progress.remove(name);
                resolved
            }
            Some(Item::Union(members)) => {
                non_generic(&args)?;
                if !self.aliases_in_progress.insert(name.to_string()) {
                    return Err(CoreError::type_error(
                        span,
                        format!("union '{name}' refers to itself"),
                    ));
                }
                let saved = std::mem::take(&mut self.ctx.subst);
                let members = resolve_union_members(self, members, span);
                self.ctx.subst = saved;
                self.aliases_in_progress.remove(name);
                let ty = TypeRef::Union {
                    name: Some(name.to_string()),
                    members: members?,
                };
                self.register_union(&ty);
                Ok(ty)
            }
            Some(_) => Err(CoreError::type_error(span, format!("'{name}' is not a type"))),
            None => Err(CoreError::type_error(span, format!("unknown type '{name}'"))),
        }
    }

    fn resolve_length(&mut self, name: &str, span: Span) -> Result<ArrayDim, CoreError> {
        match self.ctx.subst.get(name) {
            Some(SubstValue::Length(n)) if *n >= 1 => Ok(ArrayDim::Known(*n)),
            Some(SubstValue::Length(n)) => Err(CoreError::array(
                span,
                format!("array dimension must be positive, found {n}"),
            )),
            Some(SubstValue::OpenLength) => Ok(ArrayDim::Param(name.to_string())),
            _ => Err(CoreError::type_error(
                span,
                format!("unknown length parameter '{name}'"),
            )),
        }
    }

    fn anonymous_union(&mut self, members: Vec<TypeRef>) -> TypeRef {
        let ty = TypeRef::Union {
            name: None,
            members,
        };
        self.register_union(&ty);
        ty
    }
}

fn type_param_names(params: &[TypeParam]) -> Vec<String> {
    params.iter().map(|p| p.name.name.clone()).collect()
}

/// Split declared parameters into type and length parameters, in order.
fn type_params_order(params: &[TypeParam]) -> Result<Vec<(String, bool)>, CoreError> {
    let mut order: Vec<(String, bool)> = Vec::with_capacity(params.len());
    for param in params {
        if order.iter().any(|(n, _)| *n == param.name.name) {
            return Err(CoreError::scope(
                param.name.span,
                format!("type parameter '{}' is declared twice", param.name.name),
            ));
        }
        let length = match &param.bound {
            None => false,
            Some(TypeExpr {
                kind: TypeExprKind::Named { name, args },
                ..
            }) if name == "USize" && args.is_empty() => true,
            Some(bound) => {
                return Err(CoreError::type_error(
                    bound.span,
                    "only 'USize' is supported as a type parameter bound",
                ));
            }
        };
        order.push((param.name.name.clone(), length));
    }
    Ok(order)
}

fn check_value_type(ty: &TypeRef, span: Span, what: &str) -> Result<(), CoreError> {
    if ty.is_void() {
        return Err(CoreError::type_error(span, format!("a {what} cannot have type Void")));
    }
    Ok(())
}

fn arity_error(name: &str, expected: usize, found: usize, span: Span) -> CoreError {
    CoreError::type_error(
        span,
        format!("'{name}' expects {expected} arguments, found {found}"),
    )
}

fn collect_block_annotations<'a>(block: &'a Block, out: &mut Vec<&'a TypeExpr>) {
    for stmt in &block.stmts {
        collect_stmt_annotations(stmt, out);
    }
    if let Some(tail) = &block.tail {
        collect_expr_annotations(tail, out);
    }
}

fn collect_stmt_annotations<'a>(stmt: &'a Stmt, out: &mut Vec<&'a TypeExpr>) {
    match &stmt.kind {
        StmtKind::Let(stmt) => {
            out.extend(stmt.ty.as_ref());
            collect_expr_annotations(&stmt.init, out);
        }
        StmtKind::Assign { target, value } => {
            collect_expr_annotations(target, out);
            collect_expr_annotations(value, out);
        }
        StmtKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            collect_expr_annotations(cond, out);
            collect_block_annotations(then_block, out);
            if let Some(branch) = else_branch {
                collect_stmt_annotations(branch, out);
            }
        }
        StmtKind::While { cond, body } => {
            collect_expr_annotations(cond, out);
            collect_block_annotations(body, out);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                collect_expr_annotations(value, out);
            }
        }
        StmtKind::Block(block) => collect_block_annotations(block, out),
        StmtKind::Expr(expr) => collect_expr_annotations(expr, out),
    }
}

fn collect_expr_annotations<'a>(expr: &'a Expr, out: &mut Vec<&'a TypeExpr>) {
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Bool(_)
        | ExprKind::Char(_)
        | ExprKind::Str(_)
        | ExprKind::Ident(_) => {}
        ExprKind::Array(elements) => {
            for element in elements {
                collect_expr_annotations(element, out);
            }
        }
        ExprKind::StructLit {
            type_args, fields, ..
        } => {
            out.extend(type_args);
            for (_, value) in fields {
                collect_expr_annotations(value, out);
            }
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Ref { operand, .. }
        | ExprKind::Deref(operand)
        | ExprKind::Paren(operand) => collect_expr_annotations(operand, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_expr_annotations(lhs, out);
            collect_expr_annotations(rhs, out);
        }
        ExprKind::Call {
            type_args, args, ..
        } => {
            out.extend(type_args);
            for arg in args {
                collect_expr_annotations(arg, out);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            collect_expr_annotations(receiver, out);
            for arg in args {
                collect_expr_annotations(arg, out);
            }
        }
        ExprKind::Field { base, .. } => collect_expr_annotations(base, out),
        ExprKind::Index { base, index } => {
            collect_expr_annotations(base, out);
            collect_expr_annotations(index, out);
        }
        ExprKind::Is { operand, ty } => {
            collect_expr_annotations(operand, out);
            out.push(ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(source: &str) -> Result<HirProgram, CoreError> {
        let program = parse(source)?;
        check_program(&program, &PrimitiveTable::standard())
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let err = check("fn f() => 1; fn f(x : I32) => x;").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
    }

    #[test]
    fn generated_names_cannot_shadow_declarations() {
        let err = check("fn id<T>(x : T) => x; fn id_I32(x : I32) => x + 1; let a = id(1);")
            .unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }), "{err}");
        assert!(err.message().contains("id_I32"));

        let err = check(
            "struct Get { x : I32 } fn get_Get(p : I32) => p; impl Get { fn get() => this.x; }",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }), "{err}");

        let err = check(
            "struct W<T> { v : T } struct W_I32 { v : Bool } let a = W<I32> { v : 1 };",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }), "{err}");
    }

    #[test]
    fn structs_keep_source_order_across_forward_references() {
        let hir = check("struct A { b : *B } struct B { a : *A }").unwrap();
        let names: Vec<&str> = hir.structs.iter().map(HirItem::c_name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn generic_template_alone_produces_nothing() {
        let hir = check("struct Wrapper<T> { value : T } fn id<T>(x : T) : T => x;").unwrap();
        assert!(hir.structs.is_empty());
        assert!(hir.specializations.is_empty());
        assert!(hir.functions.is_empty());
    }

    #[test]
    fn undeclared_type_parameter_fails_at_declaration() {
        let err = check("fn id<T>(x : U) : T => x;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
        let err = check("fn id<T>(x : T) : T => { let y : U = x; y }").unwrap_err();
        assert!(err.message().contains("'U'"));
    }

    #[test]
    fn inferred_return_is_checked_on_demand() {
        let hir = check("let x = later(); fn later() => 5U8;").unwrap();
        let HirStmt::Let { ty, .. } = &hir.statements[0] else {
            panic!("expected let");
        };
        assert_eq!(*ty, TypeRef::U8);
        assert_eq!(hir.functions.len(), 1);
    }

    #[test]
    fn recursive_inference_needs_a_known_return() {
        let ok = check("fn f(n : I32) => { if (n < 1) { return 0; } return f(n - 1); }");
        assert!(ok.is_ok());
        let err = check("fn g(n : I32) => g(n);").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn struct_methods_keep_source_slots() {
        let hir = check(
            "fn first() => 1; struct P { x : I32, fn get() => this.x; } fn last() => 2;",
        )
        .unwrap();
        let names: Vec<&str> = hir.functions.iter().map(HirItem::c_name).collect();
        assert_eq!(names, vec!["first", "get_P", "last"]);
    }

    #[test]
    fn intrinsic_declaration_must_match_host() {
        assert!(check("intrinsic fn readInt() : I32;").is_ok());
        let err = check("intrinsic fn readInt() : U8;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
        let err = check("intrinsic fn launch() : Void;").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
    }

    #[test]
    fn impl_must_target_a_struct() {
        let err = check("impl Missing { fn f() => 1; }").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }
}
