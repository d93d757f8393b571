//! Struct and class lowering.
//!
//! Methods declared in a `struct` body or an `impl` block become free
//! functions named `method_Struct` whose first parameter is the receiver
//! pointer `this`. A call `obj.method(args)` becomes
//! `method_Struct(&obj, args)`; a receiver that already is a pointer is
//! passed through unchanged.

use std::collections::HashMap;

use crate::ast::FnDecl;
use crate::error::CoreError;
use crate::hir::{Callee, HirExpr, HirExprKind, HirFunction, HirStmt, HirStruct};
use crate::types::TypeRef;

pub const RECEIVER: &str = "this";

pub fn method_symbol(method: &str, struct_c_name: &str) -> String {
    format!("{method}_{struct_c_name}")
}

/// A method together with the type parameter names of the block that
/// declared it (the struct's own, or the `impl` block's).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub decl: FnDecl,
    pub type_params: Vec<String>,
}

/// Methods per struct template, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Vec<MethodDef>>,
}

impl MethodTable {
    pub fn register(
        &mut self,
        struct_name: &str,
        decl: FnDecl,
        type_params: Vec<String>,
    ) -> Result<(), CoreError> {
        if !decl.type_params.is_empty() {
            return Err(CoreError::type_error(
                decl.name.span,
                format!(
                    "method '{}' cannot declare its own type parameters",
                    decl.name.name
                ),
            ));
        }
        let entry = self.methods.entry(struct_name.to_string()).or_default();
        if entry.iter().any(|m| m.decl.name.name == decl.name.name) {
            return Err(CoreError::scope(
                decl.name.span,
                format!(
                    "method '{}' is already declared for {struct_name}",
                    decl.name.name
                ),
            ));
        }
        entry.push(MethodDef { decl, type_params });
        Ok(())
    }

    pub fn find(&self, struct_name: &str, method: &str) -> Option<&MethodDef> {
        self.methods
            .get(struct_name)?
            .iter()
            .find(|m| m.decl.name.name == method)
    }
}

pub fn receiver_param(struct_ty: &TypeRef, mutable: bool) -> (String, TypeRef) {
    (
        RECEIVER.to_string(),
        TypeRef::pointer(struct_ty.clone(), mutable),
    )
}

/// Turn the receiver expression into the pointer argument.
pub fn lower_receiver(receiver: HirExpr, mutable: bool) -> HirExpr {
    if receiver.ty.is_pointer() {
        return receiver;
    }
    let ty = TypeRef::pointer(receiver.ty.clone(), mutable);
    HirExpr::new(HirExprKind::AddrOf(Box::new(receiver)), ty)
}

pub fn lower_call(
    symbol: String,
    receiver: HirExpr,
    mutable: bool,
    args: Vec<HirExpr>,
    ret: TypeRef,
) -> HirExpr {
    let mut lowered = Vec::with_capacity(args.len() + 1);
    lowered.push(lower_receiver(receiver, mutable));
    lowered.extend(args);
    HirExpr::new(
        HirExprKind::Call {
            callee: Callee::Function(symbol),
            args: lowered,
        },
        ret,
    )
}

pub fn lower_struct(c_name: &str, fields: &[(String, TypeRef)]) -> HirStruct {
    HirStruct {
        c_name: c_name.to_string(),
        fields: fields.to_vec(),
    }
}

pub fn lower_method(
    method: &str,
    struct_ty: &TypeRef,
    mutable: bool,
    params: Vec<(String, TypeRef)>,
    ret: TypeRef,
    body: Vec<HirStmt>,
) -> HirFunction {
    let mut all = Vec::with_capacity(params.len() + 1);
    all.push(receiver_param(struct_ty, mutable));
    all.extend(params);
    HirFunction {
        c_name: method_symbol(method, &struct_ty.mangle()),
        params: all,
        ret,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprKind, FnBody, Ident};
    use crate::span::Span;

    fn point() -> TypeRef {
        TypeRef::struct_named("Point", Vec::new())
    }

    fn method(name: &str) -> FnDecl {
        FnDecl {
            name: Ident {
                name: name.to_string(),
                span: Span::default(),
            },
            type_params: Vec::new(),
            params: Vec::new(),
            ret: None,
            body: FnBody::Expr(Expr {
                kind: ExprKind::Int("0".into()),
                span: Span::default(),
            }),
            mut_receiver: false,
            span: Span::default(),
        }
    }

    #[test]
    fn method_names_follow_method_struct_scheme() {
        assert_eq!(method_symbol("sum", "Point"), "sum_Point");
        let generic = TypeRef::struct_named("Wrapper", vec![TypeRef::I32]);
        let lowered = lower_method("get", &generic, false, Vec::new(), TypeRef::I32, Vec::new());
        assert_eq!(lowered.c_name, "get_Wrapper_I32");
        assert_eq!(lowered.params[0].0, "this");
        assert_eq!(lowered.params[0].1, TypeRef::pointer(generic, false));
    }

    #[test]
    fn value_receiver_is_passed_by_address() {
        let call = lower_call(
            "sum_Point".into(),
            HirExpr::var("p", point()),
            false,
            vec![HirExpr::int(1, TypeRef::I32)],
            TypeRef::I32,
        );
        let HirExprKind::Call { callee, args } = call.kind else {
            panic!("expected call");
        };
        assert_eq!(callee, Callee::Function("sum_Point".into()));
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0].kind, HirExprKind::AddrOf(_)));
        assert_eq!(args[0].ty, TypeRef::pointer(point(), false));
    }

    #[test]
    fn pointer_receiver_passes_through() {
        let this = HirExpr::var("this", TypeRef::pointer(point(), true));
        let lowered = lower_receiver(this.clone(), true);
        assert_eq!(lowered, this);
    }

    #[test]
    fn duplicate_methods_are_rejected() {
        let mut table = MethodTable::default();
        table.register("Point", method("sum"), Vec::new()).unwrap();
        let err = table.register("Point", method("sum"), Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
        assert!(table.find("Point", "sum").is_some());
        assert!(table.find("Point", "other").is_none());
        assert!(table.find("Missing", "sum").is_none());
    }
}
