//! Statement checking and return handling.

use super::expr::{Place, place_of, strip_parens};
use super::{Checker, Publish, ReturnSlot};
use crate::ast::{Block, Expr, ExprKind, LetStmt, Stmt, StmtKind};
use crate::error::CoreError;
use crate::hir::{HirExpr, HirExprKind, HirStmt};
use crate::resolve::resolve_annotation;
use crate::span::Span;
use crate::types::TypeRef;

impl<'p> Checker<'p> {
    /// Check one statement. Temporary borrows end with it.
    pub(super) fn check_stmt(&mut self, stmt: &Stmt) -> Result<HirStmt, CoreError> {
        let checked = self.check_stmt_kind(stmt);
        self.ctx.scopes.release_temporaries();
        checked
    }

    fn check_stmt_kind(&mut self, stmt: &Stmt) -> Result<HirStmt, CoreError> {
        match &stmt.kind {
            StmtKind::Let(let_stmt) => self.check_let(let_stmt),
            StmtKind::Assign { target, value } => self.check_assign(target, value, stmt.span),
            StmtKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                let cond = self.check_condition(cond)?;
                let then_body = self.check_block(then_block)?;
                let else_body = match else_branch {
                    Some(branch) => Some(match self.check_stmt(branch)? {
                        HirStmt::Block(body) => body,
                        other => vec![other],
                    }),
                    None => None,
                };
                Ok(HirStmt::If {
                    cond,
                    then_body,
                    else_body,
                })
            }
            StmtKind::While { cond, body } => {
                let cond = self.check_condition(cond)?;
                let body = self.check_block(body)?;
                Ok(HirStmt::While { cond, body })
            }
            StmtKind::Return(value) => self.check_return(value.as_ref(), stmt.span),
            StmtKind::Block(block) => Ok(HirStmt::Block(self.check_block(block)?)),
            StmtKind::Expr(expr) => Ok(HirStmt::Expr(self.check_expr(expr, None)?)),
        }
    }

    fn check_condition(&mut self, cond: &Expr) -> Result<HirExpr, CoreError> {
        let value = self.check_expr(cond, Some(&TypeRef::BOOL))?;
        if !value.ty.is_bool() {
            return Err(CoreError::type_error(
                cond.span,
                format!("condition must be Bool, found {}", value.ty),
            ));
        }
        Ok(value)
    }

    /// A braced block in its own scope; a tail expression becomes an
    /// expression statement.
    fn check_block(&mut self, block: &Block) -> Result<Vec<HirStmt>, CoreError> {
        self.ctx.scopes.push_scope();
        let body = self.check_block_body(block);
        self.ctx.scopes.pop_scope();
        body
    }

    fn check_block_body(&mut self, block: &Block) -> Result<Vec<HirStmt>, CoreError> {
        let mut body = Vec::with_capacity(block.stmts.len() + 1);
        for stmt in &block.stmts {
            body.push(self.check_stmt(stmt)?);
        }
        if let Some(tail) = &block.tail {
            let value = self.check_expr(tail, None)?;
            self.ctx.scopes.release_temporaries();
            body.push(HirStmt::Expr(value));
        }
        Ok(body)
    }

    fn check_let(&mut self, stmt: &LetStmt) -> Result<HirStmt, CoreError> {
        let name = &stmt.name.name;
        let declared = match &stmt.ty {
            Some(ty) => Some(resolve_annotation(self, ty)?),
            None => None,
        };
        let init = match &declared {
            Some(ty) => {
                let value = self.check_expr(&stmt.init, Some(ty))?;
                self.coerce(value, ty).map_err(|value| {
                    CoreError::type_error(
                        stmt.init.span,
                        format!(
                            "'{name}' is declared as {ty} but initialized with {}",
                            value.ty
                        ),
                    )
                })?
            }
            None => self.check_expr(&stmt.init, None)?,
        };
        let ty = declared.unwrap_or_else(|| init.ty.clone());
        if ty.is_void() {
            return Err(CoreError::type_error(
                stmt.init.span,
                format!("cannot bind '{name}' to a value of type Void"),
            ));
        }
        if matches!(ty, TypeRef::Array { .. }) && !matches!(init.kind, HirExprKind::Array(_)) {
            return Err(CoreError::array(
                stmt.init.span,
                format!("array '{name}' must be initialized from an array or string literal"),
            ));
        }
        let id = self
            .ctx
            .scopes
            .declare(name, ty.clone(), stmt.mutable, stmt.name.span)?;
        if matches!(strip_parens(&stmt.init).kind, ExprKind::Ref { .. }) {
            self.ctx.scopes.hold_last_borrow(id);
        }
        Ok(HirStmt::Let {
            name: name.clone(),
            ty,
            init,
        })
    }

    fn check_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<HirStmt, CoreError> {
        if let ExprKind::Ident(name) = &strip_parens(target).kind {
            let id = self.ctx.scopes.resolve(name, target.span)?;
            let ty = self.ctx.scopes.binding(id).ty.clone();
            if matches!(ty, TypeRef::Array { .. }) {
                return Err(CoreError::type_error(
                    span,
                    format!("array '{name}' cannot be assigned as a whole"),
                ));
            }
            let value = self.check_expr(value, Some(&ty))?;
            let value = self.coerce(value, &ty).unwrap_or_else(|value| value);
            self.ctx.scopes.assign(name, &value.ty, span)?;
            return Ok(HirStmt::Assign {
                target: HirExpr::var(name.clone(), ty),
                value,
            });
        }

        let place = self.check_expr(target, None)?;
        if matches!(place.ty, TypeRef::Array { .. }) {
            return Err(CoreError::type_error(
                span,
                "arrays cannot be assigned as a whole",
            ));
        }
        match place_of(&place) {
            Some(Place::Binding(root)) => {
                let id = self.ctx.scopes.resolve(&root, target.span)?;
                if !self.ctx.scopes.binding(id).mutable {
                    return Err(CoreError::scope(
                        span,
                        format!("cannot assign through immutable binding '{root}'"),
                    ));
                }
            }
            Some(Place::Through { mutable: false }) => {
                return Err(CoreError::borrow(
                    span,
                    "cannot assign through an immutable pointer",
                ));
            }
            Some(Place::Through { mutable: true }) => {}
            None => {
                return Err(CoreError::type_error(
                    target.span,
                    "invalid assignment target",
                ));
            }
        }
        let value = self.check_against(value, &place.ty)?;
        Ok(HirStmt::Assign {
            target: place,
            value,
        })
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) -> Result<HirStmt, CoreError> {
        match self.ctx.ret.clone() {
            ReturnSlot::TopLevel => Err(CoreError::syntax(
                span,
                "'return' outside of a function",
            )),
            ReturnSlot::Declared(ty)
            | ReturnSlot::Inferred {
                current: Some(ty), ..
            } => match value {
                Some(_) if ty.is_void() => Err(CoreError::type_error(
                    span,
                    "a function returning Void cannot return a value",
                )),
                Some(value) => Ok(HirStmt::Return(Some(self.check_against(value, &ty)?))),
                None if ty.is_void() => Ok(HirStmt::Return(None)),
                None => Err(CoreError::type_error(
                    span,
                    format!("missing return value of type {ty}"),
                )),
            },
            ReturnSlot::Inferred {
                current: None,
                publish,
            } => {
                let value = match value {
                    Some(value) => Some(self.check_expr(value, None)?),
                    None => None,
                };
                let ty = value.as_ref().map_or(TypeRef::VOID, |v| v.ty.clone());
                if value.is_some() && ty.is_void() {
                    return Err(CoreError::type_error(span, "cannot return a Void value"));
                }
                self.set_inferred_return(ty, publish);
                Ok(HirStmt::Return(value))
            }
        }
    }

    /// Final expression of a function body: the returned value unless the
    /// function returns `Void`.
    pub(super) fn check_tail(&mut self, tail: &Expr) -> Result<HirStmt, CoreError> {
        let checked = match self.ctx.ret.clone() {
            ReturnSlot::TopLevel => HirStmt::Expr(self.check_expr(tail, None)?),
            ReturnSlot::Declared(ty)
            | ReturnSlot::Inferred {
                current: Some(ty), ..
            } => {
                if ty.is_void() {
                    HirStmt::Expr(self.check_expr(tail, None)?)
                } else {
                    HirStmt::Return(Some(self.check_against(tail, &ty)?))
                }
            }
            ReturnSlot::Inferred {
                current: None,
                publish,
            } => {
                let value = self.check_expr(tail, None)?;
                let ty = value.ty.clone();
                self.set_inferred_return(ty.clone(), publish);
                if ty.is_void() {
                    HirStmt::Expr(value)
                } else {
                    HirStmt::Return(Some(value))
                }
            }
        };
        self.ctx.scopes.release_temporaries();
        Ok(checked)
    }

    fn set_inferred_return(&mut self, ty: TypeRef, publish: Publish) {
        self.publish_return(&publish, &ty);
        self.ctx.ret = ReturnSlot::Inferred {
            current: Some(ty),
            publish,
        };
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CoreError;
    use crate::hir::{HirItem, HirProgram, HirStmt};
    use crate::parser::parse;
    use crate::typecheck::check_program;
    use crate::types::{PrimitiveTable, TypeRef};

    fn check(source: &str) -> Result<HirProgram, CoreError> {
        let program = parse(source)?;
        check_program(&program, &PrimitiveTable::standard())
    }

    #[test]
    fn immutable_assignment_is_scope_error() {
        let err = check("let x = 1; x = 2;").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
        assert!(check("let mut x = 1; x = 2;").is_ok());
    }

    #[test]
    fn annotation_conflict_is_type_error() {
        let err = check("let x : Bool = 5;").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn block_bindings_do_not_escape() {
        let err = check("{ let y = 1; } y").unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
    }

    #[test]
    fn write_through_mutable_pointer() {
        assert!(check("let mut x = 0; let y = &mut x; *y = 1; x").is_ok());
        let err = check("let mut x = 0; let y = &x; *y = 1;").unwrap_err();
        assert!(matches!(err, CoreError::Borrow { .. }));
    }

    #[test]
    fn borrow_ends_with_its_holder_scope() {
        assert!(check("let mut x = 0; { let y = &mut x; } let z = &mut x;").is_ok());
    }

    #[test]
    fn top_level_return_is_rejected() {
        let err = check("return 1;").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn conditions_must_be_bool() {
        let err = check("if (1) { }").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }

    #[test]
    fn void_function_tail_stays_a_statement() {
        let hir = check("fn say(x : I32) => printInt(x);").unwrap();
        let HirItem::Function(function) = &hir.functions[0] else {
            panic!("expected function");
        };
        assert_eq!(function.ret, TypeRef::VOID);
        assert!(matches!(function.body[0], HirStmt::Expr(_)));
    }

    #[test]
    fn whole_array_assignment_is_rejected() {
        let err = check("let mut a = [1, 2]; a = [3, 4];").unwrap_err();
        assert!(matches!(err, CoreError::Type { .. }));
    }
}
