//! Symbol table and borrow checker.
//!
//! Scopes form a stack; lookup walks outward from the innermost one and a
//! popped scope takes its bindings with it. Borrows are counted on the
//! borrowed binding. A borrow is either a temporary, released when the
//! enclosing statement completes, or held by a binding (`let y = &mut x;`),
//! released when the holder's scope closes. The only conflict is a second
//! live `&mut` of the same binding.

use crate::error::CoreError;
use crate::span::Span;
use crate::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingId {
    depth: usize,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowState {
    Free,
    BorrowedImmutable(u32),
    BorrowedMutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Loan {
    target: BindingId,
    mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub ty: TypeRef,
    pub mutable: bool,
    shared_loans: u32,
    mutable_loans: u32,
    holds: Vec<Loan>,
}

impl Binding {
    pub fn borrow_state(&self) -> BorrowState {
        if self.mutable_loans > 0 {
            BorrowState::BorrowedMutable
        } else if self.shared_loans > 0 {
            BorrowState::BorrowedImmutable(self.shared_loans)
        } else {
            BorrowState::Free
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Scope {
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    temporaries: Vec<Loan>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
            temporaries: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Close the innermost scope, releasing every borrow its bindings hold.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() <= 1 {
            return;
        }
        let Some(scope) = self.scopes.last() else {
            return;
        };
        let held: Vec<Loan> = scope
            .bindings
            .iter()
            .flat_map(|b| b.holds.iter().copied())
            .collect();
        for loan in held {
            self.release(loan);
        }
        self.scopes.pop();
    }

    pub fn declare(
        &mut self,
        name: &str,
        ty: TypeRef,
        mutable: bool,
        span: Span,
    ) -> Result<BindingId, CoreError> {
        let depth = self.scopes.len() - 1;
        let scope = &mut self.scopes[depth];
        if scope.bindings.iter().any(|b| b.name == name) {
            return Err(CoreError::scope(
                span,
                format!("'{name}' is already declared in this scope"),
            ));
        }
        scope.bindings.push(Binding {
            name: name.to_string(),
            ty,
            mutable,
            shared_loans: 0,
            mutable_loans: 0,
            holds: Vec::new(),
        });
        Ok(BindingId {
            depth,
            index: scope.bindings.len() - 1,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<BindingId> {
        self.scopes.iter().enumerate().rev().find_map(|(depth, scope)| {
            scope
                .bindings
                .iter()
                .rposition(|b| b.name == name)
                .map(|index| BindingId { depth, index })
        })
    }

    pub fn resolve(&self, name: &str, span: Span) -> Result<BindingId, CoreError> {
        self.lookup(name)
            .ok_or_else(|| CoreError::scope(span, format!("unbound identifier '{name}'")))
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.scopes[id.depth].bindings[id.index]
    }

    fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.scopes[id.depth].bindings[id.index]
    }

    /// Check `name = value` where the value has type `value_ty`.
    pub fn assign(&self, name: &str, value_ty: &TypeRef, span: Span) -> Result<(), CoreError> {
        let binding = self.binding(self.resolve(name, span)?);
        if !binding.mutable {
            return Err(CoreError::scope(
                span,
                format!("cannot assign to immutable binding '{name}'"),
            ));
        }
        if !value_ty.assignable_to(&binding.ty) {
            return Err(CoreError::type_error(
                span,
                format!(
                    "cannot assign {value_ty} to '{name}' of type {}",
                    binding.ty
                ),
            ));
        }
        Ok(())
    }

    /// Record a temporary borrow of `name`. It lasts until
    /// [`SymbolTable::release_temporaries`] unless a binding takes it over.
    pub fn borrow(&mut self, name: &str, mutable: bool, span: Span) -> Result<(), CoreError> {
        let target = self.resolve(name, span)?;
        let binding = self.binding(target);
        if mutable && !binding.mutable {
            return Err(CoreError::borrow(
                span,
                format!("cannot borrow immutable binding '{name}' as mutable"),
            ));
        }
        if mutable && binding.borrow_state() == BorrowState::BorrowedMutable {
            return Err(CoreError::borrow(
                span,
                format!("'{name}' is already mutably borrowed"),
            ));
        }
        let binding = self.binding_mut(target);
        if mutable {
            binding.mutable_loans += 1;
        } else {
            binding.shared_loans += 1;
        }
        self.temporaries.push(Loan { target, mutable });
        Ok(())
    }

    /// Move the most recent temporary borrow to `holder`, keeping it alive
    /// until the holder's scope closes.
    pub fn hold_last_borrow(&mut self, holder: BindingId) {
        if let Some(loan) = self.temporaries.pop() {
            self.binding_mut(holder).holds.push(loan);
        }
    }

    pub fn release_temporaries(&mut self) {
        let loans = std::mem::take(&mut self.temporaries);
        for loan in loans {
            self.release(loan);
        }
    }

    fn release(&mut self, loan: Loan) {
        if loan.target.depth >= self.scopes.len() {
            return;
        }
        let binding = self.binding_mut(loan.target);
        if loan.mutable {
            binding.mutable_loans = binding.mutable_loans.saturating_sub(1);
        } else {
            binding.shared_loans = binding.shared_loans.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn redeclaration_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, false, span()).unwrap();
        let err = table.declare("x", TypeRef::BOOL, false, span()).unwrap_err();
        assert!(matches!(err, CoreError::Scope { .. }));
    }

    #[test]
    fn inner_scope_may_shadow_and_does_not_leak() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, false, span()).unwrap();
        table.push_scope();
        table.declare("x", TypeRef::BOOL, false, span()).unwrap();
        table.declare("y", TypeRef::I32, false, span()).unwrap();
        let inner = table.lookup("x").unwrap();
        assert_eq!(table.binding(inner).ty, TypeRef::BOOL);
        table.pop_scope();
        assert!(table.lookup("y").is_none());
        let outer = table.lookup("x").unwrap();
        assert_eq!(table.binding(outer).ty, TypeRef::I32);
    }

    #[test]
    fn assignment_rules() {
        let mut table = SymbolTable::new();
        table.declare("a", TypeRef::I32, false, span()).unwrap();
        table.declare("b", TypeRef::I32, true, span()).unwrap();

        let unbound = table.assign("c", &TypeRef::I32, span()).unwrap_err();
        assert!(matches!(unbound, CoreError::Scope { .. }));
        let immutable = table.assign("a", &TypeRef::I32, span()).unwrap_err();
        assert!(matches!(immutable, CoreError::Scope { .. }));
        let mismatch = table.assign("b", &TypeRef::U8, span()).unwrap_err();
        assert!(matches!(mismatch, CoreError::Type { .. }));
        assert!(table.assign("b", &TypeRef::I32, span()).is_ok());
    }

    #[test]
    fn held_mutable_borrow_excludes_a_second_one() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, true, span()).unwrap();
        table.borrow("x", true, span()).unwrap();
        let y = table
            .declare("y", TypeRef::pointer(TypeRef::I32, true), false, span())
            .unwrap();
        table.hold_last_borrow(y);
        table.release_temporaries();

        let x = table.lookup("x").unwrap();
        assert_eq!(table.binding(x).borrow_state(), BorrowState::BorrowedMutable);
        let err = table.borrow("x", true, span()).unwrap_err();
        assert!(matches!(err, CoreError::Borrow { .. }));
        // Shared borrows never conflict.
        assert!(table.borrow("x", false, span()).is_ok());
    }

    #[test]
    fn temporary_borrows_end_with_the_statement() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, true, span()).unwrap();
        table.borrow("x", true, span()).unwrap();
        assert!(table.borrow("x", true, span()).is_err());
        table.release_temporaries();
        let x = table.lookup("x").unwrap();
        assert_eq!(table.binding(x).borrow_state(), BorrowState::Free);
        assert!(table.borrow("x", true, span()).is_ok());
    }

    #[test]
    fn closing_holder_scope_releases_borrow() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, true, span()).unwrap();
        table.push_scope();
        table.borrow("x", true, span()).unwrap();
        let y = table
            .declare("y", TypeRef::pointer(TypeRef::I32, true), false, span())
            .unwrap();
        table.hold_last_borrow(y);
        table.release_temporaries();
        table.pop_scope();
        let x = table.lookup("x").unwrap();
        assert_eq!(table.binding(x).borrow_state(), BorrowState::Free);
    }

    #[test]
    fn mutable_borrow_of_immutable_binding_is_rejected() {
        let mut table = SymbolTable::new();
        table.declare("x", TypeRef::I32, false, span()).unwrap();
        assert!(matches!(
            table.borrow("x", true, span()),
            Err(CoreError::Borrow { .. })
        ));
    }
}
