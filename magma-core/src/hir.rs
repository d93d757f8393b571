//! Typed, lowered intermediate representation.
//!
//! The checker produces HIR with every generic already specialized and
//! every method call already rewritten into a free-function call. Both
//! the C emitter and the interpreter consume it unchanged.

use crate::ast::{BinaryOp, UnaryOp};
use crate::intrinsics::Intrinsic;
use crate::types::TypeRef;

#[derive(Debug, Clone, PartialEq)]
pub struct HirProgram {
    /// Plain struct and named union definitions in source order, preceded
    /// by any specialization their fields required.
    pub structs: Vec<HirItem>,
    /// Monomorphized structs, functions and methods in first-use order.
    pub specializations: Vec<HirItem>,
    /// Non-generic functions, lowered methods and externs in source order.
    pub functions: Vec<HirItem>,
    pub statements: Vec<HirStmt>,
    pub result: Option<HirExpr>,
    /// Intrinsics referenced anywhere, in first-use order.
    pub intrinsics: Vec<&'static Intrinsic>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirItem {
    Struct(HirStruct),
    Union(HirUnion),
    Function(HirFunction),
    Extern(HirExtern),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirStruct {
    pub c_name: String,
    pub fields: Vec<(String, TypeRef)>,
}

/// Tagged union: a `uint8_t` tag plus one C union member per type.
#[derive(Debug, Clone, PartialEq)]
pub struct HirUnion {
    pub c_name: String,
    pub members: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub c_name: String,
    pub params: Vec<(String, TypeRef)>,
    pub ret: TypeRef,
    pub body: Vec<HirStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirExtern {
    pub c_name: String,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmt {
    Let {
        name: String,
        ty: TypeRef,
        init: HirExpr,
    },
    Assign {
        target: HirExpr,
        value: HirExpr,
    },
    If {
        cond: HirExpr,
        then_body: Vec<HirStmt>,
        else_body: Option<Vec<HirStmt>>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    Return(Option<HirExpr>),
    Block(Vec<HirStmt>),
    Expr(HirExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// User function, specialization, lowered method or extern.
    Function(String),
    /// Local binding of function type.
    Local(String),
    Intrinsic(&'static Intrinsic),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirExprKind {
    Int(i128),
    Float(String),
    Bool(bool),
    /// One byte of a string initializer, emitted as a char literal.
    Char(u8),
    CString(Vec<u8>),
    Var(String),
    FnRef(String),
    Array(Vec<HirExpr>),
    /// Field values in declaration order.
    StructLit(Vec<HirExpr>),
    UnionLit {
        tag: usize,
        value: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    AddrOf(Box<HirExpr>),
    Deref(Box<HirExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Call {
        callee: Callee,
        args: Vec<HirExpr>,
    },
    Field {
        base: Box<HirExpr>,
        name: String,
        index: usize,
        through_pointer: bool,
    },
    Index {
        base: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    Is {
        operand: Box<HirExpr>,
        tag: usize,
    },
    Paren(Box<HirExpr>),
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: TypeRef) -> Self {
        HirExpr { kind, ty }
    }

    pub fn int(value: i128, ty: TypeRef) -> Self {
        HirExpr::new(HirExprKind::Int(value), ty)
    }

    pub fn var(name: impl Into<String>, ty: TypeRef) -> Self {
        HirExpr::new(HirExprKind::Var(name.into()), ty)
    }
}

impl HirItem {
    pub fn c_name(&self) -> &str {
        match self {
            HirItem::Struct(s) => &s.c_name,
            HirItem::Union(u) => &u.c_name,
            HirItem::Function(f) => &f.c_name,
            HirItem::Extern(e) => &e.c_name,
        }
    }
}
