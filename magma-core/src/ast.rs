//! Surface syntax tree produced by the parser.
//!
//! Nothing here is typed yet; annotations are kept as [`TypeExpr`] and
//! literals keep their source text so the resolver can apply suffix and
//! range rules.

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// One parsed source unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    /// Trailing expression without `;`: the value of the program.
    pub result: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    Let(LetStmt),
    Fn(FnDecl),
    Struct(StructDecl),
    ClassImpl(ImplDecl),
    Extern(FnSignature),
    Intrinsic(FnSignature),
    TypeAlias { name: Ident, target: TypeExpr },
    UnionType { name: Ident, members: Vec<TypeExpr> },
    ExpressionStatement(Stmt),
}

impl DeclarationKind {
    /// Name introduced into the item namespace, if any.
    pub fn item_name(&self) -> Option<&Ident> {
        match self {
            DeclarationKind::Fn(decl) => Some(&decl.name),
            DeclarationKind::Struct(decl) => Some(&decl.name),
            DeclarationKind::Extern(sig) | DeclarationKind::Intrinsic(sig) => Some(&sig.name),
            DeclarationKind::TypeAlias { name, .. } | DeclarationKind::UnionType { name, .. } => {
                Some(name)
            }
            DeclarationKind::Let(_)
            | DeclarationKind::ClassImpl(_)
            | DeclarationKind::ExpressionStatement(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: Ident,
    /// `<Length : USize>` marks a length parameter.
    pub bound: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    /// `...xs : [T; Length]`
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: FnBody,
    /// Methods only: `mut fn` takes `this : *mut Self`.
    pub mut_receiver: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    Block(Block),
    Expr(Expr),
}

/// `extern fn` / `intrinsic fn` signature without a body.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSignature {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<Field>,
    pub methods: Vec<FnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    pub target: Ident,
    pub type_params: Vec<TypeParam>,
    pub methods: Vec<FnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// Primitive, struct, alias or type parameter, with optional arguments.
    Named { name: String, args: Vec<TypeExpr> },
    Pointer { mutable: bool, target: Box<TypeExpr> },
    Array { element: Box<TypeExpr>, dims: Vec<Dim> },
    Function { params: Vec<TypeExpr>, ret: Box<TypeExpr> },
    Union(Vec<TypeExpr>),
}

/// One array dimension as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Size(i128),
    /// A length type parameter such as `Length`.
    Param(Ident),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Final expression without `;`.
    pub tail: Option<Box<Expr>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetStmt {
    pub name: Ident,
    pub mutable: bool,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let(LetStmt),
    Assign { target: Expr, value: Expr },
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Box<Stmt>>,
    },
    While { cond: Expr, body: Block },
    Return(Option<Expr>),
    Block(Block),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal text including any suffix (`100I32`).
    Int(String),
    Float(String),
    Bool(bool),
    /// Raw content between the quotes, escapes not yet processed.
    Char(String),
    Str(String),
    Ident(String),
    Array(Vec<Expr>),
    StructLit {
        name: Ident,
        type_args: Vec<TypeExpr>,
        fields: Vec<(Ident, Expr)>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Ref { mutable: bool, operand: Box<Expr> },
    Deref(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Ident,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
    },
    Field { base: Box<Expr>, field: Ident },
    Index { base: Box<Expr>, index: Box<Expr> },
    Is { operand: Box<Expr>, ty: TypeExpr },
    Paren(Box<Expr>),
}
