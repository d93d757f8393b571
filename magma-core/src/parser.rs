//! Recursive-descent parser.
//!
//! The splitter hands over one top-level statement at a time; each is
//! lexed and parsed into exactly one [`Declaration`]. Block bodies are
//! parsed from the same token stream, so only the top level depends on
//! the splitter's boundaries.

use tracing::debug;

use crate::ast::*;
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::Span;
use crate::splitter::{Statement, Terminator, split};

pub fn parse(source: &str) -> Result<Program, CoreError> {
    let statements = split(source)?;
    let mut program = Program::default();
    let last = statements.len().saturating_sub(1);

    for (index, statement) in statements.iter().enumerate() {
        let tokens = lex(statement.text, statement.offset)?;
        let mut parser = Parser {
            chunk: statement.text,
            tokens: &tokens,
            position: 0,
        };
        match parser.parse_top_level(statement)? {
            TopLevel::Declaration(decl) => program.declarations.push(decl),
            TopLevel::Value(expr) => {
                debug_assert_eq!(index, last);
                program.result = Some(expr);
            }
        }
        parser.expect_eof()?;
    }

    debug!(
        declarations = program.declarations.len(),
        has_result = program.result.is_some(),
        "parsed source unit"
    );
    Ok(program)
}

enum TopLevel {
    Declaration(Declaration),
    Value(Expr),
}

struct Parser<'a> {
    chunk: &'a str,
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // The lexer always appends Eof, so the last token is a safe fallback.
        self.tokens
            .get(self.position)
            .unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = *self.peek();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CoreError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_eof(&self) -> Result<(), CoreError> {
        if self.peek_kind() == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    fn unexpected(&self, what: &str) -> CoreError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Eof => "end of statement".to_string(),
            _ => format!("'{}'", token.text(self.chunk)),
        };
        CoreError::syntax(token.span, format!("expected {what}, found {found}"))
    }

    fn text(&self, token: &Token) -> String {
        token.text(self.chunk).to_string()
    }

    fn ident(&mut self, what: &str) -> Result<Ident, CoreError> {
        let token = self.expect(TokenKind::Ident, what)?;
        Ok(Ident {
            name: self.text(&token),
            span: token.span,
        })
    }

    fn previous_end(&self) -> u32 {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.previous_end().max(start.end))
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn parse_top_level(&mut self, statement: &Statement<'_>) -> Result<TopLevel, CoreError> {
        let start = self.peek().span;
        let needs_semicolon = |parser: &Self| -> Result<(), CoreError> {
            if statement.end == Terminator::Semicolon {
                Ok(())
            } else {
                Err(CoreError::syntax(
                    Span::new(parser.previous_end(), parser.previous_end()),
                    "missing ';'",
                ))
            }
        };

        let kind = match self.peek_kind() {
            TokenKind::Let => {
                let stmt = self.parse_let()?;
                needs_semicolon(self)?;
                DeclarationKind::Let(stmt)
            }
            TokenKind::Fn => {
                let decl = self.parse_fn(false)?;
                if matches!(decl.body, FnBody::Expr(_)) {
                    needs_semicolon(self)?;
                }
                DeclarationKind::Fn(decl)
            }
            TokenKind::Struct => DeclarationKind::Struct(self.parse_struct()?),
            TokenKind::Impl => DeclarationKind::ClassImpl(self.parse_impl()?),
            TokenKind::Extern => {
                self.advance();
                let sig = self.parse_signature()?;
                needs_semicolon(self)?;
                DeclarationKind::Extern(sig)
            }
            TokenKind::Intrinsic => {
                self.advance();
                let sig = self.parse_signature()?;
                needs_semicolon(self)?;
                DeclarationKind::Intrinsic(sig)
            }
            TokenKind::Type => {
                self.advance();
                let name = self.ident("type name")?;
                self.expect(TokenKind::Equal, "'=' in type declaration")?;
                let target = self.parse_type()?;
                needs_semicolon(self)?;
                match target.kind {
                    TypeExprKind::Union(members) => DeclarationKind::UnionType { name, members },
                    _ => DeclarationKind::TypeAlias { name, target },
                }
            }
            TokenKind::If | TokenKind::While | TokenKind::LBrace | TokenKind::Return => {
                let stmt = self.parse_stmt()?;
                if matches!(stmt.kind, StmtKind::Return(_)) {
                    needs_semicolon(self)?;
                }
                DeclarationKind::ExpressionStatement(stmt)
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(TokenKind::Equal) {
                    let value = self.parse_expr()?;
                    needs_semicolon(self)?;
                    let span = self.span_from(start);
                    DeclarationKind::ExpressionStatement(Stmt {
                        kind: StmtKind::Assign {
                            target: expr,
                            value,
                        },
                        span,
                    })
                } else if statement.end == Terminator::EndOfInput {
                    return Ok(TopLevel::Value(expr));
                } else {
                    let span = expr.span;
                    DeclarationKind::ExpressionStatement(Stmt {
                        kind: StmtKind::Expr(expr),
                        span,
                    })
                }
            }
        };

        Ok(TopLevel::Declaration(Declaration {
            kind,
            span: self.span_from(start),
        }))
    }

    fn parse_let(&mut self) -> Result<LetStmt, CoreError> {
        self.expect(TokenKind::Let, "'let'")?;
        let mutable = self.eat(TokenKind::Mut);
        let name = self.ident("binding name")?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Equal, "'=' in let binding")?;
        let init = self.parse_expr()?;
        Ok(LetStmt {
            name,
            mutable,
            ty,
            init,
        })
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParam>, CoreError> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::Less) {
            return Ok(params);
        }
        loop {
            let name = self.ident("type parameter")?;
            let bound = if self.eat(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParam { name, bound });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Greater, "'>' after type parameters")?;
        Ok(params)
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, CoreError> {
        self.expect(TokenKind::LParen, "'(' before parameters")?;
        let mut params = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                let variadic = self.eat(TokenKind::Ellipsis);
                let name = self.ident("parameter name")?;
                self.expect(TokenKind::Colon, "':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty, variadic });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')' after parameters")?;
        }
        Ok(params)
    }

    fn parse_signature(&mut self) -> Result<FnSignature, CoreError> {
        self.expect(TokenKind::Fn, "'fn'")?;
        let name = self.ident("function name")?;
        let params = self.parse_params()?;
        let ret = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok(FnSignature { name, params, ret })
    }

    fn parse_fn(&mut self, mut_receiver: bool) -> Result<FnDecl, CoreError> {
        let start = self.expect(TokenKind::Fn, "'fn'")?.span;
        let name = self.ident("function name")?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;
        let ret = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::FatArrow, "'=>' before function body")?;
        let body = if self.peek_kind() == TokenKind::LBrace {
            FnBody::Block(self.parse_block()?)
        } else {
            FnBody::Expr(self.parse_expr()?)
        };
        Ok(FnDecl {
            name,
            type_params,
            params,
            ret,
            body,
            mut_receiver,
            span: self.span_from(start),
        })
    }

    /// Methods inside `struct` / `impl` bodies. Expression bodies end with
    /// `;` here because the splitter only separates top-level statements.
    fn parse_method(&mut self) -> Result<FnDecl, CoreError> {
        let mut_receiver = self.eat(TokenKind::Mut);
        let decl = self.parse_fn(mut_receiver)?;
        if matches!(decl.body, FnBody::Expr(_)) {
            self.expect(TokenKind::Semi, "';' after method body")?;
        }
        Ok(decl)
    }

    fn parse_struct(&mut self) -> Result<StructDecl, CoreError> {
        self.expect(TokenKind::Struct, "'struct'")?;
        let name = self.ident("struct name")?;
        let type_params = self.parse_type_params()?;
        self.expect(TokenKind::LBrace, "'{' after struct name")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            match self.peek_kind() {
                TokenKind::Fn | TokenKind::Mut => methods.push(self.parse_method()?),
                TokenKind::Ident => {
                    let field = self.ident("field name")?;
                    self.expect(TokenKind::Colon, "':' after field name")?;
                    let ty = self.parse_type()?;
                    fields.push(Field { name: field, ty });
                    if !self.eat(TokenKind::Comma) {
                        self.eat(TokenKind::Semi);
                    }
                }
                _ => return Err(self.unexpected("field, method or '}'")),
            }
        }
        Ok(StructDecl {
            name,
            type_params,
            fields,
            methods,
        })
    }

    fn parse_impl(&mut self) -> Result<ImplDecl, CoreError> {
        self.expect(TokenKind::Impl, "'impl'")?;
        let target = self.ident("struct name after 'impl'")?;
        let type_params = self.parse_type_params()?;
        self.expect(TokenKind::LBrace, "'{' after impl target")?;
        let mut methods = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            methods.push(self.parse_method()?);
        }
        Ok(ImplDecl {
            target,
            type_params,
            methods,
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_type(&mut self) -> Result<TypeExpr, CoreError> {
        let first = self.parse_single_type()?;
        if self.peek_kind() != TokenKind::Pipe {
            return Ok(first);
        }
        let start = first.span;
        let mut members = vec![first];
        while self.eat(TokenKind::Pipe) {
            members.push(self.parse_single_type()?);
        }
        Ok(TypeExpr {
            kind: TypeExprKind::Union(members),
            span: self.span_from(start),
        })
    }

    fn parse_single_type(&mut self) -> Result<TypeExpr, CoreError> {
        let start = self.peek().span;
        let kind = match self.peek_kind() {
            TokenKind::Star => {
                self.advance();
                let mutable = self.eat(TokenKind::Mut);
                let target = self.parse_single_type()?;
                TypeExprKind::Pointer {
                    mutable,
                    target: Box::new(target),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let element = self.parse_type()?;
                self.expect(TokenKind::Semi, "';' in array type")?;
                let mut dims = vec![self.parse_dim()?];
                while self.eat(TokenKind::Comma) {
                    dims.push(self.parse_dim()?);
                }
                self.expect(TokenKind::RBracket, "']' after array type")?;
                TypeExprKind::Array {
                    element: Box::new(element),
                    dims,
                }
            }
            TokenKind::LParen => {
                self.advance();
                let mut params = Vec::new();
                if !self.eat(TokenKind::RParen) {
                    loop {
                        params.push(self.parse_type()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "')' in function type")?;
                }
                self.expect(TokenKind::FatArrow, "'=>' in function type")?;
                let ret = self.parse_single_type()?;
                TypeExprKind::Function {
                    params,
                    ret: Box::new(ret),
                }
            }
            TokenKind::Ident => {
                let name = self.ident("type name")?.name;
                let args = if self.peek_kind() == TokenKind::Less {
                    self.parse_type_args()?
                } else {
                    Vec::new()
                };
                TypeExprKind::Named { name, args }
            }
            _ => return Err(self.unexpected("type")),
        };
        Ok(TypeExpr {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_type_args(&mut self) -> Result<Vec<TypeExpr>, CoreError> {
        self.expect(TokenKind::Less, "'<'")?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Greater, "'>' after type arguments")?;
        Ok(args)
    }

    fn parse_dim(&mut self) -> Result<Dim, CoreError> {
        let negative = self.eat(TokenKind::Minus);
        match self.peek_kind() {
            TokenKind::IntLiteral => {
                let token = self.advance();
                let text = token.text(self.chunk).replace('_', "");
                let value: i128 = text.parse().map_err(|_| {
                    CoreError::syntax(token.span, format!("invalid array dimension '{text}'"))
                })?;
                Ok(Dim::Size(if negative { -value } else { value }))
            }
            TokenKind::Ident if !negative => Ok(Dim::Param(self.ident("dimension")?)),
            _ => Err(self.unexpected("array dimension")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Block, CoreError> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span;
        let mut stmts = Vec::new();
        let mut tail = None;
        while !self.eat(TokenKind::RBrace) {
            if self.peek_kind() == TokenKind::Eof {
                return Err(self.unexpected("'}'"));
            }
            match self.peek_kind() {
                TokenKind::Let
                | TokenKind::If
                | TokenKind::While
                | TokenKind::LBrace
                | TokenKind::Return => {
                    stmts.push(self.parse_stmt()?);
                }
                _ => {
                    let expr = self.parse_expr()?;
                    if self.eat(TokenKind::Equal) {
                        let value = self.parse_expr()?;
                        self.expect(TokenKind::Semi, "';' after assignment")?;
                        let span = expr.span.to(value.span);
                        stmts.push(Stmt {
                            kind: StmtKind::Assign {
                                target: expr,
                                value,
                            },
                            span,
                        });
                    } else if self.eat(TokenKind::Semi) {
                        let span = expr.span;
                        stmts.push(Stmt {
                            kind: StmtKind::Expr(expr),
                            span,
                        });
                    } else if self.peek_kind() == TokenKind::RBrace {
                        tail = Some(Box::new(expr));
                    } else {
                        return Err(self.unexpected("';'"));
                    }
                }
            }
        }
        Ok(Block {
            stmts,
            tail,
            span: self.span_from(start),
        })
    }

    /// Statement starting with a keyword or a block. Inside blocks `let`
    /// and `return` carry their own `;`; at the top level the splitter has
    /// already removed it.
    fn parse_stmt(&mut self) -> Result<Stmt, CoreError> {
        let start = self.peek().span;
        let kind = match self.peek_kind() {
            TokenKind::Let => {
                let stmt = self.parse_let()?;
                self.eat_statement_end()?;
                StmtKind::Let(stmt)
            }
            TokenKind::Return => {
                self.advance();
                let value = match self.peek_kind() {
                    TokenKind::Semi | TokenKind::Eof | TokenKind::RBrace => None,
                    _ => Some(self.parse_expr()?),
                };
                self.eat_statement_end()?;
                StmtKind::Return(value)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let cond = self.parse_condition()?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => return Err(self.unexpected("statement")),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn eat_statement_end(&mut self) -> Result<(), CoreError> {
        match self.peek_kind() {
            TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("';'")),
        }
    }

    fn parse_condition(&mut self) -> Result<Expr, CoreError> {
        self.expect(TokenKind::LParen, "'(' before condition")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<StmtKind, CoreError> {
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.parse_condition()?;
        let then_block = self.parse_block()?;
        let else_branch = if self.eat(TokenKind::Else) {
            let start = self.peek().span;
            let kind = if self.peek_kind() == TokenKind::If {
                self.parse_if()?
            } else {
                StmtKind::Block(self.parse_block()?)
            };
            Some(Box::new(Stmt {
                kind,
                span: self.span_from(start),
            }))
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_block,
            else_branch,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, CoreError> {
        self.parse_binary(0)
    }

    fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
        let entry = match kind {
            TokenKind::PipePipe => (BinaryOp::Or, 1),
            TokenKind::AmpAmp => (BinaryOp::And, 2),
            TokenKind::EqEq => (BinaryOp::Eq, 3),
            TokenKind::BangEq => (BinaryOp::Ne, 3),
            TokenKind::Less => (BinaryOp::Lt, 4),
            TokenKind::Greater => (BinaryOp::Gt, 4),
            TokenKind::LessEq => (BinaryOp::Le, 4),
            TokenKind::GreaterEq => (BinaryOp::Ge, 4),
            TokenKind::Plus => (BinaryOp::Add, 5),
            TokenKind::Minus => (BinaryOp::Sub, 5),
            TokenKind::Star => (BinaryOp::Mul, 6),
            TokenKind::Slash => (BinaryOp::Div, 6),
            TokenKind::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        };
        Some(entry)
    }

    /// Precedence climbing; `is` binds at the relational level.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CoreError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.peek_kind() == TokenKind::Is && min_prec <= 4 {
                self.advance();
                let ty = self.parse_type()?;
                let span = lhs.span.to(ty.span);
                lhs = Expr {
                    kind: ExprKind::Is {
                        operand: Box::new(lhs),
                        ty,
                    },
                    span,
                };
                continue;
            }
            let Some((op, prec)) = Self::binary_op(self.peek_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CoreError> {
        let start = self.peek().span;
        let kind = match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.parse_unary()?),
                }
            }
            TokenKind::Bang => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.parse_unary()?),
                }
            }
            TokenKind::Amp => {
                self.advance();
                let mutable = self.eat(TokenKind::Mut);
                ExprKind::Ref {
                    mutable,
                    operand: Box::new(self.parse_unary()?),
                }
            }
            // `&&x` lexes as one token; it is a double reference.
            TokenKind::AmpAmp => {
                return Err(CoreError::type_error(
                    start,
                    "cannot take a reference to a reference",
                ));
            }
            TokenKind::Star => {
                self.advance();
                ExprKind::Deref(Box::new(self.parse_unary()?))
            }
            _ => return self.parse_postfix(),
        };
        Ok(Expr {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CoreError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.ident("field or method name")?;
                    if self.peek_kind() == TokenKind::LParen {
                        let args = self.parse_args()?;
                        let span = self.span_from(expr.span);
                        expr = Expr {
                            kind: ExprKind::MethodCall {
                                receiver: Box::new(expr),
                                method: member,
                                args,
                            },
                            span,
                        };
                    } else {
                        let span = expr.span.to(member.span);
                        expr = Expr {
                            kind: ExprKind::Field {
                                base: Box::new(expr),
                                field: member,
                            },
                            span,
                        };
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']' after index")?;
                    let span = self.span_from(expr.span);
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CoreError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')' after arguments")?;
        }
        Ok(args)
    }

    /// Speculatively parse `<T, ...>` after an identifier. Succeeds only
    /// when the arguments are followed by `(` or `{`; otherwise the `<` is
    /// a comparison and the position is restored.
    fn try_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        if self.peek_kind() != TokenKind::Less {
            return None;
        }
        let saved = self.position;
        match self.parse_type_args() {
            Ok(args) if matches!(self.peek_kind(), TokenKind::LParen | TokenKind::LBrace) => {
                Some(args)
            }
            _ => {
                self.position = saved;
                None
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CoreError> {
        let token = *self.peek();
        let start = token.span;
        let kind = match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                ExprKind::Int(self.text(&token))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                ExprKind::Float(self.text(&token))
            }
            TokenKind::BoolLiteral => {
                self.advance();
                ExprKind::Bool(token.text(self.chunk).eq_ignore_ascii_case("true"))
            }
            TokenKind::CharLiteral => {
                self.advance();
                ExprKind::Char(self.text(&token))
            }
            TokenKind::StringLiteral => {
                self.advance();
                ExprKind::Str(self.text(&token))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                ExprKind::Paren(Box::new(inner))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.eat(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, "']' after array elements")?;
                }
                ExprKind::Array(elements)
            }
            TokenKind::Ident => {
                let name = self.ident("identifier")?;
                let type_args = self.try_type_args();
                match self.peek_kind() {
                    TokenKind::LParen => ExprKind::Call {
                        callee: name,
                        type_args: type_args.unwrap_or_default(),
                        args: self.parse_args()?,
                    },
                    TokenKind::LBrace if starts_uppercase(&name.name) => {
                        let fields = self.parse_struct_fields()?;
                        ExprKind::StructLit {
                            name,
                            type_args: type_args.unwrap_or_default(),
                            fields,
                        }
                    }
                    _ => ExprKind::Ident(name.name),
                }
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_struct_fields(&mut self) -> Result<Vec<(Ident, Expr)>, CoreError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let name = self.ident("field name")?;
            self.expect(TokenKind::Colon, "':' after field name")?;
            let value = self.parse_expr()?;
            fields.push((name, value));
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RBrace, "',' or '}' in struct literal")?;
                break;
            }
        }
        Ok(fields)
    }
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> DeclarationKind {
        let program = parse(source).expect("parse");
        assert_eq!(program.declarations.len(), 1);
        program.declarations.into_iter().next().unwrap().kind
    }

    #[test]
    fn parses_let_with_annotation() {
        let DeclarationKind::Let(stmt) = single("let mut x : I32 = 100;") else {
            panic!("expected let");
        };
        assert!(stmt.mutable);
        assert_eq!(stmt.name.name, "x");
        assert!(matches!(stmt.init.kind, ExprKind::Int(ref t) if t == "100"));
        assert!(matches!(
            stmt.ty.map(|t| t.kind),
            Some(TypeExprKind::Named { ref name, .. }) if name == "I32"
        ));
    }

    #[test]
    fn parses_generic_function() {
        let DeclarationKind::Fn(decl) = single("fn id<T>(value : T) : T => value;") else {
            panic!("expected fn");
        };
        assert_eq!(decl.type_params.len(), 1);
        assert_eq!(decl.params[0].name.name, "value");
        assert!(matches!(decl.body, FnBody::Expr(_)));
    }

    #[test]
    fn parses_struct_with_fields_and_methods() {
        let DeclarationKind::Struct(decl) =
            single("struct Point { x : I32, y : I32, fn sum() => this.x + this.y; }")
        else {
            panic!("expected struct");
        };
        assert_eq!(decl.fields.len(), 2);
        assert_eq!(decl.methods.len(), 1);
        assert!(!decl.methods[0].mut_receiver);
    }

    #[test]
    fn parses_union_declaration() {
        let kind = single("type Value = I32 | Bool;");
        assert!(matches!(kind, DeclarationKind::UnionType { ref members, .. } if members.len() == 2));
        let kind = single("type Id = U64;");
        assert!(matches!(kind, DeclarationKind::TypeAlias { .. }));
    }

    #[test]
    fn trailing_expression_becomes_program_result() {
        let program = parse("{let x = readInt();} x").expect("parse");
        assert_eq!(program.declarations.len(), 1);
        assert!(matches!(
            program.result.map(|e| e.kind),
            Some(ExprKind::Ident(ref n)) if n == "x"
        ));
    }

    #[test]
    fn distinguishes_generic_call_from_comparison() {
        let program = parse("let a = id<I32>(1); let b = x < y;").expect("parse");
        let DeclarationKind::Let(a) = &program.declarations[0].kind else {
            panic!()
        };
        assert!(matches!(&a.init.kind, ExprKind::Call { type_args, .. } if type_args.len() == 1));
        let DeclarationKind::Let(b) = &program.declarations[1].kind else {
            panic!()
        };
        assert!(matches!(
            b.init.kind,
            ExprKind::Binary {
                op: BinaryOp::Lt,
                ..
            }
        ));
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        let DeclarationKind::Let(stmt) = single("let x = 1 + 2 * 3;") else {
            panic!()
        };
        let ExprKind::Binary { op, rhs, .. } = stmt.init.kind else {
            panic!()
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_variadic_length_parameter() {
        let DeclarationKind::Fn(decl) =
            single("fn count<Length : USize>(...xs : [I32; Length]) : USize => Length;")
        else {
            panic!()
        };
        assert!(decl.params[0].variadic);
        assert!(decl.type_params[0].bound.is_some());
    }

    #[test]
    fn missing_semicolon_on_let_is_syntax_error() {
        let err = parse("let x = 1").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn missing_arrow_is_syntax_error() {
        let err = parse("fn f() { return 1; }").unwrap_err();
        assert!(err.message().contains("'=>'"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse("let x = 1 2;").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }
}
