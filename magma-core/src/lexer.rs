//! Lexer for Magma statements.
//!
//! Each top-level statement handed out by the splitter is lexed on its
//! own; spans are shifted by the statement offset so they always point
//! into the whole source unit.

use crate::error::CoreError;
use crate::span::Span;

/// Kind of a token produced by the lexer.
///
/// The lexer recognizes keywords and literal shapes only. Literal
/// suffixes (`100I32`) stay attached to the literal text and are
/// interpreted by the type resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,
    BoolLiteral, // true / false, any letter case

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Semi,     // ;
    Colon,    // :
    Dot,      // .
    Ellipsis, // ...

    // Operators
    Equal,     // =
    EqEq,      // ==
    BangEq,    // !=
    Less,      // <
    Greater,   // >
    LessEq,    // <=
    GreaterEq, // >=
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Amp,       // &
    AmpAmp,    // &&
    Pipe,      // |
    PipePipe,  // ||
    Bang,      // !
    FatArrow,  // =>

    // Keywords
    Let,
    Mut,
    Fn,
    Struct,
    Impl,
    Extern,
    Intrinsic,
    Type,
    Return,
    If,
    Else,
    While,
    Is,
}

/// A single token with its kind and span.
///
/// `span` is absolute in the source unit. `text_start` / `text_end` are
/// byte offsets into the lexed chunk; for string and char literals they
/// exclude the quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

impl Token {
    pub fn text<'src>(&self, chunk: &'src str) -> &'src str {
        &chunk[self.text_start as usize..self.text_end as usize]
    }
}

/// Lex one statement chunk that starts at byte `offset` of the unit.
///
/// The returned tokens always end with an `Eof` token.
pub fn lex(chunk: &str, offset: u32) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        source: chunk,
        chars: chunk.as_bytes(),
        len: chunk.len(),
        index: 0,
        offset,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    len: usize,
    index: usize,
    offset: u32,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                while let Some(c) = self.peek_char() {
                    if c == b'\n' {
                        break;
                    }
                    self.consume_char();
                }
                continue;
            }

            let start = self.index as u32;
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b':' => self.single(TokenKind::Colon, start),
                b'+' => self.single(TokenKind::Plus, start),
                b'-' => self.single(TokenKind::Minus, start),
                b'*' => self.single(TokenKind::Star, start),
                b'/' => self.single(TokenKind::Slash, start),
                b'%' => self.single(TokenKind::Percent, start),
                b'.' => {
                    if self.peek_next() == Some(b'.') && self.chars.get(self.index + 2) == Some(&b'.')
                    {
                        self.consume_char();
                        self.consume_char();
                        self.single(TokenKind::Ellipsis, start)
                    } else {
                        self.single(TokenKind::Dot, start)
                    }
                }
                b'=' => match self.peek_next() {
                    Some(b'=') => self.double(TokenKind::EqEq, start),
                    Some(b'>') => self.double(TokenKind::FatArrow, start),
                    _ => self.single(TokenKind::Equal, start),
                },
                b'!' => match self.peek_next() {
                    Some(b'=') => self.double(TokenKind::BangEq, start),
                    _ => self.single(TokenKind::Bang, start),
                },
                b'<' => match self.peek_next() {
                    Some(b'=') => self.double(TokenKind::LessEq, start),
                    _ => self.single(TokenKind::Less, start),
                },
                b'>' => match self.peek_next() {
                    Some(b'=') => self.double(TokenKind::GreaterEq, start),
                    _ => self.single(TokenKind::Greater, start),
                },
                b'&' => match self.peek_next() {
                    Some(b'&') => self.double(TokenKind::AmpAmp, start),
                    _ => self.single(TokenKind::Amp, start),
                },
                b'|' => match self.peek_next() {
                    Some(b'|') => self.double(TokenKind::PipePipe, start),
                    _ => self.single(TokenKind::Pipe, start),
                },
                b'"' => self.lex_quoted(start, b'"', TokenKind::StringLiteral)?,
                b'\'' => self.lex_quoted(start, b'\'', TokenKind::CharLiteral)?,
                b'0'..=b'9' => self.lex_number(start),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => {
                    let span = self.span(start, start + 1);
                    return Err(CoreError::syntax(
                        span,
                        format!("unexpected character '{}'", ch as char),
                    ));
                }
            };
            tokens.push(token);
        }

        let end = self.len as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: self.span(end, end),
            text_start: end,
            text_end: end,
        });
        Ok(tokens)
    }

    fn span(&self, start: u32, end: u32) -> Span {
        Span::new(start, end).offset(self.offset)
    }

    fn single(&mut self, kind: TokenKind, start: u32) -> Token {
        self.consume_char();
        self.finish(kind, start)
    }

    fn double(&mut self, kind: TokenKind, start: u32) -> Token {
        self.consume_char();
        self.consume_char();
        self.finish(kind, start)
    }

    fn finish(&self, kind: TokenKind, start: u32) -> Token {
        let end = self.index as u32;
        Token {
            kind,
            span: self.span(start, end),
            text_start: start,
            text_end: end,
        }
    }

    fn lex_quoted(&mut self, start: u32, quote: u8, kind: TokenKind) -> Result<Token, CoreError> {
        // Consume the opening quote
        self.consume_char();

        let content_start = self.index;
        while let Some(ch) = self.peek_char() {
            if ch == quote {
                let content_end = self.index;
                self.consume_char();
                return Ok(Token {
                    kind,
                    span: self.span(start, self.index as u32),
                    text_start: content_start as u32,
                    text_end: content_end as u32,
                });
            }
            if ch == b'\\' {
                // Escapes are validated by the resolver; only skip them here.
                self.consume_char();
            }
            self.consume_char();
        }

        let what = if quote == b'"' { "string" } else { "character" };
        Err(CoreError::syntax(
            self.span(start, self.index as u32),
            format!("unterminated {what} literal"),
        ))
    }

    fn lex_number(&mut self, start: u32) -> Token {
        self.consume_digits();

        let mut is_float = false;
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.consume_char(); // '.'
            self.consume_digits();
        }

        // Type suffix such as `I32` or `U8` stays part of the literal text.
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.finish(kind, start)
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> Token {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let text = &self.source[start as usize..self.index];
        let kind = match text {
            "let" => TokenKind::Let,
            "mut" => TokenKind::Mut,
            "fn" => TokenKind::Fn,
            "struct" => TokenKind::Struct,
            "impl" => TokenKind::Impl,
            "extern" => TokenKind::Extern,
            "intrinsic" => TokenKind::Intrinsic,
            "type" => TokenKind::Type,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "is" => TokenKind::Is,
            _ if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") => {
                TokenKind::BoolLiteral
            }
            _ => TokenKind::Ident,
        };
        self.finish(kind, start)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, 0)
            .expect("lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_let_with_suffixed_literal() {
        let source = "let x = 100I32";
        let tokens = lex(source, 0).expect("lex");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::IntLiteral,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[3].text(source), "100I32");
    }

    #[test]
    fn lexes_compound_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e => && || ..."),
            vec![
                TokenKind::Ident,
                TokenKind::EqEq,
                TokenKind::Ident,
                TokenKind::BangEq,
                TokenKind::Ident,
                TokenKind::LessEq,
                TokenKind::Ident,
                TokenKind::GreaterEq,
                TokenKind::Ident,
                TokenKind::FatArrow,
                TokenKind::AmpAmp,
                TokenKind::PipePipe,
                TokenKind::Ellipsis,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn bool_literals_ignore_case() {
        assert_eq!(
            kinds("TRUE False"),
            vec![TokenKind::BoolLiteral, TokenKind::BoolLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn float_keeps_decimal_point() {
        let source = "1.5 2";
        let tokens = lex(source, 0).expect("lex");
        assert_eq!(tokens[0].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[0].text(source), "1.5");
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral);
    }

    #[test]
    fn quoted_literals_exclude_quotes() {
        let source = r#"'a' "h\"i""#;
        let tokens = lex(source, 0).expect("lex");
        assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[0].text(source), "a");
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].text(source), r#"h\"i"#);
    }

    #[test]
    fn spans_are_shifted_by_offset() {
        let tokens = lex("x", 10).expect("lex");
        assert_eq!(tokens[0].span, Span::new(10, 11));
    }

    #[test]
    fn rejects_unknown_character() {
        let err = lex("let x = 1 @ 2", 0).unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 10, .. }));
    }
}
