//! Statement splitter.
//!
//! Cuts a source unit into its top-level statements before any token is
//! produced. The scan keeps one depth counter per bracket family and a
//! flag for string/char literals, so `;` and `,` nested inside `[I32; 3]`,
//! array literals, argument lists or bodies never end a statement.
//!
//! A statement ends at a `;` at depth zero, or at a `}` returning to depth
//! zero when the statement is item-like (`struct`, `impl`, `fn`, `if`,
//! `while` or a bare block) and is not continued by `else`.

use tracing::trace;

use crate::error::CoreError;
use crate::span::Span;

/// A top-level statement as a slice of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'src> {
    pub text: &'src str,
    /// Byte offset of `text` inside the source unit.
    pub offset: u32,
    pub end: Terminator,
}

/// How a statement was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `;` at depth zero (not part of `text`).
    Semicolon,
    /// The closing `}` of an item-like statement (part of `text`).
    Brace,
    /// Ran into the end of the input. Only the last statement can end this
    /// way; an expression here is the program value.
    EndOfInput,
}

impl Statement<'_> {
    pub fn span(&self) -> Span {
        Span::new(self.offset, self.offset + self.text.len() as u32)
    }
}

#[derive(Debug, Default)]
struct Depths {
    paren: i64,
    brace: i64,
    bracket: i64,
}

impl Depths {
    fn is_zero(&self) -> bool {
        self.paren == 0 && self.brace == 0 && self.bracket == 0
    }
}

pub fn split(source: &str) -> Result<Vec<Statement<'_>>, CoreError> {
    let bytes = source.as_bytes();
    let mut statements = Vec::new();
    let mut depths = Depths::default();
    let mut start = 0usize;
    let mut index = 0usize;
    // Position of the `{` that opened the current depth-zero brace pair.
    let mut opened = 0usize;
    // (quote byte, position of the opening quote)
    let mut literal: Option<(u8, usize)> = None;

    while index < bytes.len() {
        let ch = bytes[index];

        if let Some((quote, _)) = literal {
            match ch {
                b'\\' => index += 1,
                _ if ch == quote => literal = None,
                _ => {}
            }
            index += 1;
            continue;
        }

        match ch {
            b'"' | b'\'' => literal = Some((ch, index)),
            b'/' if bytes.get(index + 1) == Some(&b'/') => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
                continue;
            }
            b'(' => depths.paren += 1,
            b'[' => depths.bracket += 1,
            b'{' => {
                if depths.is_zero() {
                    opened = index;
                }
                depths.brace += 1;
            }
            b')' | b']' | b'}' => {
                let counter = match ch {
                    b')' => &mut depths.paren,
                    b']' => &mut depths.bracket,
                    _ => &mut depths.brace,
                };
                *counter -= 1;
                if *counter < 0 {
                    return Err(CoreError::syntax(
                        Span::new(index as u32, index as u32 + 1),
                        format!("unbalanced '{}'", ch as char),
                    ));
                }
                if ch == b'}' && depths.is_zero() {
                    let chunk = &source[start..=index];
                    let head = &source[start..opened];
                    if ends_item(chunk, head) && !continues(&source[index + 1..]) {
                        push(&mut statements, source, start, index + 1, Terminator::Brace);
                        start = index + 1;
                    }
                }
            }
            b';' if depths.is_zero() => {
                push(&mut statements, source, start, index, Terminator::Semicolon);
                start = index + 1;
            }
            _ => {}
        }
        index += 1;
    }

    if let Some((quote, opened)) = literal {
        let what = if quote == b'"' { "string" } else { "character" };
        return Err(CoreError::syntax(
            Span::new(opened as u32, source.len() as u32),
            format!("unterminated {what} literal at end of input"),
        ));
    }
    if !depths.is_zero() {
        let open = if depths.brace > 0 {
            '{'
        } else if depths.paren > 0 {
            '('
        } else {
            '['
        };
        return Err(CoreError::syntax(
            Span::new(source.len() as u32, source.len() as u32),
            format!("unterminated '{open}' at end of input"),
        ));
    }

    push(&mut statements, source, start, source.len(), Terminator::EndOfInput);
    trace!(count = statements.len(), "split source into statements");
    Ok(statements)
}

fn push<'src>(
    statements: &mut Vec<Statement<'src>>,
    source: &'src str,
    start: usize,
    stop: usize,
    end: Terminator,
) {
    let raw = &source[start..stop];
    let body = skip_comments(raw);
    let leading = raw.len() - body.len();
    let text = body.trim_end();
    if text.is_empty() {
        return;
    }
    statements.push(Statement {
        text,
        offset: (start + leading) as u32,
        end,
    });
}

fn first_word(text: &str) -> &str {
    let text = skip_comments(text);
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn skip_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if text.starts_with("//") {
            text = text.find('\n').map_or("", |nl| &text[nl..]);
        } else {
            return text;
        }
    }
}

fn is_item_like(chunk: &str) -> bool {
    if skip_comments(chunk).starts_with('{') {
        return true;
    }
    matches!(first_word(chunk), "struct" | "impl" | "fn" | "if" | "while")
}

/// Whether a depth-zero `}` closes the statement. A function only ends at
/// the brace of a block body; an expression body such as a struct literal
/// runs on to its `;`.
fn ends_item(chunk: &str, head: &str) -> bool {
    if first_word(chunk) == "fn" {
        return head.trim_end().ends_with("=>");
    }
    is_item_like(chunk)
}

fn continues(rest: &str) -> bool {
    let rest = skip_comments(rest);
    first_word(rest) == "else" || rest.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        split(source).expect("split").iter().map(|s| s.text).collect()
    }

    #[test]
    fn splits_on_top_level_semicolons() {
        assert_eq!(texts("let x = 1; let y = 2;"), vec!["let x = 1", "let y = 2"]);
    }

    #[test]
    fn keeps_array_annotations_together() {
        assert_eq!(
            texts("let a : [I32; 3] = [1, 2, 3]; a"),
            vec!["let a : [I32; 3] = [1, 2, 3]", "a"]
        );
    }

    #[test]
    fn ends_items_at_closing_brace() {
        assert_eq!(
            texts("struct Empty {} let value : Empty = Empty {};"),
            vec!["struct Empty {}", "let value : Empty = Empty {}"]
        );
        assert_eq!(
            texts("fn f() => { return 1; } f()"),
            vec!["fn f() => { return 1; }", "f()"]
        );
    }

    #[test]
    fn expression_bodies_run_to_the_semicolon() {
        assert_eq!(
            texts("fn mk() => P { x : 1 }; let p = mk();"),
            vec!["fn mk() => P { x : 1 }", "let p = mk()"]
        );
        assert_eq!(
            texts("fn mk<T>(x : T) => W<T> { v : x }; mk(1)"),
            vec!["fn mk<T>(x : T) => W<T> { v : x }", "mk(1)"]
        );
        assert_eq!(
            texts("fn mk() : P => { P { x : 1 } } mk()"),
            vec!["fn mk() : P => { P { x : 1 } }", "mk()"]
        );
    }

    #[test]
    fn keeps_else_branches_attached() {
        assert_eq!(
            texts("if (true) { 1; } else { 2; } let x = 0;"),
            vec!["if (true) { 1; } else { 2; }", "let x = 0"]
        );
    }

    #[test]
    fn does_not_split_inside_strings() {
        assert_eq!(
            texts("let s : [U8; 3] = \"a;}\"; s"),
            vec!["let s : [U8; 3] = \"a;}\"", "s"]
        );
    }

    #[test]
    fn marks_trailing_expression_unterminated() {
        let statements = split("{let x = readInt();} x").expect("split");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].end, Terminator::Brace);
        assert_eq!(statements[1].text, "x");
        assert_eq!(statements[1].end, Terminator::EndOfInput);
        assert_eq!(statements[1].offset, 21);
    }

    #[test]
    fn reports_unterminated_brackets() {
        let err = split("fn f() => { return 1;").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
        let err = split("let a = [1, 2;").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn reports_unterminated_string() {
        let err = split("let s = \"abc;").unwrap_err();
        assert!(err.message().contains("unterminated string"));
    }

    #[test]
    fn reports_unbalanced_closer() {
        let err = split("let x = 1);").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 9, .. }));
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            texts("// header; not a statement\nlet x = 1; // trailing\n"),
            vec!["let x = 1"]
        );
    }
}
