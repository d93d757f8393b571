use thiserror::Error;

use crate::span::Span;

/// The single error type of the compiler core.
///
/// Every stage fails fast with the first problem it finds; there is no
/// recovery and no partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("type error at byte {position}: {message}")]
    Type { position: usize, message: String },
    #[error("range error at byte {position}: {message}")]
    Range { position: usize, message: String },
    #[error("scope error at byte {position}: {message}")]
    Scope { position: usize, message: String },
    #[error("borrow error at byte {position}: {message}")]
    Borrow { position: usize, message: String },
    #[error("array error at byte {position}: {message}")]
    Array { position: usize, message: String },
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl CoreError {
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        CoreError::Syntax {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        CoreError::Type {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn range(span: Span, message: impl Into<String>) -> Self {
        CoreError::Range {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn scope(span: Span, message: impl Into<String>) -> Self {
        CoreError::Scope {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn borrow(span: Span, message: impl Into<String>) -> Self {
        CoreError::Borrow {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn array(span: Span, message: impl Into<String>) -> Self {
        CoreError::Array {
            position: span.position(),
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        CoreError::Runtime(message.into())
    }

    /// Human-readable message without the class/position prefix.
    pub fn message(&self) -> &str {
        match self {
            CoreError::Syntax { message, .. }
            | CoreError::Type { message, .. }
            | CoreError::Range { message, .. }
            | CoreError::Scope { message, .. }
            | CoreError::Borrow { message, .. }
            | CoreError::Array { message, .. } => message,
            CoreError::Runtime(message) => message,
        }
    }
}
