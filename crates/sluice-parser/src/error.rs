//! Parse error types.

use miette::Diagnostic;
use thiserror::Error;

use crate::span::Span;

/// A parse error.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(sluice::parse::unexpected_token))]
    UnexpectedToken {
        #[label("here")]
        span: Span,
        expected: String,
        found: String,
    },

    #[error("unexpected end of input: expected {expected}")]
    #[diagnostic(code(sluice::parse::unexpected_eof))]
    UnexpectedEof {
        #[label("input ends here")]
        span: Span,
        expected: String,
    },

    #[error("invalid token")]
    #[diagnostic(
        code(sluice::parse::invalid_token),
        help("strings only support the escapes \\n, \\t, \\r, \\\\ and \\\"")
    )]
    InvalidToken {
        #[label("not recognized")]
        span: Span,
    },
}

impl ParseError {
    pub fn unexpected_token(span: Span, expected: impl Into<String>, found: impl Into<String>) -> Self {
        ParseError::UnexpectedToken {
            span,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(span: Span, expected: impl Into<String>) -> Self {
        ParseError::UnexpectedEof {
            span,
            expected: expected.into(),
        }
    }

    /// Get the span of the error.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::InvalidToken { span } => *span,
        }
    }
}
