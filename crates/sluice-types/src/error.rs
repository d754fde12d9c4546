//! Expression evaluation errors.

use sluice_parser::Span;
use thiserror::Error;

/// An error raised while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("variable `${name}` has no value here")]
    Unbound { name: String, span: Span },

    #[error("field `{path}` cannot be accessed here")]
    NoRow { path: String, span: Span },

    #[error("unknown function `{name}`")]
    UnknownFunction { name: String, span: Span },

    #[error("function `{name}` expects {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("cannot apply `{op}` to `{left}` and `{right}`")]
    InvalidOperands {
        op: String,
        left: String,
        right: String,
        span: Span,
    },

    #[error("cannot apply `{op}` to `{ty}`")]
    InvalidOperand { op: String, ty: String, span: Span },

    #[error("expected `{expected}`, got `{found}`")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("division by zero")]
    DivisionByZero { span: Span },

    #[error("integer overflow")]
    Overflow { span: Span },
}

impl EvalError {
    /// Get the source span of this error.
    pub fn span(&self) -> Span {
        match self {
            EvalError::Unbound { span, .. } => *span,
            EvalError::NoRow { span, .. } => *span,
            EvalError::UnknownFunction { span, .. } => *span,
            EvalError::WrongArity { span, .. } => *span,
            EvalError::InvalidOperands { span, .. } => *span,
            EvalError::InvalidOperand { span, .. } => *span,
            EvalError::TypeMismatch { span, .. } => *span,
            EvalError::DivisionByZero { span } => *span,
            EvalError::Overflow { span } => *span,
        }
    }
}
