//! Sluice Parser
//!
//! Lexer, AST and parser for the sluice pipeline language.

pub mod ast;
pub mod error;
pub mod formatter;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod value;

pub use ast::*;
pub use error::ParseError;
pub use formatter::{format_invocation, format_pipeline};
pub use parser::{parse, parse_expr};
pub use span::{Located, Span};
pub use value::{Record, Value};
