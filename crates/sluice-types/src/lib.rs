//! Shared semantic building blocks for sluice.
//!
//! This crate provides:
//! - Element types flowing between operators (`types`)
//! - Diagnostics and the failure token (`diagnostic`)
//! - Builtin scalar functions (`functions`)
//! - Expression evaluation (`eval`)

pub mod diagnostic;
pub mod error;
pub mod eval;
pub mod functions;
pub mod types;

pub use diagnostic::{Annotation, Collector, Diagnostic, DiagnosticHandler, Failure, FailureOr, Severity};
pub use error::EvalError;
pub use eval::{compare, eval, matches};
pub use functions::{Function, FunctionTable};
pub use types::ElementType;
