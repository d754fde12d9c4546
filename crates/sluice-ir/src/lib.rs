//! Sluice Intermediate Representation
//!
//! Compiles parsed pipelines into IR, propagates `let` constants, pushes
//! filters upstream and lowers the result into an executable plan.

pub mod builtins;
pub mod compile;
pub mod ctx;
pub mod expr;
pub mod legacy;
pub mod operator;
pub mod ops;
pub mod pipeline;
pub mod plan;
pub mod registry;

pub use compile::{compile, MAX_UDO_DEPTH};
pub use ctx::{BaseCtx, CompileCtx, Env, FinalizeCtx, Root, Scope, SubstEnv, SubstituteCtx};
pub use expr::{const_eval, ExprExt, SubstituteResult};
pub use legacy::{LegacyOperator, OperatorFactory, Predicate};
pub use operator::{EventOrder, NativeOperator, Operator, OperatorCompiler, OptimizeFilter, OptimizeResult};
pub use pipeline::{Let, Optimized, Pipeline};
pub use plan::{finish_plan, push_batch, ExecCtx, ExecOperator, Plan};
pub use registry::{OperatorDef, Registry};
