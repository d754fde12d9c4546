//! Built-in IR node kinds.

mod generic;
mod if_ir;
mod legacy_ir;
mod where_ir;

pub use generic::{ArgKind, ArgValue, Args, Description, GenericCompiler, GenericIr, Named, Positional, Spawn};
pub use if_ir::{IfExec, IfIr};
pub use legacy_ir::LegacyIr;
pub use where_ir::{WhereCompiler, WhereExec, WhereIr};
