//! Executable plans produced by finalization.
//!
//! A [`Plan`] is an ordered list of executable operators. Records are pushed
//! through it in batches; at the end of input every operator is finished in
//! turn and whatever it flushes flows through the operators after it.

use std::fmt;

use sluice_parser::Record;
use sluice_types::{DiagnosticHandler, FunctionTable};

/// Services available while executing.
#[derive(Clone, Copy)]
pub struct ExecCtx<'a> {
    functions: &'a FunctionTable,
    dh: &'a dyn DiagnosticHandler,
}

impl<'a> ExecCtx<'a> {
    pub fn new(functions: &'a FunctionTable, dh: &'a dyn DiagnosticHandler) -> Self {
        Self { functions, dh }
    }

    pub fn functions(&self) -> &'a FunctionTable {
        self.functions
    }

    pub fn dh(&self) -> &'a dyn DiagnosticHandler {
        self.dh
    }
}

/// A runnable operator instance.
pub trait ExecOperator: fmt::Debug {
    fn name(&self) -> &str;

    /// Consume one batch and return the records to pass downstream.
    fn process(&mut self, batch: Vec<Record>, ctx: &ExecCtx<'_>) -> Vec<Record>;

    /// Flush buffered state at the end of input.
    fn finish(&mut self, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        Vec::new()
    }
}

pub type Plan = Vec<Box<dyn ExecOperator>>;

/// Push one batch through every operator of `plan`.
pub fn push_batch(plan: &mut [Box<dyn ExecOperator>], batch: Vec<Record>, ctx: &ExecCtx<'_>) -> Vec<Record> {
    plan.iter_mut().fold(batch, |batch, op| op.process(batch, ctx))
}

/// Finish every operator of `plan` in order, feeding what each one flushes
/// into the operators after it.
pub fn finish_plan(plan: &mut [Box<dyn ExecOperator>], ctx: &ExecCtx<'_>) -> Vec<Record> {
    let mut carry = Vec::new();
    for op in plan.iter_mut() {
        let mut out = if carry.is_empty() {
            Vec::new()
        } else {
            op.process(carry, ctx)
        };
        out.extend(op.finish(ctx));
        tracing::trace!(operator = op.name(), flushed = out.len(), "finished operator");
        carry = out;
    }
    carry
}
