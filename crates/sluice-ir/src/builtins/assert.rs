//! `assert <expr>, [message=string]`: drops events that violate `expr`
//! and warns about them.

use sluice_parser::{Expr, Record, Value};
use sluice_types::{matches, Diagnostic, ElementType};

use crate::ops::{ArgKind, ArgValue, Args, Description};
use crate::plan::{ExecCtx, ExecOperator};

pub fn description() -> Description {
    Description::new("assert")
        .positional("expr", ArgKind::Expression)
        .named("message", ArgKind::String)
        .spawn(ElementType::Events, ElementType::Events, spawn)
}

fn spawn(args: &Args) -> Box<dyn ExecOperator> {
    let expr = match args.positional(0) {
        Some(ArgValue::Expr(expr)) => expr.clone(),
        other => unreachable!("`assert` spawned with {:?}", other),
    };
    let message = match args.named("message").and_then(ArgValue::as_value) {
        Some(Value::String(message)) => message.clone(),
        _ => format!("assertion failed: {}", expr),
    };
    Box::new(AssertExec { expr, message })
}

#[derive(Debug)]
pub struct AssertExec {
    expr: Expr,
    message: String,
}

impl ExecOperator for AssertExec {
    fn name(&self) -> &str {
        "assert"
    }

    fn process(&mut self, batch: Vec<Record>, ctx: &ExecCtx<'_>) -> Vec<Record> {
        let total = batch.len();
        let mut failed = None;
        let kept: Vec<_> = batch
            .into_iter()
            .filter(|row| match matches(&self.expr, row, ctx.functions()) {
                Ok(true) => true,
                Ok(false) => {
                    failed.get_or_insert(None);
                    false
                }
                Err(err) => {
                    failed.get_or_insert(Some(err));
                    false
                }
            })
            .collect();
        if let Some(err) = failed {
            let mut diag = Diagnostic::warning(self.message.clone())
                .primary(self.expr.span())
                .note(format!("{} of {} events dropped", total - kept.len(), total));
            if let Some(err) = err {
                diag = diag.note(err.to_string());
            }
            ctx.dh().emit(diag);
        }
        kept
    }
}
