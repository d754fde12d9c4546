//! `head [count]`: the first `count` events, 10 by default.

use sluice_parser::{Argument, Expr, Invocation, Record, Span, Value};
use sluice_types::{Diagnostic, DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{CompileCtx, FinalizeCtx, SubstituteCtx};
use crate::expr::{const_eval, ExprExt, SubstituteResult};
use crate::operator::{
    default_optimize, expect_events, EventOrder, NativeOperator, Operator, OperatorCompiler, OptimizeFilter,
    OptimizeResult,
};
use crate::plan::{ExecCtx, ExecOperator, Plan};

const USAGE: &str = "head [count:uint]";
const DEFAULT_COUNT: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
enum Count {
    Expr(Expr),
    Value(u64),
}

#[derive(Debug, Clone)]
pub struct HeadIr {
    op: Span,
    count: Count,
}

impl NativeOperator for HeadIr {
    fn name(&self) -> &str {
        "head"
    }

    fn main_location(&self) -> Span {
        self.op
    }

    fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        let Count::Expr(expr) = &mut self.count else {
            return Ok(());
        };
        if expr.substitute(ctx) == SubstituteResult::SomeRemaining {
            return Ok(());
        }
        if !instantiate && !expr.is_deterministic(ctx.base().functions()) {
            return Ok(());
        }
        let count = match const_eval(expr, ctx.base())? {
            Value::UInt(n) => n,
            Value::Int(n) if n >= 0 => n as u64,
            Value::Int(n) => {
                return Err(Diagnostic::error(format!("expected positive integer, got `{}`", n))
                    .primary(expr.span())
                    .usage(USAGE)
                    .emit(ctx.dh()));
            }
            other => {
                return Err(Diagnostic::error(format!("expected uint but got {}", other.type_name()))
                    .primary(expr.span())
                    .usage(USAGE)
                    .emit(ctx.dh()));
            }
        };
        self.count = Count::Value(count);
        Ok(())
    }

    fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        expect_events(input, self.op, dh)?;
        Ok(Some(ElementType::Events))
    }

    fn optimize(self: Box<Self>, filter: OptimizeFilter, _order: EventOrder) -> OptimizeResult {
        default_optimize(Operator::Native(self), filter)
    }

    fn finalize(self: Box<Self>, _ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        match self.count {
            Count::Value(remaining) => Ok(vec![Box::new(HeadExec { remaining })]),
            Count::Expr(expr) => unreachable!("`head {}` finalized before instantiation", expr),
        }
    }

    fn clone_box(&self) -> Box<dyn NativeOperator> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct HeadCompiler;

impl OperatorCompiler for HeadCompiler {
    fn compile(&self, inv: Invocation, ctx: &CompileCtx<'_>) -> FailureOr<Operator> {
        let mut count = None;
        for arg in inv.args {
            match arg {
                Argument::Named(name, _) => {
                    return Err(Diagnostic::error(format!("named argument `{}` does not exist", name.name))
                        .primary(name.span)
                        .usage(USAGE)
                        .emit(ctx.dh()));
                }
                Argument::Positional(expr) if count.is_some() => {
                    return Err(Diagnostic::error("too many positional arguments")
                        .primary(expr.span())
                        .usage(USAGE)
                        .emit(ctx.dh()));
                }
                Argument::Positional(mut expr) => {
                    expr.bind(ctx)?;
                    count = Some(expr);
                }
            }
        }
        let mut ir = HeadIr {
            op: inv.op.span,
            count: count.map_or(Count::Value(DEFAULT_COUNT), Count::Expr),
        };
        ir.substitute(&SubstituteCtx::new(ctx.base(), None), false)?;
        Ok(Operator::Native(Box::new(ir)))
    }
}

#[derive(Debug)]
pub struct HeadExec {
    remaining: u64,
}

impl ExecOperator for HeadExec {
    fn name(&self) -> &str {
        "head"
    }

    fn process(&mut self, mut batch: Vec<Record>, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        let take = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(batch.len());
        batch.truncate(take);
        self.remaining -= take as u64;
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::{BaseCtx, Root};
    use crate::registry::Registry;
    use sluice_parser::{parse, Statement};
    use sluice_types::Collector;

    fn compile(source: &str) -> (FailureOr<Operator>, Collector) {
        let dh = Collector::new();
        let reg = Registry::builtin();
        let inv = match parse(source).unwrap().body.remove(0) {
            Statement::Invocation(inv) => inv,
            other => panic!("unexpected {:?}", other),
        };
        let result = {
            let root = Root::new(BaseCtx::new(&dh, &reg));
            HeadCompiler.compile(inv, &root.ctx())
        };
        (result, dh)
    }

    #[test]
    fn default_and_explicit_counts() {
        let (op, _) = compile("head");
        assert!(format!("{:?}", op.unwrap()).contains("Value(10)"));
        let (op, _) = compile("head 3");
        assert!(format!("{:?}", op.unwrap()).contains("Value(3)"));
    }

    #[test]
    fn rejects_bad_counts() {
        let (op, dh) = compile("head -1");
        assert!(op.is_err());
        assert_eq!(dh.messages(), vec!["expected positive integer, got `-1`".to_string()]);
        let (op, dh) = compile("head \"x\"");
        assert!(op.is_err());
        assert_eq!(dh.messages(), vec!["expected uint but got string".to_string()]);
        let (op, dh) = compile("head 1, 2");
        assert!(op.is_err());
        assert_eq!(dh.messages(), vec!["too many positional arguments".to_string()]);
    }

    #[test]
    fn row_dependent_count_fails_at_instantiation() {
        let (op, dh) = compile("head a");
        let mut op = op.unwrap();
        assert!(dh.diagnostics().is_empty());
        let reg = Registry::builtin();
        let base = BaseCtx::new(&dh, &reg);
        assert!(op.substitute(&SubstituteCtx::new(base, None), true).is_err());
        assert_eq!(dh.messages(), vec!["field `a` cannot be accessed here".to_string()]);
    }

    #[test]
    fn exec_stops_after_count() {
        let functions = sluice_types::FunctionTable::builtin();
        let dh = Collector::new();
        let ctx = ExecCtx::new(&functions, &dh);
        let mut exec = HeadExec { remaining: 3 };
        let rows = vec![Record::new(), Record::new()];
        assert_eq!(exec.process(rows.clone(), &ctx).len(), 2);
        assert_eq!(exec.process(rows.clone(), &ctx).len(), 1);
        assert_eq!(exec.process(rows, &ctx).len(), 0);
    }
}
