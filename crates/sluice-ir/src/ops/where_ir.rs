//! `where <expr>`: keeps the rows for which the predicate is `true`.

use sluice_parser::{Argument, Expr, Invocation, Record, Span};
use sluice_types::{matches, Diagnostic, DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{CompileCtx, FinalizeCtx, SubstituteCtx};
use crate::expr::{ExprExt, SubstituteResult};
use crate::operator::{expect_events, EventOrder, OperatorCompiler, OptimizeFilter, OptimizeResult};
use crate::plan::{ExecCtx, ExecOperator, Plan};
use crate::Operator;

const USAGE: &str = "where predicate:expr";

#[derive(Debug, Clone)]
pub struct WhereIr {
    expr: Expr,
}

impl WhereIr {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn main_location(&self) -> Span {
        self.expr.span()
    }

    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        let result = self.expr.substitute(ctx);
        debug_assert!(
            !instantiate || result == SubstituteResult::NoRemaining,
            "`where` keeps unresolved variables after instantiation"
        );
        Ok(())
    }

    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        expect_events(input, self.main_location(), dh)?;
        Ok(Some(ElementType::Events))
    }

    /// A filter commutes with itself: hand the predicate upstream and vanish.
    pub fn optimize(self, mut filter: OptimizeFilter, order: EventOrder) -> OptimizeResult {
        tracing::trace!(predicate = %self.expr, "pushing `where` upstream");
        filter.insert(0, self.expr);
        OptimizeResult {
            filter,
            order,
            replacement: Vec::new(),
        }
    }

    pub fn finalize(self, _ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        Ok(vec![Box::new(WhereExec { expr: self.expr })])
    }
}

/// Compiles `where` invocations.
#[derive(Debug, Default)]
pub struct WhereCompiler;

impl OperatorCompiler for WhereCompiler {
    fn compile(&self, inv: Invocation, ctx: &CompileCtx<'_>) -> FailureOr<Operator> {
        let mut args = inv.args.into_iter();
        let mut expr = match args.next() {
            Some(Argument::Positional(expr)) => expr,
            Some(Argument::Named(name, _)) => {
                return Err(Diagnostic::error(format!("named argument `{}` does not exist", name.name))
                    .primary(name.span)
                    .usage(USAGE)
                    .emit(ctx.dh()));
            }
            None => {
                return Err(Diagnostic::error("expected exactly 1 positional argument(s)")
                    .primary(inv.op.span)
                    .usage(USAGE)
                    .emit(ctx.dh()));
            }
        };
        if let Some(extra) = args.next() {
            return Err(Diagnostic::error("too many positional arguments")
                .primary(extra.span())
                .usage(USAGE)
                .emit(ctx.dh()));
        }
        expr.bind(ctx)?;
        Ok(Operator::Where(WhereIr::new(expr)))
    }
}

#[derive(Debug)]
pub struct WhereExec {
    expr: Expr,
}

impl ExecOperator for WhereExec {
    fn name(&self) -> &str {
        "where"
    }

    fn process(&mut self, batch: Vec<Record>, ctx: &ExecCtx<'_>) -> Vec<Record> {
        let mut warned = false;
        batch
            .into_iter()
            .filter(|row| match matches(&self.expr, row, ctx.functions()) {
                Ok(keep) => keep,
                Err(err) => {
                    if !warned {
                        ctx.dh().emit(Diagnostic::warning(err.to_string()).primary(err.span()));
                        warned = true;
                    }
                    false
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_parser::{parse_expr, Value};
    use sluice_types::{Collector, FunctionTable};

    #[test]
    fn optimize_absorbs_into_filter() {
        let ir = WhereIr::new(parse_expr("a == 1").unwrap());
        let result = ir.optimize(vec![parse_expr("b > 2").unwrap()], EventOrder::Unordered);
        assert!(result.replacement.is_empty());
        assert_eq!(result.order, EventOrder::Unordered);
        let filter: Vec<_> = result.filter.iter().map(ToString::to_string).collect();
        assert_eq!(filter, vec!["a == 1", "b > 2"]);
    }

    #[test]
    fn exec_drops_rows_and_warns_once() {
        let functions = FunctionTable::builtin();
        let dh = Collector::new();
        let ctx = ExecCtx::new(&functions, &dh);
        let mut exec = WhereExec {
            expr: parse_expr("a > 1").unwrap(),
        };
        let rows = vec![
            Record::from_fields(vec![("a".to_string(), Value::Int(2))]),
            Record::from_fields(vec![("a".to_string(), Value::String("x".into()))]),
            Record::from_fields(vec![("a".to_string(), Value::String("y".into()))]),
            Record::from_fields(vec![("a".to_string(), Value::Int(0))]),
        ];
        let out = exec.process(rows, &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(dh.diagnostics().len(), 1);
        assert!(!dh.has_failure());
    }
}
