//! IR pipelines: `let` entries followed by operator nodes.

use sluice_parser::{Expr, Ident, LetId};
use sluice_types::{DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{FinalizeCtx, SubstituteCtx};
use crate::expr::{const_eval, ExprExt, SubstituteResult};
use crate::operator::{EventOrder, Operator, OptimizeFilter};
use crate::ops::WhereIr;
use crate::plan::Plan;

/// A `let` binding that has not been instantiated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub name: Ident,
    pub expr: Expr,
    pub id: LetId,
}

/// A pipeline after optimization, with what was left for upstream.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub pipeline: Pipeline,
    pub filter: OptimizeFilter,
    pub order: EventOrder,
}

/// The IR of a pipeline body.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub lets: Vec<Let>,
    pub operators: Vec<Operator>,
}

impl Pipeline {
    pub fn new(lets: Vec<Let>, operators: Vec<Operator>) -> Self {
        Self { lets, operators }
    }

    /// Propagate known constants.
    ///
    /// When `instantiate` is set, every `let` is evaluated in order, each
    /// seeing the ones before it, every operator is instantiated with the
    /// final environment and the `let` list is cleared.
    #[tracing::instrument(level = "debug", skip_all, fields(instantiate = instantiate))]
    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        if !instantiate {
            for entry in &mut self.lets {
                entry.expr.substitute(ctx);
            }
            for op in &mut self.operators {
                op.substitute(ctx, false)?;
            }
            return Ok(());
        }
        let mut env = ctx.env();
        for entry in &mut self.lets {
            let result = entry.expr.substitute(&ctx.with_env(&env));
            assert_eq!(
                result,
                SubstituteResult::NoRemaining,
                "`${}` still references unknown bindings",
                entry.name.name
            );
            let value = const_eval(&entry.expr, ctx.base())?;
            tracing::debug!(name = %entry.name.name, id = %entry.id, %value, "instantiated binding");
            let previous = env.insert(entry.id, value);
            assert!(previous.is_none(), "binding {} instantiated twice", entry.id);
        }
        let inner = ctx.with_env(&env);
        for op in &mut self.operators {
            op.substitute(&inner, true)?;
        }
        self.lets.clear();
        Ok(())
    }

    /// Fold the operators backwards, pushing predicates upstream. The `let`
    /// list is kept as is.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn optimize(self, filter: OptimizeFilter, order: EventOrder) -> Optimized {
        let mut filter = filter;
        let mut order = order;
        let mut operators = Vec::new();
        for op in self.operators.into_iter().rev() {
            let result = op.optimize(filter, order);
            filter = result.filter;
            order = result.order;
            operators.splice(0..0, result.replacement);
        }
        Optimized {
            pipeline: Pipeline::new(self.lets, operators),
            filter,
            order,
        }
    }

    /// Left fold over the operators. Stops with "no opinion" as soon as one
    /// operator has none.
    #[tracing::instrument(level = "debug", skip_all, fields(input = %input))]
    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        let mut current = input;
        for op in &self.operators {
            match op.infer_type(current, dh)? {
                Some(output) => current = output,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Optimize and lower an instantiated pipeline. Lowers as is when the
    /// context has optimization switched off.
    #[tracing::instrument(level = "debug", skip_all, fields(optimize = ctx.optimize()))]
    pub fn finalize(self, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        assert!(self.lets.is_empty(), "finalizing a pipeline that was not instantiated");
        if !ctx.optimize() {
            return lower(self.operators, ctx);
        }
        let optimized = self.optimize(Vec::new(), EventOrder::Ordered);
        let mut operators: Vec<Operator> = optimized
            .filter
            .into_iter()
            .map(|expr| Operator::Where(WhereIr::new(expr)))
            .collect();
        operators.extend(optimized.pipeline.operators);
        lower(operators, ctx)
    }

    /// Lower an instantiated pipeline, nested pipelines included, without
    /// optimizing it.
    pub fn finalize_unoptimized(self, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        self.finalize(&ctx.unoptimized())
    }
}

fn lower(operators: Vec<Operator>, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
    let mut input = ctx.input();
    let mut plan = Plan::new();
    for op in operators {
        let next = op.infer_type(input, ctx.dh())?;
        plan.extend(op.finalize(&ctx.with_input(input))?);
        if let Some(next) = next {
            input = next;
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::ctx::{BaseCtx, Root};
    use crate::registry::Registry;
    use pretty_assertions::assert_eq;
    use sluice_parser::parse;
    use sluice_types::Collector;

    fn instantiate(reg: &Registry, dh: &Collector, source: &str) -> Pipeline {
        let base = BaseCtx::new(dh, reg);
        let mut pipe = {
            let root = Root::new(base);
            compile(parse(source).unwrap(), &root.ctx()).unwrap()
        };
        pipe.substitute(&SubstituteCtx::new(base, None), true).unwrap();
        pipe
    }

    fn names(pipe: &Pipeline) -> Vec<&str> {
        pipe.operators.iter().map(Operator::name).collect()
    }

    #[test]
    fn instantiation_resolves_lets() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "let $x = 1 | let $y = $x + 1 | where a == $y");
        assert!(pipe.lets.is_empty());
        let Operator::Where(filter) = &pipe.operators[0] else {
            panic!("expected `where`");
        };
        assert_eq!(filter.expr().to_string(), "a == 2");
    }

    #[test]
    fn substitution_is_idempotent() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let mut pipe = instantiate(&reg, &dh, "let $n = 2 | head $n | where a > $n");
        let before = format!("{:?}", pipe);
        pipe.substitute(&SubstituteCtx::new(BaseCtx::new(&dh, &reg), None), true)
            .unwrap();
        assert_eq!(format!("{:?}", pipe), before);
        assert!(dh.diagnostics().is_empty());
    }

    #[test]
    fn partial_substitution_keeps_lets() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let base = BaseCtx::new(&dh, &reg);
        let mut pipe = {
            let root = Root::new(base);
            compile(parse("let $n = 2 | head $n | sort a, reverse=true").unwrap(), &root.ctx()).unwrap()
        };
        let ctx = SubstituteCtx::new(base, None);
        pipe.substitute(&ctx, false).unwrap();
        let once = format!("{:?}", pipe);
        pipe.substitute(&ctx, false).unwrap();
        assert_eq!(format!("{:?}", pipe), once);
        assert_eq!(pipe.lets.len(), 1);
    }

    #[test]
    fn filters_move_through_sort() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "from [{x: 1}, {x: 2}] | sort x | where x > 1");
        let optimized = pipe.optimize(Vec::new(), EventOrder::Ordered);
        assert!(optimized.filter.is_empty());
        assert_eq!(names(&optimized.pipeline), vec!["from", "where", "sort"]);
        let Operator::Where(filter) = &optimized.pipeline.operators[1] else {
            panic!("expected `where`");
        };
        assert_eq!(filter.expr().to_string(), "x > 1");
    }

    #[test]
    fn residual_stays_behind_legacy_operator() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "from [{x: 1}] | sort x | where x > 1 and abs(x) == 1");
        let optimized = pipe.optimize(Vec::new(), EventOrder::Ordered);
        assert_eq!(names(&optimized.pipeline), vec!["from", "where", "sort", "where"]);
    }

    #[test]
    fn optimize_is_idempotent() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "from [{x: 1}] | head 5 | sort x | where x > 1 | tail 1");
        let once = pipe.optimize(Vec::new(), EventOrder::Ordered).pipeline;
        let twice = once.clone().optimize(Vec::new(), EventOrder::Ordered).pipeline;
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn infer_type_threads_through_operators() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "from [{x: 1}] | select x | discard");
        assert_eq!(pipe.infer_type(ElementType::Void, &dh), Ok(Some(ElementType::Void)));
        assert!(pipe.infer_type(ElementType::Events, &dh).is_err());
        assert_eq!(dh.messages(), vec!["operator does not accept `events`"]);
    }

    #[test]
    fn finalize_lowers_every_operator() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let pipe = instantiate(&reg, &dh, "from [{x: 1}] | where x == 1 | head 1");
        let plan = pipe
            .finalize(&FinalizeCtx::new(BaseCtx::new(&dh, &reg), ElementType::Void))
            .unwrap();
        let names: Vec<_> = plan.iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["from", "where", "head"]);
    }
}
