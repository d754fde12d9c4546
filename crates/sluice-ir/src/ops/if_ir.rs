//! Conditional execution: `if cond { ... } else { ... }`.

use sluice_parser::{Expr, Record, Span};
use sluice_types::{matches, Diagnostic, DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{FinalizeCtx, SubstituteCtx};
use crate::expr::ExprExt;
use crate::operator::{default_optimize, EventOrder, Operator, OptimizeFilter, OptimizeResult};
use crate::pipeline::Pipeline;
use crate::plan::{finish_plan, push_batch, ExecCtx, ExecOperator, Plan};

#[derive(Debug, Clone)]
pub struct IfIr {
    if_kw: Span,
    condition: Expr,
    then: Pipeline,
    else_: Option<(Span, Pipeline)>,
}

impl IfIr {
    pub fn new(if_kw: Span, condition: Expr, then: Pipeline, else_: Option<(Span, Pipeline)>) -> Self {
        Self {
            if_kw,
            condition,
            then,
            else_,
        }
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn then(&self) -> &Pipeline {
        &self.then
    }

    pub fn else_(&self) -> Option<&Pipeline> {
        self.else_.as_ref().map(|(_, pipe)| pipe)
    }

    pub fn main_location(&self) -> Span {
        self.if_kw
    }

    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        self.condition.substitute(ctx);
        self.then.substitute(ctx, instantiate)?;
        if let Some((_, pipe)) = &mut self.else_ {
            pipe.substitute(ctx, instantiate)?;
        }
        Ok(())
    }

    /// A missing `else` passes its input through.
    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        let then = self.then.infer_type(input, dh)?;
        let else_ = match &self.else_ {
            Some((_, pipe)) => pipe.infer_type(input, dh)?,
            None => Some(input),
        };
        match (then, else_) {
            (None, other) | (other, None) => Ok(other),
            (Some(then), Some(else_)) if then == else_ => Ok(Some(then)),
            (Some(then), Some(else_)) => Err(Diagnostic::error(format!(
                "incompatible branch output types: `{}` and `{}`",
                then, else_
            ))
            .primary(self.if_kw)
            .emit(dh)),
        }
    }

    pub fn optimize(self, filter: OptimizeFilter, _order: EventOrder) -> OptimizeResult {
        default_optimize(Operator::If(self), filter)
    }

    pub fn finalize(self, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        let then = self.then.finalize(ctx)?;
        let else_ = match self.else_ {
            Some((_, pipe)) => pipe.finalize(ctx)?,
            None => Plan::new(),
        };
        Ok(vec![Box::new(IfExec {
            condition: self.condition,
            then,
            else_,
        })])
    }
}

/// Routes every row into one of two sub-plans.
#[derive(Debug)]
pub struct IfExec {
    condition: Expr,
    then: Plan,
    else_: Plan,
}

impl ExecOperator for IfExec {
    fn name(&self) -> &str {
        "if"
    }

    fn process(&mut self, batch: Vec<Record>, ctx: &ExecCtx<'_>) -> Vec<Record> {
        let mut then = Vec::new();
        let mut else_ = Vec::new();
        let mut warned = false;
        for row in batch {
            match matches(&self.condition, &row, ctx.functions()) {
                Ok(true) => then.push(row),
                Ok(false) => else_.push(row),
                Err(err) => {
                    if !warned {
                        ctx.dh().emit(Diagnostic::warning(err.to_string()).primary(err.span()));
                        warned = true;
                    }
                    else_.push(row);
                }
            }
        }
        let mut out = push_batch(&mut self.then, then, ctx);
        out.extend(push_batch(&mut self.else_, else_, ctx));
        out
    }

    fn finish(&mut self, ctx: &ExecCtx<'_>) -> Vec<Record> {
        let mut out = finish_plan(&mut self.then, ctx);
        out.extend(finish_plan(&mut self.else_, ctx));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::ctx::{BaseCtx, Root};
    use crate::registry::Registry;
    use sluice_parser::{parse, Value};
    use sluice_types::{Collector, FunctionTable};

    fn branch(reg: &Registry, dh: &Collector, source: &str) -> IfIr {
        let mut pipe = {
            let root = Root::new(BaseCtx::new(dh, reg));
            compile(parse(source).unwrap(), &root.ctx()).unwrap()
        };
        match pipe.operators.remove(0) {
            Operator::If(ir) => ir,
            other => panic!("expected `if`, got {:?}", other),
        }
    }

    #[test]
    fn missing_else_passes_input_through() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let ir = branch(&reg, &dh, "if a > 1 { head 1 }");
        assert_eq!(ir.infer_type(ElementType::Events, &dh), Ok(Some(ElementType::Events)));
        assert!(ir.else_().is_none());
    }

    #[test]
    fn rows_are_routed_by_condition() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let mut ir = branch(&reg, &dh, "if a > 1 { head 1 } else { tail 1 }");
        ir.substitute(&SubstituteCtx::new(BaseCtx::new(&dh, &reg), None), true)
            .unwrap();
        let mut plan = ir
            .finalize(&FinalizeCtx::new(BaseCtx::new(&dh, &reg), ElementType::Events))
            .unwrap();
        let functions = FunctionTable::builtin();
        let ctx = ExecCtx::new(&functions, &dh);
        let rows: Vec<_> = [1, 2, 3, 0]
            .into_iter()
            .map(|a| Record::from_fields(vec![("a".to_string(), Value::Int(a))]))
            .collect();
        let mut out = push_batch(&mut plan, rows, &ctx);
        out.extend(finish_plan(&mut plan, &ctx));
        let values: Vec<_> = out.iter().filter_map(|r| r.get("a").cloned()).collect();
        assert_eq!(values, vec![Value::Int(2), Value::Int(0)]);
    }
}
