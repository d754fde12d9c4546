//! IR node wrapping a legacy operator.
//!
//! The node starts out holding the invocation. As soon as every argument is
//! constant the factory builds the operator, which may later be replaced by
//! a chain of legacy operators through the operator's own pushdown.

use std::sync::Arc;

use sluice_parser::{Invocation, Span};
use sluice_types::{DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{FinalizeCtx, SubstituteCtx};
use crate::expr::{ExprExt, SubstituteResult};
use crate::legacy::{split_legacy_expression, LegacyExec, LegacyOperator, OperatorFactory, Predicate};
use crate::operator::{default_optimize, input_error, EventOrder, Operator, OptimizeFilter, OptimizeResult};
use crate::ops::WhereIr;
use crate::plan::{ExecOperator, Plan};

#[derive(Debug, Clone)]
enum State {
    Partial(Arc<dyn OperatorFactory>, Invocation),
    Ready(Vec<Box<dyn LegacyOperator>>),
}

#[derive(Debug, Clone)]
pub struct LegacyIr {
    name: String,
    main_location: Span,
    state: State,
}

impl LegacyIr {
    pub fn new(factory: Arc<dyn OperatorFactory>, inv: Invocation) -> Self {
        Self {
            name: inv.op.name.clone(),
            main_location: inv.op.span,
            state: State::Partial(factory, inv),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn main_location(&self) -> Span {
        self.main_location
    }

    /// Whether the legacy operator has been constructed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        let State::Partial(factory, inv) = &mut self.state else {
            return Ok(());
        };
        let mut remaining = false;
        for arg in &mut inv.args {
            if arg.expr_mut().substitute(ctx) == SubstituteResult::SomeRemaining {
                remaining = true;
            }
        }
        if remaining {
            assert!(!instantiate, "`{}` has unresolved arguments after instantiation", self.name);
            return Ok(());
        }
        let op = factory.make(inv, ctx)?;
        tracing::debug!(operator = %self.name, "constructed legacy operator");
        self.state = State::Ready(vec![op]);
        Ok(())
    }

    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        let State::Ready(chain) = &self.state else {
            return Ok(None);
        };
        let mut current = input;
        for op in chain {
            match op.infer_type(current) {
                Some(output) => current = output,
                None => return Err(input_error(current, self.main_location).emit(dh)),
            }
        }
        Ok(Some(current))
    }

    /// Hand the legacy-representable part of every predicate to the wrapped
    /// operator. Residuals stay right after the node.
    pub fn optimize(self, filter: OptimizeFilter, order: EventOrder) -> OptimizeResult {
        let LegacyIr {
            name,
            main_location,
            state,
        } = self;
        let chain = match state {
            State::Ready(chain) => chain,
            partial @ State::Partial(..) => {
                let op = LegacyIr {
                    name,
                    main_location,
                    state: partial,
                };
                return default_optimize(Operator::Legacy(op), filter);
            }
        };
        let mut legacy = Predicate::default();
        let mut rest = Vec::new();
        for expr in filter {
            let (predicate, residual) = split_legacy_expression(expr);
            legacy.conjoin(predicate);
            rest.extend(residual);
        }
        let mut predicate = legacy;
        let mut order = order;
        let mut replacement: Vec<Box<dyn LegacyOperator>> = Vec::new();
        for op in chain.into_iter().rev() {
            let result = op.optimize(predicate, order);
            predicate = result.filter;
            order = result.order;
            replacement.splice(0..0, result.replacement);
        }
        tracing::trace!(operator = %name, upstream = %predicate, residuals = rest.len(), "legacy pushdown");
        let mut operators = Vec::with_capacity(rest.len() + 1);
        if !replacement.is_empty() {
            operators.push(Operator::Legacy(LegacyIr {
                name,
                main_location,
                state: State::Ready(replacement),
            }));
        }
        operators.extend(rest.into_iter().map(|expr| Operator::Where(WhereIr::new(expr))));
        let filter = if predicate.is_trivially_true() {
            Vec::new()
        } else {
            vec![predicate.to_expr()]
        };
        OptimizeResult {
            filter,
            order,
            replacement: operators,
        }
    }

    pub fn finalize(self, _ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        match self.state {
            State::Ready(chain) => Ok(chain
                .into_iter()
                .map(|op| Box::new(LegacyExec(op)) as Box<dyn ExecOperator>)
                .collect()),
            State::Partial(..) => unreachable!("`{}` finalized before instantiation", self.name),
        }
    }
}
