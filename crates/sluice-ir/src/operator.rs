//! The operator IR.
//!
//! Built-in lowering strategies are variants of the closed [`Operator`] enum.
//! Operators that bring their own IR plug in through [`NativeOperator`].

use std::fmt;

use sluice_parser::{Expr, Invocation, Span};
use sluice_types::{Diagnostic, DiagnosticHandler, ElementType, FailureOr};

use crate::ctx::{CompileCtx, FinalizeCtx, SubstituteCtx};
use crate::ops::{GenericIr, IfIr, LegacyIr, WhereIr};
use crate::plan::Plan;

/// Whether downstream cares about the order of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    Ordered,
    Unordered,
}

/// Conjoined predicates travelling upstream during optimization.
pub type OptimizeFilter = Vec<Expr>;

/// What an operator hands back when asked to optimize.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    /// Predicates for the preceding operator.
    pub filter: OptimizeFilter,
    /// The order the operator needs from its input.
    pub order: EventOrder,
    /// Nodes that take the place of the optimized one.
    pub replacement: Vec<Operator>,
}

/// Compiles an invocation of a native operator into IR.
pub trait OperatorCompiler {
    fn compile(&self, inv: Invocation, ctx: &CompileCtx<'_>) -> FailureOr<Operator>;
}

/// An operator with its own IR node.
pub trait NativeOperator: fmt::Debug {
    fn name(&self) -> &str;

    fn main_location(&self) -> Span;

    fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()>;

    fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>>;

    /// Operators that do not let predicates pass implement this with
    /// [`default_optimize`].
    fn optimize(self: Box<Self>, filter: OptimizeFilter, order: EventOrder) -> OptimizeResult;

    fn finalize(self: Box<Self>, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan>;

    fn clone_box(&self) -> Box<dyn NativeOperator>;
}

impl Clone for Box<dyn NativeOperator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A node of an IR pipeline.
#[derive(Debug, Clone)]
pub enum Operator {
    If(IfIr),
    Where(WhereIr),
    Legacy(LegacyIr),
    Generic(GenericIr),
    Native(Box<dyn NativeOperator>),
}

impl Operator {
    pub fn name(&self) -> &str {
        match self {
            Operator::If(_) => "if",
            Operator::Where(_) => "where",
            Operator::Legacy(op) => op.name(),
            Operator::Generic(op) => op.name(),
            Operator::Native(op) => op.name(),
        }
    }

    pub fn main_location(&self) -> Span {
        match self {
            Operator::If(op) => op.main_location(),
            Operator::Where(op) => op.main_location(),
            Operator::Legacy(op) => op.main_location(),
            Operator::Generic(op) => op.main_location(),
            Operator::Native(op) => op.main_location(),
        }
    }

    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        match self {
            Operator::If(op) => op.substitute(ctx, instantiate),
            Operator::Where(op) => op.substitute(ctx, instantiate),
            Operator::Legacy(op) => op.substitute(ctx, instantiate),
            Operator::Generic(op) => op.substitute(ctx, instantiate),
            Operator::Native(op) => op.substitute(ctx, instantiate),
        }
    }

    /// The output type for `input`, or `None` if the operator has no opinion.
    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        match self {
            Operator::If(op) => op.infer_type(input, dh),
            Operator::Where(op) => op.infer_type(input, dh),
            Operator::Legacy(op) => op.infer_type(input, dh),
            Operator::Generic(op) => op.infer_type(input, dh),
            Operator::Native(op) => op.infer_type(input, dh),
        }
    }

    pub fn optimize(self, filter: OptimizeFilter, order: EventOrder) -> OptimizeResult {
        match self {
            Operator::If(op) => op.optimize(filter, order),
            Operator::Where(op) => op.optimize(filter, order),
            Operator::Legacy(op) => op.optimize(filter, order),
            Operator::Generic(op) => op.optimize(filter, order),
            Operator::Native(op) => op.optimize(filter, order),
        }
    }

    pub fn finalize(self, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        match self {
            Operator::If(op) => op.finalize(ctx),
            Operator::Where(op) => op.finalize(ctx),
            Operator::Legacy(op) => op.finalize(ctx),
            Operator::Generic(op) => op.finalize(ctx),
            Operator::Native(op) => op.finalize(ctx),
        }
    }
}

/// Keep `op` in place and materialize every incoming predicate right after
/// it. Nothing moves further upstream.
pub fn default_optimize(op: Operator, filter: OptimizeFilter) -> OptimizeResult {
    let mut replacement = Vec::with_capacity(filter.len() + 1);
    replacement.push(op);
    replacement.extend(filter.into_iter().map(|expr| Operator::Where(WhereIr::new(expr))));
    OptimizeResult {
        filter: Vec::new(),
        order: EventOrder::Ordered,
        replacement,
    }
}

/// The diagnostic for an operator that cannot take `input`.
pub fn input_error(input: ElementType, location: Span) -> Diagnostic {
    let message = match input {
        ElementType::Void => "operator cannot be used as a source".to_string(),
        other => format!("operator does not accept `{}`", other),
    };
    Diagnostic::error(message).primary(location)
}

/// Accept only events, reporting anything else.
pub fn expect_events(input: ElementType, location: Span, dh: &dyn DiagnosticHandler) -> FailureOr<()> {
    match input {
        ElementType::Events => Ok(()),
        other => Err(input_error(other, location).emit(dh)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_parser::parse_expr;
    use sluice_types::Collector;

    #[test]
    fn default_optimize_materializes_filters() {
        let op = Operator::Where(WhereIr::new(parse_expr("a > 1").unwrap()));
        let filter = vec![parse_expr("b == 2").unwrap(), parse_expr("c").unwrap()];
        let result = default_optimize(op, filter);
        assert!(result.filter.is_empty());
        assert_eq!(result.order, EventOrder::Ordered);
        let names: Vec<_> = result.replacement.iter().map(Operator::name).collect();
        assert_eq!(names, vec!["where", "where", "where"]);
        match &result.replacement[1] {
            Operator::Where(op) => assert_eq!(op.expr().to_string(), "b == 2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn input_errors_name_the_type() {
        let dh = Collector::new();
        assert!(expect_events(ElementType::Events, Span::unknown(), &dh).is_ok());
        assert!(expect_events(ElementType::Void, Span::unknown(), &dh).is_err());
        assert!(expect_events(ElementType::Bytes, Span::unknown(), &dh).is_err());
        assert_eq!(
            dh.messages(),
            vec![
                "operator cannot be used as a source".to_string(),
                "operator does not accept `bytes`".to_string(),
            ]
        );
    }
}
