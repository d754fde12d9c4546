//! The compatibility layer for operators that predate the IR.
//!
//! Legacy operators understand a narrower predicate language: a conjunction
//! of `field <cmp> constant` terms. [`split_legacy_expression`] carves that
//! part out of an expression so it can be handed to a legacy operator's own
//! pushdown logic, and [`Predicate::to_expr`] turns it back into an
//! expression when it travels further upstream.

use std::fmt;

use sluice_parser::{BinOp, Expr, FieldPath, Invocation, Record, Span, Value};
use sluice_types::{compare, ElementType, FailureOr};

use crate::ctx::SubstituteCtx;
use crate::operator::EventOrder;
use crate::plan::{ExecCtx, ExecOperator};

/// `field <op> value`
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: FieldPath,
    pub op: BinOp,
    pub value: Value,
    value_span: Span,
    span: Span,
}

impl Comparison {
    pub fn path(&self) -> Vec<&str> {
        self.field.names()
    }

    fn matches(&self, row: &Record) -> bool {
        let field = row.get_path(&self.path()).unwrap_or(&Value::Null);
        compare(self.op, field, &self.value) == Some(Value::Bool(true))
    }

    /// Rebuilds the conjunct in `field <op> value` order, keeping its spans.
    fn to_expr(&self) -> Expr {
        Expr::Binary(
            Box::new(Expr::Field(self.field.clone())),
            self.op,
            Box::new(Expr::constant(self.value.clone(), self.value_span)),
            self.span,
        )
    }
}

/// A conjunction of comparisons. The empty predicate is `true`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    terms: Vec<Comparison>,
}

impl Predicate {
    pub fn new(terms: Vec<Comparison>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[Comparison] {
        &self.terms
    }

    pub fn is_trivially_true(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn conjoin(&mut self, other: Predicate) {
        self.terms.extend(other.terms);
    }

    pub fn matches(&self, row: &Record) -> bool {
        self.terms.iter().all(|term| term.matches(row))
    }

    pub fn to_expr(&self) -> Expr {
        Expr::conjunction(self.terms.iter().map(Comparison::to_expr))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

/// Split `expr` into the part a legacy operator understands and the rest.
/// The rest is `None` when nothing remains.
pub fn split_legacy_expression(expr: Expr) -> (Predicate, Option<Expr>) {
    let mut terms = Vec::new();
    let mut rest = Vec::new();
    for conjunct in expr.into_conjuncts() {
        if conjunct.as_constant() == Some(&Value::Bool(true)) {
            continue;
        }
        match as_comparison(&conjunct) {
            Some(term) => terms.push(term),
            None => rest.push(conjunct),
        }
    }
    let rest = if rest.is_empty() {
        None
    } else {
        Some(Expr::conjunction(rest))
    };
    (Predicate::new(terms), rest)
}

fn as_comparison(expr: &Expr) -> Option<Comparison> {
    let Expr::Binary(left, op, right, _) = expr else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    let (field, op, value, value_span) = match (left.as_ref(), right.as_ref()) {
        (Expr::Field(field), Expr::Constant(value, value_span)) => (field, *op, value, *value_span),
        (Expr::Constant(value, value_span), Expr::Field(field)) => (field, op.flipped()?, value, *value_span),
        _ => return None,
    };
    Some(Comparison {
        field: field.clone(),
        op,
        value: value.clone(),
        value_span,
        span: expr.span(),
    })
}

/// Result of a legacy operator's own pushdown.
#[derive(Debug)]
pub struct LegacyOptimizeResult {
    pub filter: Predicate,
    pub order: EventOrder,
    pub replacement: Vec<Box<dyn LegacyOperator>>,
}

/// An operator implemented against the pre-IR interface.
pub trait LegacyOperator: fmt::Debug {
    fn name(&self) -> &str;

    /// `None` if the operator cannot take `input`.
    fn infer_type(&self, input: ElementType) -> Option<ElementType>;

    /// Operators that do not let predicates pass implement this with
    /// [`do_not_optimize`].
    fn optimize(self: Box<Self>, filter: Predicate, order: EventOrder) -> LegacyOptimizeResult;

    fn process(&mut self, batch: Vec<Record>) -> Vec<Record>;

    fn finish(&mut self) -> Vec<Record> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn LegacyOperator>;
}

impl Clone for Box<dyn LegacyOperator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Keep `op` and apply `filter` right after it.
pub fn do_not_optimize(op: Box<dyn LegacyOperator>, filter: Predicate) -> LegacyOptimizeResult {
    let mut replacement = vec![op];
    if !filter.is_trivially_true() {
        replacement.push(Box::new(LegacyFilter::new(filter)));
    }
    LegacyOptimizeResult {
        filter: Predicate::default(),
        order: EventOrder::Ordered,
        replacement,
    }
}

/// Builds a legacy operator once all of its arguments are constant.
pub trait OperatorFactory: fmt::Debug {
    fn make(&self, inv: &Invocation, ctx: &SubstituteCtx<'_>) -> FailureOr<Box<dyn LegacyOperator>>;
}

/// Filters rows by a legacy predicate.
#[derive(Debug, Clone)]
pub struct LegacyFilter {
    predicate: Predicate,
}

impl LegacyFilter {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

impl LegacyOperator for LegacyFilter {
    fn name(&self) -> &str {
        "where"
    }

    fn infer_type(&self, input: ElementType) -> Option<ElementType> {
        (input == ElementType::Events).then_some(ElementType::Events)
    }

    fn optimize(self: Box<Self>, filter: Predicate, order: EventOrder) -> LegacyOptimizeResult {
        let mut predicate = self.predicate;
        predicate.conjoin(filter);
        LegacyOptimizeResult {
            filter: predicate,
            order,
            replacement: Vec::new(),
        }
    }

    fn process(&mut self, batch: Vec<Record>) -> Vec<Record> {
        batch.into_iter().filter(|row| self.predicate.matches(row)).collect()
    }

    fn clone_box(&self) -> Box<dyn LegacyOperator> {
        Box::new(self.clone())
    }
}

/// Runs a legacy operator inside an executable plan.
#[derive(Debug)]
pub struct LegacyExec(pub Box<dyn LegacyOperator>);

impl ExecOperator for LegacyExec {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn process(&mut self, batch: Vec<Record>, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        self.0.process(batch)
    }

    fn finish(&mut self, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        self.0.finish()
    }
}
