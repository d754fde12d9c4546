//! `sort field, [reverse=bool]`, implemented as a legacy operator.
//!
//! Sorting does not change which rows exist, so filters pass through it.
//! The sort is stable: rows with equal keys keep their input order, so the
//! order asked of the sort is asked of its input as well.

use std::cmp::Ordering;

use sluice_parser::{Argument, Expr, Invocation, Record, Span, Value};
use sluice_types::{Diagnostic, ElementType, FailureOr};

use crate::ctx::SubstituteCtx;
use crate::expr::const_eval;
use crate::legacy::{LegacyOperator, LegacyOptimizeResult, OperatorFactory, Predicate};
use crate::operator::EventOrder;

const USAGE: &str = "sort field:field, [reverse=bool]";

#[derive(Debug, Clone)]
pub struct Sort {
    path: Vec<String>,
    reverse: bool,
    buffer: Vec<Record>,
}

impl Sort {
    fn key<'r>(&self, row: &'r Record) -> &'r Value {
        row.get_path(&self.path).unwrap_or(&Value::Null)
    }
}

impl LegacyOperator for Sort {
    fn name(&self) -> &str {
        "sort"
    }

    fn infer_type(&self, input: ElementType) -> Option<ElementType> {
        (input == ElementType::Events).then_some(ElementType::Events)
    }

    fn optimize(self: Box<Self>, filter: Predicate, order: EventOrder) -> LegacyOptimizeResult {
        LegacyOptimizeResult {
            filter,
            order,
            replacement: vec![self],
        }
    }

    fn process(&mut self, batch: Vec<Record>) -> Vec<Record> {
        self.buffer.extend(batch);
        Vec::new()
    }

    fn finish(&mut self) -> Vec<Record> {
        let mut rows = std::mem::take(&mut self.buffer);
        rows.sort_by(|a, b| {
            let (a, b) = (self.key(a), self.key(b));
            match (a.is_null(), b.is_null()) {
                (false, false) if self.reverse => b.sort_cmp(a),
                (true, true) => Ordering::Equal,
                _ => a.sort_cmp(b),
            }
        });
        rows
    }

    fn clone_box(&self) -> Box<dyn LegacyOperator> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct SortFactory;

impl OperatorFactory for SortFactory {
    fn make(&self, inv: &Invocation, ctx: &SubstituteCtx<'_>) -> FailureOr<Box<dyn LegacyOperator>> {
        let error = |message: String, span: Span| Diagnostic::error(message).primary(span).usage(USAGE).emit(ctx.dh());
        let mut path = None;
        let mut reverse = false;
        for arg in &inv.args {
            match arg {
                Argument::Positional(_) if path.is_some() => {
                    return Err(error("too many positional arguments".to_string(), arg.span()));
                }
                Argument::Positional(Expr::Field(field)) => {
                    path = Some(field.names().into_iter().map(str::to_string).collect());
                }
                Argument::Positional(other) => {
                    return Err(error(format!("expected field but got `{}`", other), other.span()));
                }
                Argument::Named(name, expr) if name.name == "reverse" => match const_eval(expr, ctx.base())? {
                    Value::Bool(value) => reverse = value,
                    other => {
                        return Err(error(
                            format!("expected bool but got {}", other.type_name()),
                            expr.span(),
                        ));
                    }
                },
                Argument::Named(name, _) => {
                    return Err(error(format!("named argument `{}` does not exist", name.name), name.span));
                }
            }
        }
        let Some(path) = path else {
            return Err(error("expected exactly 1 positional argument(s)".to_string(), inv.op.span));
        };
        Ok(Box::new(Sort {
            path,
            reverse,
            buffer: Vec::new(),
        }))
    }
}
