//! `discard`: consumes every event and produces nothing.

use sluice_parser::{Argument, Invocation, Record};
use sluice_types::{Diagnostic, ElementType, FailureOr};

use crate::ctx::SubstituteCtx;
use crate::legacy::{do_not_optimize, LegacyOperator, LegacyOptimizeResult, OperatorFactory, Predicate};
use crate::operator::EventOrder;

#[derive(Debug, Clone)]
pub struct Discard;

impl LegacyOperator for Discard {
    fn name(&self) -> &str {
        "discard"
    }

    fn infer_type(&self, input: ElementType) -> Option<ElementType> {
        (input == ElementType::Events).then_some(ElementType::Void)
    }

    fn optimize(self: Box<Self>, filter: Predicate, _order: EventOrder) -> LegacyOptimizeResult {
        do_not_optimize(self, filter)
    }

    fn process(&mut self, _batch: Vec<Record>) -> Vec<Record> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn LegacyOperator> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
pub struct DiscardFactory;

impl OperatorFactory for DiscardFactory {
    fn make(&self, inv: &Invocation, ctx: &SubstituteCtx<'_>) -> FailureOr<Box<dyn LegacyOperator>> {
        if let Some(arg) = inv.args.first() {
            let message = match arg {
                Argument::Positional(_) => "too many positional arguments".to_string(),
                Argument::Named(name, _) => format!("named argument `{}` does not exist", name.name),
            };
            return Err(Diagnostic::error(message)
                .primary(arg.span())
                .usage("discard")
                .emit(ctx.dh()));
        }
        Ok(Box::new(Discard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::BaseCtx;
    use crate::registry::Registry;
    use sluice_parser::{parse, Statement};
    use sluice_types::Collector;

    fn make(source: &str) -> (FailureOr<Box<dyn LegacyOperator>>, Collector) {
        let dh = Collector::new();
        let reg = Registry::new();
        let inv = match parse(source).unwrap().body.remove(0) {
            Statement::Invocation(inv) => inv,
            other => panic!("unexpected {:?}", other),
        };
        let result = DiscardFactory.make(&inv, &SubstituteCtx::new(BaseCtx::new(&dh, &reg), None));
        (result, dh)
    }

    #[test]
    fn takes_no_arguments() {
        let (op, _) = make("discard");
        assert_eq!(op.unwrap().infer_type(ElementType::Events), Some(ElementType::Void));
        let (op, dh) = make("discard 1");
        assert!(op.is_err());
        assert_eq!(dh.messages(), vec!["too many positional arguments".to_string()]);
        let (_, dh) = make("discard x=1");
        assert_eq!(dh.messages(), vec!["named argument `x` does not exist".to_string()]);
    }

    #[test]
    fn blocks_filters() {
        let (filter, _) = crate::legacy::split_legacy_expression(sluice_parser::parse_expr("a == 1").unwrap());
        let result = Box::new(Discard).optimize(filter, EventOrder::Unordered);
        assert!(result.filter.is_trivially_true());
        assert_eq!(result.order, EventOrder::Ordered);
        assert_eq!(result.replacement.len(), 2);
    }
}
