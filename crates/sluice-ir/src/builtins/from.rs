//! `from <records>`: a source that emits a constant list of events.

use sluice_parser::{Record, Value};
use sluice_types::ElementType;

use crate::ops::{ArgKind, ArgValue, Args, Description};
use crate::plan::{ExecCtx, ExecOperator};

pub fn description() -> Description {
    Description::new("from")
        .positional("records", ArgKind::Records)
        .spawn(ElementType::Void, ElementType::Events, spawn)
}

fn spawn(args: &Args) -> Box<dyn ExecOperator> {
    let records = match args.positional(0).and_then(ArgValue::as_value) {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Record(record) => Some(record.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Box::new(FromExec { records })
}

#[derive(Debug)]
pub struct FromExec {
    records: Vec<Record>,
}

impl ExecOperator for FromExec {
    fn name(&self) -> &str {
        "from"
    }

    fn process(&mut self, _batch: Vec<Record>, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        Vec::new()
    }

    fn finish(&mut self, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }
}
