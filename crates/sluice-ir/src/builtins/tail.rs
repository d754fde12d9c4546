//! `tail [count]`: the last `count` events, 10 by default.

use std::collections::VecDeque;

use sluice_parser::{Record, Value};
use sluice_types::ElementType;

use crate::ops::{ArgKind, ArgValue, Args, Description};
use crate::plan::{ExecCtx, ExecOperator};

const DEFAULT_COUNT: u64 = 10;

pub fn description() -> Description {
    Description::new("tail")
        .optional("count", ArgKind::UInt)
        .spawn(ElementType::Events, ElementType::Events, spawn)
}

fn spawn(args: &Args) -> Box<dyn ExecOperator> {
    let count = match args.positional(0).and_then(ArgValue::as_value) {
        Some(Value::UInt(n)) => *n,
        _ => DEFAULT_COUNT,
    };
    Box::new(TailExec {
        count: usize::try_from(count).unwrap_or(usize::MAX),
        rows: VecDeque::new(),
    })
}

#[derive(Debug)]
pub struct TailExec {
    count: usize,
    rows: VecDeque<Record>,
}

impl ExecOperator for TailExec {
    fn name(&self) -> &str {
        "tail"
    }

    fn process(&mut self, batch: Vec<Record>, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        for row in batch {
            if self.rows.len() == self.count {
                self.rows.pop_front();
            }
            if self.count > 0 {
                self.rows.push_back(row);
            }
        }
        Vec::new()
    }

    fn finish(&mut self, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        self.rows.drain(..).collect()
    }
}
