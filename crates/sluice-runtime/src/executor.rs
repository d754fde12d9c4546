//! Batch executor for finalized plans.

use std::path::Path;
use std::time::Instant;

use sluice_ir::{finish_plan, push_batch, ExecCtx, Plan};
use sluice_parser::{parse_expr, Record, Value};
use sluice_types::{eval, DiagnosticHandler, FunctionTable};

pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Runs plans over in-memory records.
pub struct Executor<'a> {
    functions: &'a FunctionTable,
    dh: &'a dyn DiagnosticHandler,
    batch_size: usize,
}

/// Execution error.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("pipeline reported errors while running")]
    Failed,
}

/// Execution statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionStats {
    pub rows_read: usize,
    pub rows_written: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// The result of running a plan to completion.
#[derive(Debug, Clone)]
pub struct Output {
    pub records: Vec<Record>,
    pub stats: ExecutionStats,
}

impl<'a> Executor<'a> {
    pub fn new(functions: &'a FunctionTable, dh: &'a dyn DiagnosticHandler) -> Self {
        Self {
            functions,
            dh,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ExecutorError> {
        if batch_size == 0 {
            return Err(ExecutorError::InvalidBatchSize);
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Push `input` through `plan` in batches, then flush it.
    #[tracing::instrument(level = "debug", skip_all, fields(operators = plan.len(), rows = input.len()))]
    pub fn run(&self, mut plan: Plan, input: Vec<Record>) -> Result<Output, ExecutorError> {
        let start = Instant::now();
        let ctx = ExecCtx::new(self.functions, self.dh);
        let mut stats = ExecutionStats {
            rows_read: input.len(),
            ..Default::default()
        };
        let mut records = Vec::new();
        let mut input = input.into_iter().peekable();
        while input.peek().is_some() {
            let batch: Vec<_> = input.by_ref().take(self.batch_size).collect();
            stats.batches += 1;
            records.extend(push_batch(&mut plan, batch, &ctx));
        }
        records.extend(finish_plan(&mut plan, &ctx));
        stats.rows_written = records.len();
        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(?stats, "plan finished");
        if self.dh.has_failure() {
            return Err(ExecutorError::Failed);
        }
        Ok(Output { records, stats })
    }
}

/// Read input records written as a sluice literal: a record or a list of
/// records.
pub fn load_records(source: &str, functions: &FunctionTable) -> Result<Vec<Record>, ExecutorError> {
    let expr = parse_expr(source).map_err(|errors| {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ExecutorError::InvalidInput(message)
    })?;
    match eval(&expr, None, functions).map_err(|err| ExecutorError::InvalidInput(err.to_string()))? {
        Value::Record(record) => Ok(vec![record]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Record(record) => Ok(record),
                other => Err(ExecutorError::InvalidInput(format!(
                    "expected a record, found {}",
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(ExecutorError::InvalidInput(format!(
            "expected a record or a list of records, found {}",
            other.type_name()
        ))),
    }
}

/// [`load_records`] from a file.
pub fn load_records_file(path: &Path, functions: &FunctionTable) -> Result<Vec<Record>, ExecutorError> {
    let source = std::fs::read_to_string(path)?;
    load_records(&source, functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{run_stages, ExecConfig, Staged};
    use sluice_ir::Registry;
    use sluice_types::{Collector, ElementType};

    fn plan(source: &str, input: ElementType, reg: &Registry, dh: &Collector) -> Plan {
        match run_stages(source, input, reg, dh, &ExecConfig::default()) {
            Ok(Staged::Plan { plan, .. }) => plan,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn loads_literal_records() {
        let functions = FunctionTable::builtin();
        let rows = load_records("[{a: 1}, {a: 2, b: \"x\"}]", &functions).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("b"), Some(&Value::String("x".into())));
        assert_eq!(load_records("{a: 1}", &functions).unwrap().len(), 1);
        assert!(matches!(load_records("[1]", &functions), Err(ExecutorError::InvalidInput(_))));
        assert!(matches!(load_records("[", &functions), Err(ExecutorError::InvalidInput(_))));
    }

    #[test]
    fn runs_in_batches() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let input = load_records("[{a: 1}, {a: 2}, {a: 3}, {a: 4}, {a: 5}]", reg.functions()).unwrap();
        let plan = plan("where a > 1 | head 3", ElementType::Events, &reg, &dh);
        let output = Executor::new(reg.functions(), &dh)
            .with_batch_size(2)
            .unwrap()
            .run(plan, input)
            .unwrap();
        let values: Vec<_> = output.records.iter().filter_map(|r| r.get("a").cloned()).collect();
        assert_eq!(values, vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
        assert_eq!(output.stats.rows_read, 5);
        assert_eq!(output.stats.rows_written, 3);
        assert_eq!(output.stats.batches, 3);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let (functions, dh) = (FunctionTable::builtin(), Collector::new());
        assert!(matches!(
            Executor::new(&functions, &dh).with_batch_size(0),
            Err(ExecutorError::InvalidBatchSize)
        ));
    }

    #[test]
    fn pushed_filters_warn_at_their_source() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let input = load_records("[{a: \"x\"}, {a: 2}]", reg.functions()).unwrap();
        let plan = plan("sort a | where a > 1", ElementType::Events, &reg, &dh);
        let output = Executor::new(reg.functions(), &dh).run(plan, input).unwrap();
        assert_eq!(output.records.len(), 1);
        let warnings = dh.diagnostics();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].annotations[0].span, sluice_parser::Span::new(15, 20));
    }

    #[test]
    fn warnings_do_not_fail_the_run() {
        let (reg, dh) = (Registry::builtin(), Collector::new());
        let plan = plan("from [{a: 1}, {a: \"x\"}] | assert a == 1", ElementType::Void, &reg, &dh);
        let output = Executor::new(reg.functions(), &dh).run(plan, Vec::new()).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(dh.messages(), vec!["assertion failed: a == 1"]);
    }
}
