//! `select field...`: keeps only the named fields of every event.

use sluice_parser::{Record, Value};
use sluice_types::ElementType;

use crate::ops::{ArgKind, ArgValue, Args, Description};
use crate::plan::{ExecCtx, ExecOperator};

pub fn description() -> Description {
    Description::new("select")
        .variadic("field", ArgKind::Field)
        .spawn(ElementType::Events, ElementType::Events, spawn)
}

fn spawn(args: &Args) -> Box<dyn ExecOperator> {
    let paths = args
        .rest(0)
        .iter()
        .filter_map(ArgValue::as_field)
        .map(|field| field.names().into_iter().map(str::to_string).collect())
        .collect();
    Box::new(SelectExec { paths })
}

/// Inserts `value` at `path`, creating intermediate records.
fn insert_path(record: &mut Record, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        record.insert(first.as_str(), value);
        return;
    }
    let mut inner = match record.remove(first) {
        Some(Value::Record(inner)) => inner,
        _ => Record::new(),
    };
    insert_path(&mut inner, rest, value);
    record.insert(first.as_str(), Value::Record(inner));
}

#[derive(Debug)]
pub struct SelectExec {
    paths: Vec<Vec<String>>,
}

impl ExecOperator for SelectExec {
    fn name(&self) -> &str {
        "select"
    }

    fn process(&mut self, batch: Vec<Record>, _ctx: &ExecCtx<'_>) -> Vec<Record> {
        batch
            .into_iter()
            .map(|row| {
                let mut out = Record::new();
                for path in &self.paths {
                    if let Some(value) = row.get_path(path) {
                        insert_path(&mut out, path, value.clone());
                    }
                }
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_rebuild_records() {
        let mut out = Record::new();
        insert_path(&mut out, &["a".into(), "b".into()], Value::Int(1));
        insert_path(&mut out, &["a".into(), "c".into()], Value::Int(2));
        insert_path(&mut out, &["d".into()], Value::Null);
        let a = Record::from_fields(vec![("b".into(), Value::Int(1)), ("c".into(), Value::Int(2))]);
        assert_eq!(out.get("a"), Some(&Value::Record(a)));
        assert_eq!(out.get("d"), Some(&Value::Null));
    }
}
