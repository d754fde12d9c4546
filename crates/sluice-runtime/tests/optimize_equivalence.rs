//! Optimized and unoptimized plans must produce the same events.

use pretty_assertions::assert_eq;
use sluice_ir::Registry;
use sluice_parser::{parse, Record};
use sluice_runtime::{load_records, run_stages, ExecConfig, Executor, Staged};
use sluice_types::{Collector, ElementType};

const INPUT: &str = r#"[
    {id: 1, kind: "a", size: 10, meta: {ok: true}},
    {id: 2, kind: "b", size: 3, meta: {ok: false}},
    {id: 3, kind: "a", size: 7},
    {id: 4, kind: "c", size: 12, meta: {ok: true}},
    {id: 5, kind: "b", size: 1, meta: {ok: true}},
    {id: 6, kind: "a", size: 25, meta: {ok: false}}
]"#;

fn registry() -> Registry {
    let mut reg = Registry::builtin();
    reg.add_user_defined("big", parse("let $limit = 5 | where size > $limit").unwrap());
    reg
}

fn execute(source: &str, optimize: bool) -> Vec<Record> {
    let reg = registry();
    let dh = Collector::new();
    let cfg = ExecConfig {
        optimize,
        ..Default::default()
    };
    let plan = match run_stages(source, ElementType::Events, &reg, &dh, &cfg) {
        Ok(Staged::Plan { plan, .. }) => plan,
        other => panic!("`{}` did not compile: {:?} {:?}", source, other, dh.messages()),
    };
    let input = load_records(INPUT, reg.functions()).unwrap();
    Executor::new(reg.functions(), &dh)
        .with_batch_size(2)
        .unwrap()
        .run(plan, input)
        .unwrap()
        .records
}

fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("id").map(ToString::to_string).unwrap_or_default())
        .collect()
}

#[test]
fn optimizer_preserves_results() {
    let pipelines = [
        "sort size | where kind == \"a\"",
        "sort size, reverse=true | where size > 2 and kind != \"c\" | head 3",
        "head 4 | where size > 5",
        "where kind == \"b\" | tail 1",
        "big | sort id, reverse=true",
        "let $k = \"a\" | if kind == $k { sort size } else { where size < 5 } | where id > 1",
        "sort size | where abs(size - 10) < 5 and meta.ok == true",
        "select id, meta.ok | where meta.ok == true",
        "where id > 1 | where id < 6 | sort kind | head 2",
        "if id > 2 { sort size | where kind == \"a\" } else { sort id, reverse=true | where size > 1 }",
    ];
    for source in pipelines {
        let optimized = execute(source, true);
        let unoptimized = execute(source, false);
        assert_eq!(ids(&optimized), ids(&unoptimized), "{}", source);
    }
}

#[test]
fn filter_below_sort_runs_before_it() {
    let reg = registry();
    let dh = Collector::new();
    let cfg = ExecConfig {
        dump_finalized: true,
        ..Default::default()
    };
    let Ok(Staged::Dump(plan)) = run_stages("sort size | where kind == \"a\"", ElementType::Events, &reg, &dh, &cfg)
    else {
        panic!("expected a dump");
    };
    let filter = plan.find("WhereExec").unwrap();
    let sort = plan.find("Sort").unwrap();
    assert!(filter < sort);
    assert_eq!(ids(&execute("sort size | where kind == \"a\"", true)), vec!["3", "1", "6"]);
}

#[test]
fn branches_keep_their_order_without_optimization() {
    let reg = registry();
    let source = "if id > 0 { sort size | where kind == \"a\" }";
    let dump = |optimize: bool| {
        let dh = Collector::new();
        let cfg = ExecConfig {
            dump_finalized: true,
            optimize,
            ..Default::default()
        };
        match run_stages(source, ElementType::Events, &reg, &dh, &cfg) {
            Ok(Staged::Dump(plan)) => plan,
            other => panic!("expected a dump, got {:?}", other),
        }
    };
    let unoptimized = dump(false);
    assert!(unoptimized.find("Sort").unwrap() < unoptimized.find("WhereExec").unwrap());
    let optimized = dump(true);
    assert!(optimized.find("WhereExec").unwrap() < optimized.find("Sort").unwrap());
}

#[test]
fn sources_ignore_input() {
    let reg = registry();
    let dh = Collector::new();
    let Ok(Staged::Plan { plan, output }) = run_stages(
        "from [{id: 9}, {id: 8}] | sort id",
        ElementType::Void,
        &reg,
        &dh,
        &ExecConfig::default(),
    ) else {
        panic!("expected a plan");
    };
    assert_eq!(output, ElementType::Events);
    let records = Executor::new(reg.functions(), &dh).run(plan, Vec::new()).unwrap().records;
    assert_eq!(ids(&records), vec!["8", "9"]);
}
