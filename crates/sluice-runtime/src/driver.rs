//! The staged compiler driver.
//!
//! Runs a pipeline through compile, instantiate, type check, optimize and
//! finalize. Each dump switch stops after its stage and returns the
//! rendered IR instead of a plan.

use sluice_ir::{compile, BaseCtx, EventOrder, FinalizeCtx, Plan, Registry, Root, SubstituteCtx};
use sluice_parser::{parse, Pipeline as Ast};
use sluice_types::{Diagnostic, DiagnosticHandler, ElementType, Failure, FailureOr};

/// Which stages to dump and whether to optimize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub dump_ast: bool,
    pub dump_ir: bool,
    pub dump_inst_ir: bool,
    pub dump_opt_ir: bool,
    pub dump_finalized: bool,
    pub optimize: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            dump_ast: false,
            dump_ir: false,
            dump_inst_ir: false,
            dump_opt_ir: false,
            dump_finalized: false,
            optimize: true,
        }
    }
}

/// What the driver produced.
#[derive(Debug)]
pub enum Staged {
    /// A dump switch fired. Holds the rendered stage.
    Dump(String),
    /// The finalized plan and the element type it produces.
    Plan { plan: Plan, output: ElementType },
}

/// Parse `source`, reporting every parse error.
pub fn parse_source(source: &str, dh: &dyn DiagnosticHandler) -> FailureOr<Ast> {
    parse(source).map_err(|errors| {
        let mut failure = Failure::promise();
        for err in errors {
            failure = Diagnostic::error(err.to_string()).primary(err.span()).emit(dh);
        }
        failure
    })
}

/// Drive `source` through every stage. `input` is the element type the
/// pipeline receives, `void` for pipelines that start with a source.
#[tracing::instrument(level = "debug", skip_all, fields(input = %input, optimize = cfg.optimize))]
pub fn run_stages(
    source: &str,
    input: ElementType,
    reg: &Registry,
    dh: &dyn DiagnosticHandler,
    cfg: &ExecConfig,
) -> FailureOr<Staged> {
    let ast = parse_source(source, dh)?;
    if cfg.dump_ast {
        return Ok(Staged::Dump(format!("{:#?}", ast)));
    }
    let base = BaseCtx::new(dh, reg);
    let mut ir = {
        let root = Root::new(base);
        compile(ast, &root.ctx())?
    };
    if cfg.dump_ir {
        return Ok(Staged::Dump(format!("{:#?}", ir)));
    }
    ir.substitute(&SubstituteCtx::new(base, None), true)?;
    if cfg.dump_inst_ir {
        return Ok(Staged::Dump(format!("{:#?}", ir)));
    }
    let output = ir.infer_type(input, dh)?.unwrap_or(ElementType::Events);
    tracing::debug!(%output, "pipeline type checked");
    if cfg.dump_opt_ir {
        let optimized = ir.optimize(Vec::new(), EventOrder::Ordered);
        return Ok(Staged::Dump(format!("{:#?}", optimized)));
    }
    let ctx = FinalizeCtx::new(base, input);
    let plan = if cfg.optimize {
        ir.finalize(&ctx)?
    } else {
        ir.finalize_unoptimized(&ctx)?
    };
    if cfg.dump_finalized {
        return Ok(Staged::Dump(format!("{:#?}", plan)));
    }
    Ok(Staged::Plan { plan, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_types::Collector;

    fn stage(source: &str, cfg: ExecConfig) -> (FailureOr<Staged>, Collector) {
        let dh = Collector::new();
        let reg = Registry::builtin();
        let result = run_stages(source, ElementType::Void, &reg, &dh, &cfg);
        (result, dh)
    }

    fn dump(source: &str, cfg: ExecConfig) -> String {
        match stage(source, cfg).0 {
            Ok(Staged::Dump(text)) => text,
            other => panic!("expected a dump, got {:?}", other),
        }
    }

    #[test]
    fn each_switch_stops_at_its_stage() {
        let source = "let $n = 1 | from [{a: 1}] | where a == $n";
        let ast = dump(source, ExecConfig { dump_ast: true, ..Default::default() });
        assert!(ast.contains("LetStmt"));
        let ir = dump(source, ExecConfig { dump_ir: true, ..Default::default() });
        assert!(ir.contains("lets: ["));
        let inst = dump(source, ExecConfig { dump_inst_ir: true, ..Default::default() });
        assert!(inst.contains("lets: []"));
        let opt = dump(source, ExecConfig { dump_opt_ir: true, ..Default::default() });
        assert!(opt.contains("filter: []"));
        let fin = dump(source, ExecConfig { dump_finalized: true, ..Default::default() });
        assert!(fin.contains("FromExec"));
    }

    #[test]
    fn parse_errors_become_diagnostics() {
        let (result, dh) = stage("head 1 | }", ExecConfig::default());
        assert!(result.is_err());
        assert!(!dh.errors().is_empty());
    }

    #[test]
    fn reports_output_type() {
        let (result, _) = stage("from [{a: 1}] | discard", ExecConfig::default());
        match result.unwrap() {
            Staged::Plan { plan, output } => {
                assert_eq!(output, ElementType::Void);
                assert_eq!(plan.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn type_errors_stop_before_finalize() {
        let (result, dh) = stage("head 1", ExecConfig::default());
        assert!(result.is_err());
        assert_eq!(dh.messages(), vec!["operator cannot be used as a source"]);
    }
}
