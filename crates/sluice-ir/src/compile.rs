//! Lowering of parsed pipelines into IR.

use std::collections::HashMap;

use sluice_parser::{ast, Span, Statement};
use sluice_types::{Diagnostic, FailureOr};

use crate::ctx::{CompileCtx, SubstituteCtx};
use crate::expr::ExprExt;
use crate::operator::Operator;
use crate::ops::{IfIr, LegacyIr};
use crate::pipeline::{Let, Pipeline};
use crate::registry::OperatorDef;

/// User-defined operators nested deeper than this are rejected.
pub const MAX_UDO_DEPTH: usize = 32;

/// Compile a pipeline body in a new scope below `ctx`.
///
/// The first error aborts compilation of the whole body.
#[tracing::instrument(level = "debug", skip_all, fields(statements = pipe.body.len()))]
pub fn compile(pipe: ast::Pipeline, ctx: &CompileCtx<'_>) -> FailureOr<Pipeline> {
    let mut scope = ctx.open_scope();
    let mut declared: HashMap<String, Span> = HashMap::new();
    let mut lets = Vec::new();
    let mut operators = Vec::new();
    for stmt in pipe.body {
        match stmt {
            Statement::Invocation(inv) => {
                let ctx = scope.ctx();
                compile_invocation(inv, &ctx, &mut lets, &mut operators)?;
            }
            Statement::Let(stmt) => {
                let mut expr = stmt.expr;
                expr.bind(&scope.ctx())?;
                let name = stmt.name;
                if let Some(previous) = declared.get(&name.name) {
                    return Err(Diagnostic::error(format!("`${}` is already defined", name.name))
                        .primary(name.span)
                        .secondary(*previous, "first defined here")
                        .emit(ctx.dh()));
                }
                let id = scope.declare(&name.name);
                declared.insert(name.name.clone(), name.span);
                lets.push(Let { name, expr, id });
            }
            Statement::If(stmt) => {
                let ctx = scope.ctx();
                let mut condition = stmt.condition;
                condition.bind(&ctx)?;
                let then = compile(stmt.then, &ctx)?;
                let else_ = match stmt.else_ {
                    Some(branch) => Some((branch.kw, compile(branch.pipe, &ctx)?)),
                    None => None,
                };
                operators.push(Operator::If(IfIr::new(stmt.if_kw, condition, then, else_)));
            }
            Statement::Assignment(stmt) => {
                return Err(Diagnostic::error("assignment is not implemented yet")
                    .primary(stmt.span)
                    .emit(ctx.dh()));
            }
            Statement::Match(stmt) => {
                return Err(Diagnostic::error("`match` is not implemented yet")
                    .primary(stmt.span)
                    .emit(ctx.dh()));
            }
            Statement::TypeDecl(stmt) => {
                return Err(Diagnostic::error("type declarations are not allowed in a pipeline")
                    .primary(stmt.span)
                    .emit(ctx.dh()));
            }
        }
    }
    Ok(Pipeline::new(lets, operators))
}

fn compile_invocation(
    mut inv: ast::Invocation,
    ctx: &CompileCtx<'_>,
    lets: &mut Vec<Let>,
    operators: &mut Vec<Operator>,
) -> FailureOr<()> {
    let Some(def) = ctx.reg().get(&inv.op.name) else {
        let mut diag = Diagnostic::error(format!("operator `{}` not found", inv.op.name)).primary(inv.op.span);
        let names = ctx.reg().operator_names();
        if !names.is_empty() {
            diag = diag.hint(format!("available operators: {}", names.join(", ")));
        }
        return Err(diag.emit(ctx.dh()));
    };
    match def {
        OperatorDef::Native(compiler) => {
            operators.push(compiler.compile(inv, ctx)?);
        }
        OperatorDef::Legacy(factory) => {
            for arg in &mut inv.args {
                arg.expr_mut().bind(ctx)?;
            }
            let mut op = Operator::Legacy(LegacyIr::new(factory.clone(), inv));
            op.substitute(&SubstituteCtx::new(ctx.base(), None), false)?;
            operators.push(op);
        }
        OperatorDef::UserDefined(definition) => {
            if let Some(arg) = inv.args.first() {
                return Err(Diagnostic::error(format!(
                    "user-defined operator `{}` does not take arguments",
                    inv.op.name
                ))
                .primary(arg.span())
                .emit(ctx.dh()));
            }
            if ctx.udo_depth() >= MAX_UDO_DEPTH {
                return Err(Diagnostic::error(format!(
                    "user-defined operator `{}` is nested too deeply",
                    inv.op.name
                ))
                .primary(inv.op.span)
                .note(format!("the limit is {} levels", MAX_UDO_DEPTH))
                .hint("check whether the operator refers to itself")
                .emit(ctx.dh()));
            }
            tracing::debug!(operator = %inv.op.name, depth = ctx.udo_depth(), "expanding user-defined operator");
            let body = compile(definition.clone(), &ctx.enter_user_defined())?;
            lets.extend(body.lets);
            operators.extend(body.operators);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::{BaseCtx, Root};
    use crate::registry::Registry;
    use pretty_assertions::assert_eq;
    use sluice_parser::{parse, Expr, LetId};
    use sluice_types::{Collector, ElementType};

    fn compile_with(reg: &Registry, source: &str) -> (FailureOr<Pipeline>, Collector) {
        let dh = Collector::new();
        let result = {
            let root = Root::new(BaseCtx::new(&dh, reg));
            compile(parse(source).unwrap(), &root.ctx())
        };
        (result, dh)
    }

    fn compile_str(source: &str) -> (FailureOr<Pipeline>, Collector) {
        compile_with(&Registry::builtin(), source)
    }

    fn var_ids(expr: &Expr, out: &mut Vec<LetId>) {
        match expr {
            Expr::Var(var) => out.push(var.id),
            Expr::Binary(left, _, right, _) => {
                var_ids(left, out);
                var_ids(right, out);
            }
            _ => {}
        }
    }

    #[test]
    fn lets_become_entries() {
        let (result, dh) = compile_str("let $x = 1 | let $y = $x + 1 | where a == $y");
        let pipe = result.unwrap();
        assert!(dh.diagnostics().is_empty());
        assert_eq!(pipe.lets.len(), 2);
        assert_eq!(pipe.operators.len(), 1);
        assert_eq!(pipe.lets[0].id, LetId(1));
        assert_eq!(pipe.lets[1].id, LetId(2));
        let mut ids = Vec::new();
        var_ids(&pipe.lets[1].expr, &mut ids);
        assert_eq!(ids, vec![LetId(1)]);
    }

    #[test]
    fn later_lets_are_not_visible_earlier() {
        let (result, dh) = compile_str("let $x = $y | let $y = 1");
        assert!(result.is_err());
        assert_eq!(dh.errors()[0].message, "unknown variable");
        assert_eq!(dh.errors()[0].hints, vec!["no variables are available here".to_string()]);
    }

    #[test]
    fn duplicate_let_is_a_diagnostic() {
        let (result, dh) = compile_str("let $x = 1 | let $x = 2");
        assert!(result.is_err());
        assert_eq!(dh.messages(), vec!["`$x` is already defined"]);
    }

    #[test]
    fn branch_lets_shadow_without_leaking() {
        let (result, dh) = compile_str("let $x = 1 | if a > $x { let $x = 2 | where b == $x } | where c == $x");
        let pipe = result.unwrap();
        assert!(dh.diagnostics().is_empty());
        let Operator::If(branch) = &pipe.operators[0] else {
            panic!("expected `if`");
        };
        assert_eq!(branch.then().lets[0].id, LetId(2));
        let Operator::Where(inner) = &branch.then().operators[0] else {
            panic!("expected `where`");
        };
        let Operator::Where(outer) = &pipe.operators[1] else {
            panic!("expected `where`");
        };
        let mut inner_ids = Vec::new();
        var_ids(inner.expr(), &mut inner_ids);
        let mut outer_ids = Vec::new();
        var_ids(outer.expr(), &mut outer_ids);
        assert_eq!(inner_ids, vec![LetId(2)]);
        assert_eq!(outer_ids, vec![LetId(1)]);
    }

    #[test]
    fn user_defined_operators_get_fresh_ids() {
        let mut reg = Registry::builtin();
        reg.add_user_defined("only_one", parse("let $n = 1 | where x == $n").unwrap());
        let (result, dh) = compile_with(&reg, "only_one | only_one");
        let pipe = result.unwrap();
        assert!(dh.diagnostics().is_empty());
        assert_eq!(pipe.lets.len(), 2);
        assert_eq!(pipe.operators.len(), 2);
        let mut ids = Vec::new();
        for op in &pipe.operators {
            let Operator::Where(op) = op else {
                panic!("expected `where`");
            };
            var_ids(op.expr(), &mut ids);
        }
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(ids, pipe.lets.iter().map(|l| l.id).collect::<Vec<_>>());
    }

    #[test]
    fn user_defined_operators_do_not_see_caller_bindings() {
        let mut reg = Registry::builtin();
        reg.add_user_defined("uses_x", parse("where a == $x").unwrap());
        let (result, dh) = compile_with(&reg, "let $x = 1 | uses_x");
        assert!(result.is_err());
        assert_eq!(dh.messages(), vec!["unknown variable"]);
    }

    #[test]
    fn recursive_user_defined_operator_is_rejected() {
        let mut reg = Registry::builtin();
        reg.add_user_defined("forever", parse("forever").unwrap());
        let (result, dh) = compile_with(&reg, "forever");
        assert!(result.is_err());
        assert_eq!(dh.messages(), vec!["user-defined operator `forever` is nested too deeply"]);
    }

    #[test]
    fn unsupported_statements() {
        for (source, message) in [
            ("a = 1", "assignment is not implemented yet"),
            ("match a { 1 => { head } }", "`match` is not implemented yet"),
            ("type T = int", "type declarations are not allowed in a pipeline"),
        ] {
            let (result, dh) = compile_str(source);
            assert!(result.is_err(), "{}", source);
            assert_eq!(dh.messages(), vec![message]);
        }
    }

    #[test]
    fn unknown_operator_lists_alternatives() {
        let (result, dh) = compile_str("frobnicate");
        assert!(result.is_err());
        let errors = dh.errors();
        assert_eq!(errors[0].message, "operator `frobnicate` not found");
        assert!(errors[0].hints[0].starts_with("available operators: assert, discard"));
    }

    #[test]
    fn legacy_arguments_fail_eagerly() {
        let (result, dh) = compile_str("from [{a: 1}] | sort 42");
        assert!(result.is_err());
        assert_eq!(dh.messages(), vec!["expected field but got `42`"]);
    }

    #[test]
    fn legacy_operator_waits_for_bindings() {
        let (result, dh) = compile_str("let $r = true | sort a, reverse=$r");
        let pipe = result.unwrap();
        assert!(dh.diagnostics().is_empty());
        let Operator::Legacy(op) = &pipe.operators[0] else {
            panic!("expected legacy operator");
        };
        assert!(!op.is_ready());
        let (result, _) = compile_str("sort a, reverse=true");
        let pipe = result.unwrap();
        let Operator::Legacy(op) = &pipe.operators[0] else {
            panic!("expected legacy operator");
        };
        assert!(op.is_ready());
    }

    #[test]
    fn type_inference_through_branches() {
        let (result, _) = compile_str("from [{a: 1}] | if a > 0 { head 1 }");
        let pipe = result.unwrap();
        let dh = Collector::new();
        assert_eq!(pipe.infer_type(ElementType::Void, &dh), Ok(Some(ElementType::Events)));

        let (result, _) = compile_str("from [{a: 1}] | if a > 0 { discard } else { head 1 }");
        let pipe = result.unwrap();
        assert!(pipe.infer_type(ElementType::Void, &dh).is_err());
        assert_eq!(
            dh.messages(),
            vec!["incompatible branch output types: `void` and `events`"]
        );
    }

    #[test]
    fn void_into_events_operator_fails() {
        let (result, _) = compile_str("from [{a: 1}] | discard | head 1");
        let pipe = result.unwrap();
        let dh = Collector::new();
        assert!(pipe.infer_type(ElementType::Void, &dh).is_err());
        assert_eq!(dh.messages(), vec!["operator cannot be used as a source"]);

        let (result, _) = compile_str("where a == 1");
        let pipe = result.unwrap();
        let dh = Collector::new();
        assert!(pipe.infer_type(ElementType::Void, &dh).is_err());
    }

    #[test]
    fn partial_legacy_has_no_opinion() {
        let (result, _) = compile_str("let $r = true | sort a, reverse=$r | head 1");
        let pipe = result.unwrap();
        let dh = Collector::new();
        assert_eq!(pipe.infer_type(ElementType::Bytes, &dh), Ok(None));
        assert!(dh.diagnostics().is_empty());
    }

    #[test]
    fn deterministic_head_count_folds_early() {
        let (result, _) = compile_str("head 1 + 1");
        let pipe = result.unwrap();
        let text = format!("{:?}", pipe.operators[0]);
        assert!(text.contains("Value(2)"), "{}", text);
    }
}
