//! Compile-time operations on expressions: name binding, constant
//! substitution, determinism checks and constant evaluation.

use sluice_parser::{Expr, Value};
use sluice_types::{eval, Diagnostic, Failure, FailureOr, FunctionTable};

use crate::ctx::{BaseCtx, CompileCtx, SubstituteCtx};

/// Whether an expression still references unresolved bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstituteResult {
    NoRemaining,
    SomeRemaining,
}

impl SubstituteResult {
    fn and(self, other: SubstituteResult) -> SubstituteResult {
        if self == SubstituteResult::NoRemaining {
            other
        } else {
            self
        }
    }
}

/// Compiler extensions for [`Expr`].
pub trait ExprExt {
    /// Resolve every `$name` against the environment of `ctx` and check that
    /// called functions exist. Reports every problem before failing.
    fn bind(&mut self, ctx: &CompileCtx<'_>) -> FailureOr<()>;

    /// Replace bound variables with their known constants. Does not fold.
    fn substitute(&mut self, ctx: &SubstituteCtx<'_>) -> SubstituteResult;

    /// Whether the expression evaluates to the same value every time,
    /// without a row.
    fn is_deterministic(&self, functions: &FunctionTable) -> bool;
}

impl ExprExt for Expr {
    fn bind(&mut self, ctx: &CompileCtx<'_>) -> FailureOr<()> {
        let mut failure = None;
        bind_into(self, ctx, &mut failure);
        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn substitute(&mut self, ctx: &SubstituteCtx<'_>) -> SubstituteResult {
        match self {
            Expr::Var(var) => {
                debug_assert!(var.id.is_bound(), "substituting unbound `${}`", var.name.name);
                match ctx.get(var.id) {
                    Some(value) => {
                        let span = var.name.span;
                        *self = Expr::Constant(value.clone(), span);
                        SubstituteResult::NoRemaining
                    }
                    None => SubstituteResult::SomeRemaining,
                }
            }
            Expr::Constant(..) | Expr::Field(_) => SubstituteResult::NoRemaining,
            Expr::Binary(left, _, right, _) => left.substitute(ctx).and(right.substitute(ctx)),
            Expr::Unary(_, inner, _) => inner.substitute(ctx),
            Expr::Call(_, args, _) | Expr::List(args, _) => args
                .iter_mut()
                .fold(SubstituteResult::NoRemaining, |acc, arg| acc.and(arg.substitute(ctx))),
            Expr::Record(fields, _) => fields
                .iter_mut()
                .fold(SubstituteResult::NoRemaining, |acc, (_, value)| {
                    acc.and(value.substitute(ctx))
                }),
        }
    }

    fn is_deterministic(&self, functions: &FunctionTable) -> bool {
        match self {
            Expr::Constant(..) => true,
            Expr::Unary(_, inner, _) => inner.is_deterministic(functions),
            Expr::Binary(left, _, right, _) => {
                left.is_deterministic(functions) && right.is_deterministic(functions)
            }
            Expr::Call(name, args, _) => {
                functions.get(&name.name).map_or(false, |f| f.deterministic)
                    && args.iter().all(|arg| arg.is_deterministic(functions))
            }
            Expr::List(items, _) => items.iter().all(|item| item.is_deterministic(functions)),
            Expr::Record(fields, _) => fields
                .iter()
                .all(|(_, value)| value.is_deterministic(functions)),
            Expr::Field(_) | Expr::Var(_) => false,
        }
    }
}

fn bind_into(expr: &mut Expr, ctx: &CompileCtx<'_>, failure: &mut Option<Failure>) {
    match expr {
        Expr::Var(var) => match ctx.get(&var.name.name) {
            Some(id) => var.id = id,
            None => {
                let mut available: Vec<String> =
                    ctx.env().keys().map(|name| format!("`${}`", name)).collect();
                available.sort();
                let diag = Diagnostic::error("unknown variable").primary(var.name.span);
                let diag = if available.is_empty() {
                    diag.hint("no variables are available here")
                } else {
                    diag.hint(format!("available are {}", available.join(", ")))
                };
                *failure = Some(diag.emit(ctx.dh()));
            }
        },
        Expr::Call(name, args, span) => {
            match ctx.reg().functions().get(&name.name) {
                None => {
                    *failure = Some(
                        Diagnostic::error(format!("unknown function `{}`", name.name))
                            .primary(name.span)
                            .emit(ctx.dh()),
                    );
                }
                Some(function) if function.arity != args.len() => {
                    *failure = Some(
                        Diagnostic::error(format!(
                            "function `{}` expects {} argument(s), got {}",
                            name.name,
                            function.arity,
                            args.len()
                        ))
                        .primary(*span)
                        .emit(ctx.dh()),
                    );
                }
                Some(_) => {}
            }
            for arg in args {
                bind_into(arg, ctx, failure);
            }
        }
        Expr::Binary(left, _, right, _) => {
            bind_into(left, ctx, failure);
            bind_into(right, ctx, failure);
        }
        Expr::Unary(_, inner, _) => bind_into(inner, ctx, failure),
        Expr::List(items, _) => {
            for item in items {
                bind_into(item, ctx, failure);
            }
        }
        Expr::Record(fields, _) => {
            for (_, value) in fields {
                bind_into(value, ctx, failure);
            }
        }
        Expr::Constant(..) | Expr::Field(_) => {}
    }
}

/// Evaluate an expression that must not depend on a row.
pub fn const_eval(expr: &Expr, base: BaseCtx<'_>) -> FailureOr<Value> {
    eval(expr, None, base.functions()).map_err(|err| {
        Diagnostic::error(err.to_string())
            .primary(err.span())
            .emit(base.dh())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::{Root, SubstEnv};
    use crate::registry::Registry;
    use sluice_parser::{parse_expr, LetId};
    use sluice_types::Collector;

    fn expr(source: &str) -> Expr {
        parse_expr(source).unwrap()
    }

    #[test]
    fn bind_resolves_variables() {
        let dh = Collector::new();
        let reg = Registry::new();
        let root = Root::new(BaseCtx::new(&dh, &reg));
        let mut scope = root.ctx().open_scope();
        let id = scope.declare("x");
        let mut e = expr("$x + 1");
        e.bind(&scope.ctx()).unwrap();
        match e {
            Expr::Binary(left, ..) => match *left {
                Expr::Var(var) => assert_eq!(var.id, id),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_variable_lists_available() {
        let dh = Collector::new();
        let reg = Registry::new();
        let root = Root::new(BaseCtx::new(&dh, &reg));
        let mut scope = root.ctx().open_scope();
        scope.declare("b");
        scope.declare("a");
        assert!(expr("$c").bind(&scope.ctx()).is_err());
        let errors = dh.errors();
        assert_eq!(errors[0].message, "unknown variable");
        assert_eq!(errors[0].hints, vec!["available are `$a`, `$b`".to_string()]);
    }

    #[test]
    fn unknown_variable_without_bindings() {
        let dh = Collector::new();
        let reg = Registry::new();
        let root = Root::new(BaseCtx::new(&dh, &reg));
        assert!(expr("$x == $y").bind(&root.ctx()).is_err());
        let errors = dh.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].hints, vec!["no variables are available here".to_string()]);
    }

    #[test]
    fn unknown_function_and_arity() {
        let dh = Collector::new();
        let reg = Registry::new();
        let root = Root::new(BaseCtx::new(&dh, &reg));
        assert!(expr("nope(1)").bind(&root.ctx()).is_err());
        assert!(expr("abs(1, 2)").bind(&root.ctx()).is_err());
        assert_eq!(
            dh.messages(),
            vec![
                "unknown function `nope`".to_string(),
                "function `abs` expects 1 argument(s), got 2".to_string(),
            ]
        );
    }

    #[test]
    fn substitute_replaces_known_and_keeps_unknown() {
        let dh = Collector::new();
        let reg = Registry::new();
        let root = Root::new(BaseCtx::new(&dh, &reg));
        let mut scope = root.ctx().open_scope();
        let x = scope.declare("x");
        scope.declare("y");
        let mut e = expr("$x + $y");
        e.bind(&scope.ctx()).unwrap();

        let mut env = SubstEnv::new();
        env.insert(x, Value::Int(1));
        let ctx = SubstituteCtx::new(root.ctx().base(), Some(&env));
        assert_eq!(e.substitute(&ctx), SubstituteResult::SomeRemaining);
        let once = e.clone();
        assert_eq!(e.substitute(&ctx), SubstituteResult::SomeRemaining);
        assert_eq!(e, once);
        assert_eq!(e.to_string(), "1 + $y");
        assert!(!env.contains_key(&LetId(0)));
    }

    #[test]
    fn determinism() {
        let reg = Registry::new();
        let functions = reg.functions();
        assert!(expr("1 + abs(-2)").is_deterministic(functions));
        assert!(expr("[1, {a: 2}]").is_deterministic(functions));
        assert!(!expr("random()").is_deterministic(functions));
        assert!(!expr("a + 1").is_deterministic(functions));
        assert!(!expr("$x").is_deterministic(functions));
    }

    #[test]
    fn const_eval_reports_diagnostics() {
        let dh = Collector::new();
        let reg = Registry::new();
        let base = BaseCtx::new(&dh, &reg);
        assert_eq!(const_eval(&expr("2 * 3"), base), Ok(Value::Int(6)));
        assert!(const_eval(&expr("a"), base).is_err());
        assert_eq!(dh.messages(), vec!["field `a` cannot be accessed here".to_string()]);
    }
}
