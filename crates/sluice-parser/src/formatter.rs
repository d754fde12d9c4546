//! Code formatter for sluice.
//!
//! Pretty-prints the AST back to source code. Expressions print with the
//! minimal parentheses needed to parse back to the same tree.

use std::fmt;

use crate::ast::*;

/// Format a pipeline to a string, one statement per line.
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let mut output = String::new();
    write_body(&mut output, pipeline, 0);
    output
}

fn write_body(out: &mut String, pipeline: &Pipeline, indent: usize) {
    for stmt in &pipeline.body {
        out.push_str(&"  ".repeat(indent));
        write_statement(out, stmt, indent);
        out.push('\n');
    }
}

fn write_block(out: &mut String, pipeline: &Pipeline, indent: usize) {
    out.push_str("{\n");
    write_body(out, pipeline, indent + 1);
    out.push_str(&"  ".repeat(indent));
    out.push('}');
}

fn write_statement(out: &mut String, stmt: &Statement, indent: usize) {
    match stmt {
        Statement::Invocation(inv) => out.push_str(&format_invocation(inv)),
        Statement::Let(stmt) => {
            out.push_str(&format!("let ${} = {}", stmt.name.name, stmt.expr));
        }
        Statement::If(stmt) => {
            out.push_str(&format!("if {} ", stmt.condition));
            write_block(out, &stmt.then, indent);
            if let Some(else_) = &stmt.else_ {
                out.push_str(" else ");
                write_block(out, &else_.pipe, indent);
            }
        }
        Statement::Assignment(stmt) => {
            out.push_str(&format!("{} = {}", stmt.left, stmt.right));
        }
        Statement::Match(stmt) => {
            out.push_str(&format!("match {} {{\n", stmt.expr));
            for arm in &stmt.arms {
                out.push_str(&"  ".repeat(indent + 1));
                out.push_str(&format!("{} => ", arm.pattern));
                write_block(out, &arm.pipe, indent + 1);
                out.push('\n');
            }
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
        Statement::TypeDecl(stmt) => {
            out.push_str(&format!("type {} = {}", stmt.name.name, stmt.ty.name));
        }
    }
}

/// Format an operator invocation on a single line.
pub fn format_invocation(inv: &Invocation) -> String {
    let args: Vec<_> = inv
        .args
        .iter()
        .map(|arg| match arg {
            Argument::Positional(expr) => expr.to_string(),
            Argument::Named(name, expr) => format!("{}={}", name.name, expr),
        })
        .collect();
    if args.is_empty() {
        inv.op.name.clone()
    } else {
        format!("{} {}", inv.op.name, args.join(", "))
    }
}

fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Constant(value, _) => value.to_string(),
        Expr::Field(path) => path.to_string(),
        Expr::Var(var) => format!("${}", var.name.name),
        Expr::Binary(left, op, right, _) => {
            let left = wrap(left, op.precedence(), false);
            let right = wrap(right, op.precedence(), true);
            format!("{} {} {}", left, op.as_str(), right)
        }
        Expr::Unary(op, inner, _) => {
            let inner = match inner.as_ref() {
                Expr::Binary(..) => format!("({})", format_expr(inner)),
                other => format_expr(other),
            };
            match op {
                UnaryOp::Neg => format!("-{}", inner),
                UnaryOp::Not => format!("not {}", inner),
            }
        }
        Expr::Call(name, args, _) => {
            let args: Vec<_> = args.iter().map(format_expr).collect();
            format!("{}({})", name.name, args.join(", "))
        }
        Expr::Record(fields, _) => {
            let fields: Vec<_> = fields
                .iter()
                .map(|(name, value)| format!("{}: {}", name.name, format_expr(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        Expr::List(items, _) => {
            let items: Vec<_> = items.iter().map(format_expr).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

// Binary operators are left-associative, so a right operand of equal
// precedence needs parentheses.
fn wrap(expr: &Expr, parent: u8, right: bool) -> String {
    match expr {
        Expr::Binary(_, op, _, _)
            if op.precedence() < parent || (right && op.precedence() == parent) =>
        {
            format!("({})", format_expr(expr))
        }
        _ => format_expr(expr),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_expr(self))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, parse_expr};

    #[test]
    fn test_format_keeps_needed_parentheses() {
        let expr = parse_expr("(a + b) * c - (d - e)").unwrap();
        assert_eq!(expr.to_string(), "(a + b) * c - (d - e)");
        let expr = parse_expr("not (a == 1)").unwrap();
        assert_eq!(expr.to_string(), "not (a == 1)");
    }

    #[test]
    fn test_format_drops_redundant_parentheses() {
        let expr = parse_expr("(a * b) + (c)").unwrap();
        assert_eq!(expr.to_string(), "a * b + c");
    }

    #[test]
    fn test_format_pipeline() {
        let source = "let $n = 3 | if x > $n { head $n } else { sort x, reverse=true } | select a.b";
        let pipeline = parse(source).unwrap();
        let formatted = format_pipeline(&pipeline);
        assert_eq!(
            formatted,
            "let $n = 3\nif x > $n {\n  head $n\n} else {\n  sort x, reverse=true\n}\nselect a.b\n"
        );
    }

    #[test]
    fn test_format_roundtrips_through_parser() {
        let source = "from [{a: 1, b: \"x\"}, {a: -2}]\nwhere abs(a) >= 1 or b != null";
        let once = format_pipeline(&parse(source).unwrap());
        let twice = format_pipeline(&parse(&once).unwrap());
        assert_eq!(once, twice);
    }
}
