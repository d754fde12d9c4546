//! Expression evaluation.
//!
//! Expressions evaluate either without a row (constant evaluation, where any
//! field access is an error) or against one record. Missing fields evaluate
//! to `null`, and `null` propagates through arithmetic and ordering.

use std::cmp::Ordering;

use sluice_parser::{BinOp, Expr, Record, Span, UnaryOp, Value};

use crate::error::EvalError;
use crate::functions::FunctionTable;

/// Evaluate `expr`, reading fields from `row` if given.
pub fn eval(expr: &Expr, row: Option<&Record>, functions: &FunctionTable) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant(value, _) => Ok(value.clone()),
        Expr::Field(path) => match row {
            Some(row) => Ok(row.get_path(&path.names()).cloned().unwrap_or(Value::Null)),
            None => Err(EvalError::NoRow {
                path: path.to_string(),
                span: path.span,
            }),
        },
        Expr::Var(var) => Err(EvalError::Unbound {
            name: var.name.name.clone(),
            span: var.name.span,
        }),
        Expr::Unary(op, inner, span) => {
            let value = eval(inner, row, functions)?;
            eval_unary(*op, value, *span)
        }
        Expr::Binary(left, BinOp::And, right, span) => {
            let left = eval(left, row, functions)?;
            if left == Value::Bool(false) {
                return Ok(left);
            }
            let right = eval(right, row, functions)?;
            logical(BinOp::And, left, right, *span)
        }
        Expr::Binary(left, BinOp::Or, right, span) => {
            let left = eval(left, row, functions)?;
            if left == Value::Bool(true) {
                return Ok(left);
            }
            let right = eval(right, row, functions)?;
            logical(BinOp::Or, left, right, *span)
        }
        Expr::Binary(left, op, right, span) => {
            let left = eval(left, row, functions)?;
            let right = eval(right, row, functions)?;
            eval_binary(*op, left, right, *span)
        }
        Expr::Call(name, args, span) => {
            let function = functions.get(&name.name).ok_or_else(|| EvalError::UnknownFunction {
                name: name.name.clone(),
                span: name.span,
            })?;
            if args.len() != function.arity {
                return Err(EvalError::WrongArity {
                    name: name.name.clone(),
                    expected: function.arity,
                    found: args.len(),
                    span: *span,
                });
            }
            let values = args
                .iter()
                .map(|arg| eval(arg, row, functions))
                .collect::<Result<Vec<_>, _>>()?;
            (function.eval)(&values, *span)
        }
        Expr::Record(fields, _) => {
            let mut record = Record::new();
            for (name, value) in fields {
                record.insert(name.name.clone(), eval(value, row, functions)?);
            }
            Ok(Value::Record(record))
        }
        Expr::List(items, _) => items
            .iter()
            .map(|item| eval(item, row, functions))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
    }
}

/// Evaluate a predicate against a row. Anything but `true` rejects the row.
pub fn matches(expr: &Expr, row: &Record, functions: &FunctionTable) -> Result<bool, EvalError> {
    match eval(expr, Some(row), functions)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeMismatch {
            expected: "bool".to_string(),
            found: other.type_name().to_string(),
            span: expr.span(),
        }),
    }
}

fn eval_unary(op: UnaryOp, value: Value, span: Span) -> Result<Value, EvalError> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow { span }),
        (UnaryOp::Neg, Value::UInt(n)) => i64::try_from(n)
            .map(|n| Value::Int(-n))
            .map_err(|_| EvalError::Overflow { span }),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, value) => Err(EvalError::InvalidOperand {
            op: match op {
                UnaryOp::Neg => "-".to_string(),
                UnaryOp::Not => "not".to_string(),
            },
            ty: value.type_name().to_string(),
            span,
        }),
    }
}

fn logical(op: BinOp, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    match (&left, &right) {
        (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(if op == BinOp::And { *l && *r } else { *l || *r })),
        (Value::Bool(_) | Value::Null, Value::Bool(_) | Value::Null) => {
            // `null and true` is unknown, but `null or true` was not
            // short-circuited above and is still `true`.
            match (op, &right) {
                (BinOp::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                (BinOp::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                _ => Ok(Value::Null),
            }
        }
        _ => Err(invalid_operands(op, &left, &right, span)),
    }
}

fn invalid_operands(op: BinOp, left: &Value, right: &Value, span: Span) -> EvalError {
    EvalError::InvalidOperands {
        op: op.as_str().to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
        span,
    }
}

/// Apply a comparison operator. Ordering against `null` is `null`. Returns
/// `None` for operands that cannot be ordered, and for non-comparison
/// operators.
pub fn compare(op: BinOp, left: &Value, right: &Value) -> Option<Value> {
    let ordering = match op {
        BinOp::Eq => return Some(Value::Bool(equals(left, right))),
        BinOp::Ne => return Some(Value::Bool(!equals(left, right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge if left.is_null() || right.is_null() => {
            return Some(Value::Null);
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => left.compare(right)?,
        _ => return None,
    };
    Some(Value::Bool(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}

fn eval_binary(op: BinOp, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            compare(op, &left, &right).ok_or_else(|| invalid_operands(op, &left, &right, span))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right, span),
        BinOp::And | BinOp::Or => logical(op, left, right, span),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(_), Some(_)) => left.compare(right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn arithmetic(op: BinOp, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow { span };
    match (&left, &right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(l), Value::String(r)) if op == BinOp::Add => Ok(Value::String(format!("{}{}", l, r))),
        (Value::UInt(l), Value::UInt(r)) => {
            let (l, r) = (*l, *r);
            let result = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div if r == 0 => return Err(EvalError::DivisionByZero { span }),
                BinOp::Div => l.checked_div(r),
                _ if r == 0 => return Err(EvalError::DivisionByZero { span }),
                _ => l.checked_rem(r),
            };
            result.map(Value::UInt).ok_or_else(overflow)
        }
        (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) => {
            let l = as_i64(&left).ok_or_else(overflow)?;
            let r = as_i64(&right).ok_or_else(overflow)?;
            let result = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                BinOp::Div if r == 0 => return Err(EvalError::DivisionByZero { span }),
                BinOp::Div => l.checked_div(r),
                _ if r == 0 => return Err(EvalError::DivisionByZero { span }),
                _ => l.checked_rem(r),
            };
            result.map(Value::Int).ok_or_else(overflow)
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => Ok(Value::Float(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
                _ => l % r,
            })),
            _ => Err(invalid_operands(op, &left, &right, span)),
        },
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::UInt(n) => i64::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_parser::parse_expr;

    fn eval_str(source: &str, row: Option<&Record>) -> Result<Value, EvalError> {
        let expr = parse_expr(source).unwrap();
        eval(&expr, row, &FunctionTable::builtin())
    }

    fn row() -> Record {
        Record::from_fields(vec![
            ("a".to_string(), Value::Int(3)),
            ("s".to_string(), Value::String("Hi".into())),
            (
                "nested".to_string(),
                Value::Record(Record::from_fields(vec![("x".to_string(), Value::Float(1.5))])),
            ),
        ])
    }

    #[test]
    fn constant_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3", None), Ok(Value::Int(7)));
        assert_eq!(eval_str("7 / 2", None), Ok(Value::Int(3)));
        assert_eq!(eval_str("7.0 / 2", None), Ok(Value::Float(3.5)));
        assert_eq!(eval_str("\"a\" + \"b\"", None), Ok(Value::String("ab".into())));
        assert_eq!(eval_str("-(2 - 5)", None), Ok(Value::Int(3)));
    }

    #[test]
    fn comparisons() {
        assert_eq!(compare(BinOp::Eq, &Value::Int(1), &Value::Float(1.0)), Some(Value::Bool(true)));
        assert_eq!(compare(BinOp::Ne, &Value::Null, &Value::Int(1)), Some(Value::Bool(true)));
        assert_eq!(compare(BinOp::Ge, &Value::Null, &Value::Int(1)), Some(Value::Null));
        assert_eq!(compare(BinOp::Lt, &Value::UInt(1), &Value::Int(2)), Some(Value::Bool(true)));
        assert_eq!(compare(BinOp::Gt, &Value::String("a".into()), &Value::Int(1)), None);
        assert_eq!(compare(BinOp::Add, &Value::Int(1), &Value::Int(1)), None);
    }

    #[test]
    fn constant_eval_rejects_fields() {
        let err = eval_str("a + 1", None).unwrap_err();
        assert_eq!(err.to_string(), "field `a` cannot be accessed here");
    }

    #[test]
    fn row_access() {
        let row = row();
        assert_eq!(eval_str("a * 2", Some(&row)), Ok(Value::Int(6)));
        assert_eq!(eval_str("nested.x > 1", Some(&row)), Ok(Value::Bool(true)));
        assert_eq!(eval_str("lower(s)", Some(&row)), Ok(Value::String("hi".into())));
        assert_eq!(eval_str("missing + 1", Some(&row)), Ok(Value::Null));
    }

    #[test]
    fn null_logic() {
        let row = row();
        assert_eq!(eval_str("missing > 1 or a == 3", Some(&row)), Ok(Value::Bool(true)));
        assert_eq!(eval_str("missing > 1 and a == 3", Some(&row)), Ok(Value::Null));
        assert_eq!(eval_str("a == 4 and missing > 1", Some(&row)), Ok(Value::Bool(false)));
        let expr = parse_expr("missing > 1").unwrap();
        assert_eq!(matches(&expr, &row, &FunctionTable::builtin()), Ok(false));
    }

    #[test]
    fn numeric_equality_across_kinds() {
        assert_eq!(eval_str("1 == 1.0", None), Ok(Value::Bool(true)));
        assert_eq!(eval_str("1 != \"1\"", None), Ok(Value::Bool(true)));
    }

    #[test]
    fn errors() {
        assert!(matches!(eval_str("1 / 0", None), Err(EvalError::DivisionByZero { .. })));
        assert!(matches!(eval_str("nope(1)", None), Err(EvalError::UnknownFunction { .. })));
        assert!(matches!(eval_str("abs(1, 2)", None), Err(EvalError::WrongArity { .. })));
        assert!(matches!(eval_str("1 < \"a\"", None), Err(EvalError::InvalidOperands { .. })));
        assert!(matches!(eval_str("$x", None), Err(EvalError::Unbound { .. })));
    }
}
