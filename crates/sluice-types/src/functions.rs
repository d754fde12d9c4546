//! Builtin scalar functions callable from expressions.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

use sluice_parser::{Span, Value};

use crate::error::EvalError;

type EvalFn = fn(&[Value], Span) -> Result<Value, EvalError>;

/// A scalar function.
#[derive(Clone)]
pub struct Function {
    pub name: &'static str,
    pub arity: usize,
    /// Deterministic functions always return the same result for the same
    /// arguments and may be evaluated at compile time.
    pub deterministic: bool,
    pub eval: EvalFn,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("deterministic", &self.deterministic)
            .finish()
    }
}

/// Name to function lookup.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<&'static str, Function>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with every builtin function.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.add(Function {
            name: "abs",
            arity: 1,
            deterministic: true,
            eval: abs,
        });
        table.add(Function {
            name: "length",
            arity: 1,
            deterministic: true,
            eval: length,
        });
        table.add(Function {
            name: "lower",
            arity: 1,
            deterministic: true,
            eval: |args, span| map_string(args, span, str::to_lowercase),
        });
        table.add(Function {
            name: "upper",
            arity: 1,
            deterministic: true,
            eval: |args, span| map_string(args, span, str::to_uppercase),
        });
        table.add(Function {
            name: "round",
            arity: 1,
            deterministic: true,
            eval: round,
        });
        table.add(Function {
            name: "random",
            arity: 0,
            deterministic: false,
            eval: random,
        });
        table
    }

    pub fn add(&mut self, function: Function) {
        self.functions.insert(function.name, function);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn mismatch(expected: &str, found: &Value, span: Span) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
        span,
    }
}

fn abs(args: &[Value], span: Span) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or(EvalError::Overflow { span }),
        Value::UInt(n) => Ok(Value::UInt(*n)),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        Value::Null => Ok(Value::Null),
        other => Err(mismatch("number", other, span)),
    }
}

fn length(args: &[Value], span: Span) -> Result<Value, EvalError> {
    match &args[0] {
        Value::String(s) => Ok(Value::UInt(s.chars().count() as u64)),
        Value::List(items) => Ok(Value::UInt(items.len() as u64)),
        Value::Record(record) => Ok(Value::UInt(record.len() as u64)),
        Value::Null => Ok(Value::Null),
        other => Err(mismatch("string, list or record", other, span)),
    }
}

fn map_string(args: &[Value], span: Span, f: fn(&str) -> String) -> Result<Value, EvalError> {
    match &args[0] {
        Value::String(s) => Ok(Value::String(f(s))),
        Value::Null => Ok(Value::Null),
        other => Err(mismatch("string", other, span)),
    }
}

fn round(args: &[Value], span: Span) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Float(n) => {
            let rounded = n.round();
            if rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Err(EvalError::Overflow { span })
            }
        }
        Value::Int(_) | Value::UInt(_) | Value::Null => Ok(args[0].clone()),
        other => Err(mismatch("number", other, span)),
    }
}

fn random(_: &[Value], _: Span) -> Result<Value, EvalError> {
    let bits = RandomState::new().build_hasher().finish() >> 11;
    Ok(Value::Float(bits as f64 / (1u64 << 53) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let table = FunctionTable::builtin();
        let function = table.get(name).unwrap();
        (function.eval)(args, Span::unknown())
    }

    #[test]
    fn string_functions() {
        assert_eq!(
            call("upper", &[Value::String("aB".into())]),
            Ok(Value::String("AB".into()))
        );
        assert_eq!(
            call("length", &[Value::String("héllo".into())]),
            Ok(Value::UInt(5))
        );
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(call("abs", &[Value::Int(-3)]), Ok(Value::Int(3)));
        assert_eq!(call("round", &[Value::Float(2.5)]), Ok(Value::Int(3)));
        assert!(matches!(
            call("abs", &[Value::Int(i64::MIN)]),
            Err(EvalError::Overflow { .. })
        ));
    }

    #[test]
    fn type_mismatch_names_the_found_type() {
        let err = call("lower", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "expected `string`, got `int`");
    }

    #[test]
    fn random_is_not_deterministic_and_in_range() {
        let table = FunctionTable::builtin();
        assert!(!table.get("random").unwrap().deterministic);
        match call("random", &[]) {
            Ok(Value::Float(x)) => assert!((0.0..1.0).contains(&x)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
