//! Constant values and event records.
//!
//! `Value` is both the literal kind stored in the AST and the result of
//! constant evaluation. Every value can be folded back into an expression.

use std::cmp::Ordering;
use std::fmt;

/// A constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Human-readable name of the value's kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used for mixed int/uint/float comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Returns `None` when the kinds cannot be ordered against each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
            (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
            (Value::UInt(l), Value::UInt(r)) => Some(l.cmp(r)),
            (Value::Int(l), Value::UInt(r)) => Some(compare_int_uint(*l, *r)),
            (Value::UInt(l), Value::Int(r)) => Some(compare_int_uint(*r, *l).reverse()),
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => None,
            },
        }
    }

    /// Total order for sorting: values of incomparable kinds group by kind,
    /// nulls sort last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::UInt(_) | Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::List(_) => 3,
            Value::Record(_) => 4,
            Value::Null => 5,
        }
    }
}

fn compare_int_uint(l: i64, r: u64) -> Ordering {
    if l < 0 {
        Ordering::Less
    } else {
        (l as u64).cmp(&r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(record) => write!(f, "{}", record),
        }
    }
}

/// An ordered set of named fields. Events flowing through a pipeline are
/// records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Vec<(String, Value)>) -> Self {
        let mut record = Self::new();
        for (name, value) in fields {
            record.insert(name, value);
        }
        record
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Resolve a nested field path like `a.b.c`.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let value = self.get(first.as_ref())?;
        if rest.is_empty() {
            return Some(value);
        }
        match value {
            Value::Record(inner) => inner.get_path(rest),
            _ => None,
        }
    }

    /// Insert a field, replacing an existing field of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, Value)]) -> Record {
        Record::from_fields(
            fields
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut r = record(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        r.insert("a", Value::Int(3));
        assert_eq!(r.to_string(), "{a: 3, b: 2}");
    }

    #[test]
    fn nested_path_lookup() {
        let inner = record(&[("c", Value::String("x".into()))]);
        let outer = record(&[("b", Value::Record(inner))]);
        assert_eq!(
            outer.get_path(&["b", "c"]),
            Some(&Value::String("x".into()))
        );
        assert_eq!(outer.get_path(&["b", "d"]), None);
        assert_eq!(outer.get_path(&["b", "c", "d"]), None);
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(Value::Int(-1).compare(&Value::UInt(0)), Some(Ordering::Less));
        assert_eq!(Value::UInt(2).compare(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::String("1".into())), None);
    }

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::Null, Value::Int(2), Value::Int(1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Null]);
    }

    #[test]
    fn display_formats() {
        let v = Value::List(vec![Value::Float(1.0), Value::String("a".into()), Value::Null]);
        assert_eq!(v.to_string(), "[1.0, \"a\", null]");
    }
}
