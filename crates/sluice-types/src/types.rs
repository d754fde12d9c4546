//! Element types flowing between operators.

use std::fmt;

/// The kind of elements an operator consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Nothing flows: the input of a source, the output of a sink.
    Void,
    /// Batches of records.
    Events,
    /// Raw byte chunks.
    Bytes,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Void => write!(f, "void"),
            ElementType::Events => write!(f, "events"),
            ElementType::Bytes => write!(f, "bytes"),
        }
    }
}
