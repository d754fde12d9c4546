//! User-facing diagnostics and the failure token.
//!
//! Every compiler stage reports problems by pushing a [`Diagnostic`] into a
//! [`DiagnosticHandler`]. Emitting an error hands back a [`Failure`], and
//! fallible stages return [`FailureOr`]. A `Failure` can only be obtained by
//! emitting an error, so a stage that returns `Err` has always reported why.

use std::cell::{Cell, RefCell};
use std::fmt;

use sluice_parser::Span;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A highlighted source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub primary: bool,
    pub span: Span,
    pub text: String,
}

/// A diagnostic with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "diagnostics should be emitted, not silently dropped"]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub annotations: Vec<Annotation>,
    pub hints: Vec<String>,
    pub notes: Vec<String>,
    pub usage: Option<String>,
    pub docs: Option<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            annotations: Vec::new(),
            hints: Vec::new(),
            notes: Vec::new(),
            usage: None,
            docs: None,
        }
    }

    #[cold]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    #[cold]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Mark the main location of the problem.
    pub fn primary(self, span: Span) -> Self {
        self.primary_with(span, "")
    }

    pub fn primary_with(mut self, span: Span, text: impl Into<String>) -> Self {
        self.annotations.push(Annotation {
            primary: true,
            span,
            text: text.into(),
        });
        self
    }

    /// Point at a related location.
    pub fn secondary(mut self, span: Span, text: impl Into<String>) -> Self {
        self.annotations.push(Annotation {
            primary: false,
            span,
            text: text.into(),
        });
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn docs(mut self, docs: impl Into<String>) -> Self {
        self.docs = Some(docs.into());
        self
    }

    pub fn primary_span(&self) -> Option<Span> {
        self.annotations.iter().find(|a| a.primary).map(|a| a.span)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Emit an error and get proof that it was reported.
    pub fn emit(self, dh: &dyn DiagnosticHandler) -> Failure {
        debug_assert!(self.is_error(), "only errors produce a failure token");
        dh.emit(self);
        Failure { _priv: () }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        if let Some(usage) = &self.usage {
            write!(f, "\n  usage: {}", usage)?;
        }
        if let Some(docs) = &self.docs {
            write!(f, "\n  docs: {}", docs)?;
        }
        Ok(())
    }
}

/// Proof that at least one error diagnostic was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Failure {
    _priv: (),
}

impl Failure {
    /// Claim a failure for an error that was reported through another
    /// channel, such as parse errors rendered before compilation.
    pub fn promise() -> Self {
        Failure { _priv: () }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error(s) emitted")
    }
}

impl std::error::Error for Failure {}

pub type FailureOr<T> = Result<T, Failure>;

/// A sink for diagnostics.
pub trait DiagnosticHandler {
    fn emit(&self, diag: Diagnostic);

    /// Whether an error has been emitted so far.
    fn has_failure(&self) -> bool;
}

/// A handler that keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct Collector {
    diagnostics: RefCell<Vec<Diagnostic>>,
    failed: Cell<bool>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.is_error())
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.diagnostics
            .borrow()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }
}

impl DiagnosticHandler for Collector {
    fn emit(&self, diag: Diagnostic) {
        tracing::debug!(severity = %diag.severity, message = %diag.message, "diagnostic");
        if diag.is_error() {
            self.failed.set(true);
        }
        self.diagnostics.borrow_mut().push(diag);
    }

    fn has_failure(&self) -> bool {
        self.failed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitting_an_error_marks_failure() {
        let dh = Collector::new();
        assert!(!dh.has_failure());
        let failure = Diagnostic::error("boom").primary(Span::new(1, 2)).emit(&dh);
        assert_eq!(failure.to_string(), "error(s) emitted");
        assert!(dh.has_failure());
        assert_eq!(dh.errors()[0].primary_span(), Some(Span::new(1, 2)));
    }

    #[test]
    fn warnings_do_not_fail() {
        let dh = Collector::new();
        dh.emit(Diagnostic::warning("careful"));
        assert!(!dh.has_failure());
        assert_eq!(dh.messages(), vec!["careful".to_string()]);
        assert!(dh.errors().is_empty());
    }

    #[test]
    fn display_includes_notes() {
        let diag = Diagnostic::error("unknown variable")
            .hint("available are `$x`")
            .usage("where <expr>");
        assert_eq!(
            diag.to_string(),
            "error: unknown variable\n  hint: available are `$x`\n  usage: where <expr>"
        );
    }
}
