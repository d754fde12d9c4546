//! Contexts threaded through compilation and substitution.
//!
//! A compilation starts from a [`Root`], which owns the binding counter.
//! [`CompileCtx`] is a cheap, copyable view of the root plus the environment
//! of the enclosing scope. Every pipeline body opens its own [`Scope`], which
//! owns a private copy of the environment, so declarations never leak into
//! the parent or into snapshots taken earlier.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use sluice_parser::{LetId, Value};
use sluice_types::{DiagnosticHandler, ElementType, FunctionTable};

use crate::registry::Registry;

/// Names visible at compile time, mapped to their binding identifiers.
pub type Env = HashMap<String, LetId>;

/// Binding identifiers with a known constant value.
pub type SubstEnv = HashMap<LetId, Value>;

/// Services every stage needs: a diagnostic sink and the registry.
#[derive(Clone, Copy)]
pub struct BaseCtx<'a> {
    dh: &'a dyn DiagnosticHandler,
    reg: &'a Registry,
}

impl<'a> BaseCtx<'a> {
    pub fn new(dh: &'a dyn DiagnosticHandler, reg: &'a Registry) -> Self {
        Self { dh, reg }
    }

    pub fn dh(&self) -> &'a dyn DiagnosticHandler {
        self.dh
    }

    pub fn reg(&self) -> &'a Registry {
        self.reg
    }

    pub fn functions(&self) -> &'a FunctionTable {
        self.reg.functions()
    }
}

/// Owner of one compilation's binding counter.
///
/// Must outlive every context derived from it.
pub struct Root<'a> {
    base: BaseCtx<'a>,
    next_id: Cell<u64>,
}

impl<'a> Root<'a> {
    pub fn new(base: BaseCtx<'a>) -> Self {
        Self {
            base,
            next_id: Cell::new(1),
        }
    }

    /// A context at the root, with no bindings in scope.
    pub fn ctx(&self) -> CompileCtx<'_> {
        CompileCtx {
            root: self,
            env: None,
            udo_depth: 0,
        }
    }

    fn mint(&self) -> LetId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        LetId(id)
    }
}

/// A view of the compilation positioned at some scope.
#[derive(Clone, Copy)]
pub struct CompileCtx<'a> {
    root: &'a Root<'a>,
    env: Option<&'a Env>,
    udo_depth: usize,
}

impl<'a> CompileCtx<'a> {
    pub fn base(&self) -> BaseCtx<'a> {
        self.root.base
    }

    pub fn dh(&self) -> &'a dyn DiagnosticHandler {
        self.root.base.dh
    }

    pub fn reg(&self) -> &'a Registry {
        self.root.base.reg
    }

    /// Look up a name in the current environment.
    pub fn get(&self, name: &str) -> Option<LetId> {
        self.env.and_then(|env| env.get(name).copied())
    }

    /// A snapshot of the current environment.
    pub fn env(&self) -> Env {
        self.env.cloned().unwrap_or_default()
    }

    /// A sibling context that sees no outer bindings.
    pub fn without_env(&self) -> CompileCtx<'a> {
        CompileCtx {
            env: None,
            ..*self
        }
    }

    /// The context for compiling the body of a user-defined operator.
    pub fn enter_user_defined(&self) -> CompileCtx<'a> {
        CompileCtx {
            udo_depth: self.udo_depth + 1,
            ..self.without_env()
        }
    }

    /// How many user-defined operators enclose this context.
    pub fn udo_depth(&self) -> usize {
        self.udo_depth
    }

    /// Open a new scope below this context.
    pub fn open_scope(&self) -> Scope<'a> {
        Scope {
            root: self.root,
            env: self.env(),
            local: HashSet::new(),
            udo_depth: self.udo_depth,
        }
    }
}

/// An open scope. Owns its environment; use [`Scope::ctx`] to compile in it.
pub struct Scope<'a> {
    root: &'a Root<'a>,
    env: Env,
    local: HashSet<String>,
    udo_depth: usize,
}

impl<'a> Scope<'a> {
    /// A context reading this scope's environment.
    pub fn ctx(&self) -> CompileCtx<'_> {
        CompileCtx {
            root: self.root,
            env: Some(&self.env),
            udo_depth: self.udo_depth,
        }
    }

    /// Whether `name` was declared in this exact scope.
    pub fn is_declared(&self, name: &str) -> bool {
        self.local.contains(name)
    }

    /// Declare `name` in this scope and mint its identifier.
    ///
    /// Declaring the same name twice in one scope is a bug in the caller.
    pub fn declare(&mut self, name: &str) -> LetId {
        assert!(
            self.local.insert(name.to_string()),
            "`${}` declared twice in one scope",
            name
        );
        let id = self.root.mint();
        tracing::trace!(name, %id, "declared binding");
        self.env.insert(name.to_string(), id);
        id
    }
}

/// Context for substitution: base services plus the constants known so far.
#[derive(Clone, Copy)]
pub struct SubstituteCtx<'a> {
    base: BaseCtx<'a>,
    env: Option<&'a SubstEnv>,
}

impl<'a> SubstituteCtx<'a> {
    pub fn new(base: BaseCtx<'a>, env: Option<&'a SubstEnv>) -> Self {
        Self { base, env }
    }

    pub fn base(&self) -> BaseCtx<'a> {
        self.base
    }

    pub fn dh(&self) -> &'a dyn DiagnosticHandler {
        self.base.dh
    }

    pub fn get(&self, id: LetId) -> Option<&'a Value> {
        self.env.and_then(|env| env.get(&id))
    }

    pub fn env(&self) -> SubstEnv {
        self.env.cloned().unwrap_or_default()
    }

    /// The same services reading another environment.
    pub fn with_env<'b>(&self, env: &'b SubstEnv) -> SubstituteCtx<'b>
    where
        'a: 'b,
    {
        SubstituteCtx {
            base: self.base,
            env: Some(env),
        }
    }
}

/// Context for lowering one node: base services, the node's input type and
/// whether nested pipelines are optimized before lowering.
#[derive(Clone, Copy)]
pub struct FinalizeCtx<'a> {
    base: BaseCtx<'a>,
    input: ElementType,
    optimize: bool,
}

impl<'a> FinalizeCtx<'a> {
    pub fn new(base: BaseCtx<'a>, input: ElementType) -> Self {
        Self {
            base,
            input,
            optimize: true,
        }
    }

    pub fn base(&self) -> BaseCtx<'a> {
        self.base
    }

    pub fn dh(&self) -> &'a dyn DiagnosticHandler {
        self.base.dh
    }

    pub fn input(&self) -> ElementType {
        self.input
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    pub fn with_input(&self, input: ElementType) -> Self {
        Self { input, ..*self }
    }

    /// The same context with filter pushdown switched off everywhere below.
    pub fn unoptimized(&self) -> Self {
        Self {
            optimize: false,
            ..*self
        }
    }
}
