//! Name lookup for operators and functions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sluice_parser::Pipeline;
use sluice_types::{Function, FunctionTable};

use crate::legacy::OperatorFactory;
use crate::operator::OperatorCompiler;
use crate::ops::{Description, GenericCompiler};

/// How an operator name is compiled.
#[derive(Clone)]
pub enum OperatorDef {
    /// Compiles straight to an IR node.
    Native(Arc<dyn OperatorCompiler>),
    /// Goes through the legacy compatibility layer.
    Legacy(Arc<dyn OperatorFactory>),
    /// A user-defined pipeline, recompiled at every use.
    UserDefined(Pipeline),
}

impl fmt::Debug for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorDef::Native(_) => write!(f, "Native"),
            OperatorDef::Legacy(factory) => write!(f, "Legacy({:?})", factory),
            OperatorDef::UserDefined(pipe) => write!(f, "UserDefined({} statements)", pipe.body.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    operators: HashMap<String, OperatorDef>,
    functions: FunctionTable,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the builtin functions and no operators.
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            functions: FunctionTable::builtin(),
        }
    }

    /// A registry with every builtin operator and function.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        crate::builtins::register(&mut reg);
        reg
    }

    pub fn add_native(&mut self, name: impl Into<String>, compiler: Arc<dyn OperatorCompiler>) {
        self.operators.insert(name.into(), OperatorDef::Native(compiler));
    }

    pub fn add_generic(&mut self, desc: Description) {
        let name = desc.name;
        self.add_native(name, Arc::new(GenericCompiler::new(desc)));
    }

    pub fn add_legacy(&mut self, name: impl Into<String>, factory: Arc<dyn OperatorFactory>) {
        self.operators.insert(name.into(), OperatorDef::Legacy(factory));
    }

    /// Define `name` as a reusable pipeline. Replaces any previous
    /// definition, including builtins.
    pub fn add_user_defined(&mut self, name: impl Into<String>, definition: Pipeline) {
        let name = name.into();
        tracing::debug!(%name, "registered user-defined operator");
        self.operators.insert(name, OperatorDef::UserDefined(definition));
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.add(function);
    }

    pub fn get(&self, name: &str) -> Option<&OperatorDef> {
        self.operators.get(name)
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn operator_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
