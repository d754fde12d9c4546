//! Operators defined by a [`Description`] of their arguments.
//!
//! The description drives argument checking at compile time, constant
//! evaluation during substitution and type inference through its spawn
//! rules. Finalization hands the evaluated [`Args`] to the spawn rule that
//! matches the input type.

use std::fmt;
use std::sync::Arc;

use sluice_parser::{Argument, Expr, FieldPath, Invocation, Located, Span, Value};
use sluice_types::{Diagnostic, DiagnosticHandler, ElementType, Failure, FailureOr, FunctionTable};

use crate::ctx::{CompileCtx, FinalizeCtx, SubstituteCtx};
use crate::expr::{const_eval, ExprExt, SubstituteResult};
use crate::operator::{
    default_optimize, input_error, EventOrder, Operator, OperatorCompiler, OptimizeFilter, OptimizeResult,
};
use crate::plan::{ExecOperator, Plan};

/// What an argument accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    UInt,
    Int,
    Float,
    Bool,
    String,
    /// A list of records. A single record is accepted as a list of one.
    Records,
    Any,
    /// A field path, kept unevaluated.
    Field,
    /// An expression, kept unevaluated for per-row evaluation.
    Expression,
}

impl ArgKind {
    fn coerce(self, value: Value) -> Result<Value, String> {
        let mismatch = |value: &Value| format!("expected {} but got {}", self, value.type_name());
        match (self, value) {
            (ArgKind::UInt, Value::Int(n)) if n < 0 => Err(format!("expected positive integer, got `{}`", n)),
            (ArgKind::UInt, Value::Int(n)) => Ok(Value::UInt(n as u64)),
            (ArgKind::UInt, value @ Value::UInt(_)) => Ok(value),
            (ArgKind::Int, value @ Value::Int(_)) => Ok(value),
            (ArgKind::Int, Value::UInt(n)) => i64::try_from(n)
                .map(Value::Int)
                .map_err(|_| mismatch(&Value::UInt(n))),
            (ArgKind::Float, value @ Value::Float(_)) => Ok(value),
            (ArgKind::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
            (ArgKind::Float, Value::UInt(n)) => Ok(Value::Float(n as f64)),
            (ArgKind::Bool, value @ Value::Bool(_)) => Ok(value),
            (ArgKind::String, value @ Value::String(_)) => Ok(value),
            (ArgKind::Records, Value::Record(record)) => Ok(Value::List(vec![Value::Record(record)])),
            (ArgKind::Records, Value::List(items)) if items.iter().all(|item| matches!(item, Value::Record(_))) => {
                Ok(Value::List(items))
            }
            (ArgKind::Any | ArgKind::Field | ArgKind::Expression, value) => Ok(value),
            (_, value) => Err(mismatch(&value)),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::UInt => "uint",
            ArgKind::Int => "int",
            ArgKind::Float => "number",
            ArgKind::Bool => "bool",
            ArgKind::String => "string",
            ArgKind::Records => "list<record>",
            ArgKind::Any => "any",
            ArgKind::Field => "field",
            ArgKind::Expression => "expr",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Positional {
    pub name: &'static str,
    pub kind: ArgKind,
}

#[derive(Debug, Clone)]
pub struct Named {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

/// Instantiates the executable operator for one input type.
#[derive(Clone)]
pub struct Spawn {
    pub input: ElementType,
    pub output: ElementType,
    pub make: fn(&Args) -> Box<dyn ExecOperator>,
}

impl fmt::Debug for Spawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spawn({} -> {})", self.input, self.output)
    }
}

/// The signature and behaviour of a description-based operator.
#[derive(Debug, Clone)]
pub struct Description {
    pub name: &'static str,
    pub docs: String,
    pub positional: Vec<Positional>,
    /// Index of the first optional positional argument.
    pub first_optional: Option<usize>,
    /// Index of the positional argument that repeats.
    pub variadic_index: Option<usize>,
    pub named: Vec<Named>,
    pub spawns: Vec<Spawn>,
}

impl Description {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            docs: format!("docs/operators.md#{}", name),
            positional: Vec::new(),
            first_optional: None,
            variadic_index: None,
            named: Vec::new(),
            spawns: Vec::new(),
        }
    }

    pub fn positional(mut self, name: &'static str, kind: ArgKind) -> Self {
        debug_assert!(self.first_optional.is_none(), "required after optional");
        self.positional.push(Positional { name, kind });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.first_optional.get_or_insert(self.positional.len());
        self.positional.push(Positional { name, kind });
        self
    }

    /// The last positional argument, repeated. At least one is required.
    pub fn variadic(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.variadic_index = Some(self.positional.len());
        self.positional.push(Positional { name, kind });
        self
    }

    pub fn named(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.named.push(Named {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn named_required(mut self, name: &'static str, kind: ArgKind) -> Self {
        self.named.push(Named {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn spawn(mut self, input: ElementType, output: ElementType, make: fn(&Args) -> Box<dyn ExecOperator>) -> Self {
        self.spawns.push(Spawn { input, output, make });
        self
    }

    fn spawn_for(&self, input: ElementType) -> Option<&Spawn> {
        self.spawns.iter().find(|spawn| spawn.input == input)
    }

    /// A one-line synopsis, e.g. `tail [count:uint]`.
    pub fn usage(&self) -> String {
        let mut parts = Vec::new();
        let mut optional = Vec::new();
        for (idx, positional) in self.positional.iter().enumerate() {
            let mut part = format!("{}:{}", positional.name, positional.kind);
            if self.variadic_index == Some(idx) {
                part.push_str("...");
            }
            if self.first_optional.map_or(false, |first| idx >= first) {
                optional.push(part);
            } else {
                parts.push(part);
            }
        }
        for named in &self.named {
            let part = format!("{}={}", named.name, named.kind);
            if named.required {
                parts.push(part);
            } else {
                optional.push(part);
            }
        }
        if !optional.is_empty() {
            parts.push(format!("[{}]", optional.join(", ")));
        }
        if parts.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.name, parts.join(", "))
        }
    }

    fn error(&self, message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic::error(message)
            .primary(span)
            .usage(self.usage())
            .docs(self.docs.clone())
    }
}

/// An evaluated argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Value(Located<Value>),
    Expr(Expr),
    Field(FieldPath),
}

impl ArgValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ArgValue::Value(value) => Some(&value.inner),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            ArgValue::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldPath> {
        match self {
            ArgValue::Field(path) => Some(path),
            _ => None,
        }
    }
}

/// The arguments a spawn rule receives.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<ArgValue>,
    named: Vec<(&'static str, ArgValue)>,
}

impl Args {
    pub fn positional(&self, idx: usize) -> Option<&ArgValue> {
        self.positional.get(idx)
    }

    /// Positional arguments from `idx` on.
    pub fn rest(&self, idx: usize) -> &[ArgValue] {
        self.positional.get(idx..).unwrap_or(&[])
    }

    pub fn named(&self, name: &str) -> Option<&ArgValue> {
        self.named.iter().find(|(n, _)| *n == name).map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Incomplete(Expr, ArgKind),
    Complete(ArgValue),
}

impl Arg {
    fn substitute(
        &mut self,
        desc: &Description,
        ctx: &SubstituteCtx<'_>,
        instantiate: bool,
        functions: &FunctionTable,
    ) -> FailureOr<()> {
        let Arg::Incomplete(expr, kind) = self else {
            return Ok(());
        };
        if expr.substitute(ctx) == SubstituteResult::SomeRemaining {
            debug_assert!(!instantiate, "unresolved argument after instantiation");
            return Ok(());
        }
        if *kind == ArgKind::Expression {
            *self = Arg::Complete(ArgValue::Expr(expr.clone()));
            return Ok(());
        }
        if !instantiate && !expr.is_deterministic(functions) {
            return Ok(());
        }
        let span = expr.span();
        let value = const_eval(expr, ctx.base())?;
        let value = kind
            .coerce(value)
            .map_err(|message| desc.error(message, span).emit(ctx.dh()))?;
        *self = Arg::Complete(ArgValue::Value(Located::new(value, span)));
        Ok(())
    }

    fn into_complete(self, name: &str) -> ArgValue {
        match self {
            Arg::Complete(value) => value,
            Arg::Incomplete(expr, _) => unreachable!("argument `{}` of `{}` was never evaluated", expr, name),
        }
    }
}

/// IR node of a description-based operator.
#[derive(Debug, Clone)]
pub struct GenericIr {
    desc: Arc<Description>,
    main_location: Span,
    positional: Vec<Arg>,
    named: Vec<Option<Arg>>,
}

impl GenericIr {
    /// Check `inv` against `desc` and bind its arguments. Reports every
    /// problem before failing.
    pub fn make(desc: Arc<Description>, inv: Invocation, ctx: &CompileCtx<'_>) -> FailureOr<GenericIr> {
        let dh = ctx.dh();
        let mut failure: Option<Failure> = None;
        let mut positional = Vec::new();
        let mut named: Vec<Option<Arg>> = vec![None; desc.named.len()];
        for arg in inv.args {
            match arg {
                Argument::Named(name, mut expr) => {
                    let Some(idx) = desc.named.iter().position(|n| n.name == name.name) else {
                        failure = Some(desc.error(format!("named argument `{}` does not exist", name.name), name.span).emit(dh));
                        continue;
                    };
                    if named[idx].is_some() {
                        failure = Some(desc.error(format!("duplicate named argument `{}`", name.name), name.span).emit(dh));
                        continue;
                    }
                    if let Err(err) = expr.bind(ctx) {
                        failure = Some(err);
                        continue;
                    }
                    named[idx] = Some(Arg::Incomplete(expr, desc.named[idx].kind));
                }
                Argument::Positional(mut expr) => {
                    let idx = match desc.variadic_index {
                        Some(variadic) => positional.len().min(variadic),
                        None if positional.len() < desc.positional.len() => positional.len(),
                        None => {
                            failure = Some(desc.error("too many positional arguments", expr.span()).emit(dh));
                            continue;
                        }
                    };
                    let kind = desc.positional[idx].kind;
                    if kind == ArgKind::Field {
                        match expr {
                            Expr::Field(path) => positional.push(Arg::Complete(ArgValue::Field(path))),
                            other => failure = Some(desc.error(
                                format!("expected field but got `{}`", other),
                                other.span(),
                            ).emit(dh)),
                        }
                        continue;
                    }
                    if let Err(err) = expr.bind(ctx) {
                        failure = Some(err);
                        continue;
                    }
                    positional.push(Arg::Incomplete(expr, kind));
                }
            }
        }
        let min = desc.first_optional.unwrap_or(desc.positional.len());
        if failure.is_none() && positional.len() < min {
            let quantifier = if desc.first_optional.is_some() || desc.variadic_index.is_some() {
                "at least"
            } else {
                "exactly"
            };
            failure = Some(desc.error(
                format!("expected {} {} positional argument(s)", quantifier, min),
                inv.op.span,
            ).emit(dh));
        }
        for (spec, arg) in desc.named.iter().zip(&named) {
            if spec.required && arg.is_none() {
                failure = Some(desc.error(
                    format!("required argument `{}` was not provided", spec.name),
                    inv.op.span,
                ).emit(dh));
            }
        }
        if let Some(failure) = failure {
            return Err(failure);
        }
        Ok(GenericIr {
            desc,
            main_location: inv.op.span,
            positional,
            named,
        })
    }

    pub fn name(&self) -> &str {
        self.desc.name
    }

    pub fn main_location(&self) -> Span {
        self.main_location
    }

    /// The evaluated positional argument at `idx`, if it is complete.
    pub fn positional(&self, idx: usize) -> Option<&ArgValue> {
        match self.positional.get(idx) {
            Some(Arg::Complete(value)) => Some(value),
            _ => None,
        }
    }

    pub fn substitute(&mut self, ctx: &SubstituteCtx<'_>, instantiate: bool) -> FailureOr<()> {
        let functions = ctx.base().functions();
        let mut result = Ok(());
        for arg in self.positional.iter_mut().chain(self.named.iter_mut().flatten()) {
            if let Err(failure) = arg.substitute(&self.desc, ctx, instantiate, functions) {
                result = Err(failure);
            }
        }
        result
    }

    pub fn infer_type(&self, input: ElementType, dh: &dyn DiagnosticHandler) -> FailureOr<Option<ElementType>> {
        match self.desc.spawn_for(input) {
            Some(spawn) => Ok(Some(spawn.output)),
            None => Err(input_error(input, self.main_location)
                .docs(self.desc.docs.clone())
                .emit(dh)),
        }
    }

    pub fn optimize(self, filter: OptimizeFilter, _order: EventOrder) -> OptimizeResult {
        default_optimize(Operator::Generic(self), filter)
    }

    pub fn finalize(self, ctx: &FinalizeCtx<'_>) -> FailureOr<Plan> {
        let Some(spawn) = self.desc.spawn_for(ctx.input()) else {
            return Err(input_error(ctx.input(), self.main_location).emit(ctx.dh()));
        };
        let name = self.desc.name;
        let args = Args {
            positional: self
                .positional
                .into_iter()
                .map(|arg| arg.into_complete(name))
                .collect(),
            named: self
                .desc
                .named
                .iter()
                .zip(self.named)
                .filter_map(|(spec, arg)| arg.map(|arg| (spec.name, arg.into_complete(name))))
                .collect(),
        };
        Ok(vec![(spawn.make)(&args)])
    }
}

/// Registers a [`Description`] as a native operator.
#[derive(Debug)]
pub struct GenericCompiler {
    desc: Arc<Description>,
}

impl GenericCompiler {
    pub fn new(desc: Description) -> Self {
        Self { desc: Arc::new(desc) }
    }
}

impl OperatorCompiler for GenericCompiler {
    fn compile(&self, inv: Invocation, ctx: &CompileCtx<'_>) -> FailureOr<Operator> {
        let mut ir = GenericIr::make(self.desc.clone(), inv, ctx)?;
        ir.substitute(&SubstituteCtx::new(ctx.base(), None), false)?;
        Ok(Operator::Generic(ir))
    }
}
