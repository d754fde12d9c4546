//! Abstract Syntax Tree definitions for sluice.

use std::fmt;

use crate::span::Span;
use crate::value::Value;

/// Identifies one `let` declaration.
///
/// The default value `0` means the variable has not been bound yet. Bound
/// identifiers are minted from a per-compilation counter and are never reused,
/// even for two declarations with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LetId(pub u64);

impl LetId {
    pub fn is_bound(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for LetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pipeline body: statements separated by `|` or newlines.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub body: Vec<Statement>,
    pub span: Span,
}

impl Pipeline {
    pub fn new(body: Vec<Statement>, span: Span) -> Self {
        Self { body, span }
    }
}

/// A statement in a pipeline body.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Invocation(Invocation),
    Let(LetStmt),
    If(IfStmt),
    Assignment(Assignment),
    Match(MatchStmt),
    TypeDecl(TypeDecl),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Invocation(inv) => inv.span,
            Statement::Let(stmt) => stmt.span,
            Statement::If(stmt) => stmt.span,
            Statement::Assignment(stmt) => stmt.span,
            Statement::Match(stmt) => stmt.span,
            Statement::TypeDecl(stmt) => stmt.span,
        }
    }
}

/// An operator invocation such as `sort x, reverse=true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub op: Ident,
    pub args: Vec<Argument>,
    pub span: Span,
}

/// An argument of an operator invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expr),
    Named(Ident, Expr),
}

impl Argument {
    pub fn expr(&self) -> &Expr {
        match self {
            Argument::Positional(expr) | Argument::Named(_, expr) => expr,
        }
    }

    pub fn expr_mut(&mut self) -> &mut Expr {
        match self {
            Argument::Positional(expr) | Argument::Named(_, expr) => expr,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Argument::Positional(expr) => expr.span(),
            Argument::Named(name, expr) => name.span.merge(expr.span()),
        }
    }
}

/// `let $name = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct LetStmt {
    pub let_kw: Span,
    pub name: Ident,
    pub expr: Expr,
    pub span: Span,
}

/// `if cond { ... } else { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub if_kw: Span,
    pub condition: Expr,
    pub then: Pipeline,
    pub else_: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseBranch {
    pub kw: Span,
    pub pipe: Pipeline,
}

/// `field = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub left: FieldPath,
    pub right: Expr,
    pub span: Span,
}

/// `match expr { pattern => { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStmt {
    pub expr: Expr,
    pub arms: Vec<MatchArm>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Expr,
    pub pipe: Pipeline,
}

/// `type Name = Other`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Ident,
    pub ty: Ident,
    pub span: Span,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A dotted field path like `src.ip`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    pub segments: Vec<Ident>,
    pub span: Span,
}

impl FieldPath {
    pub fn names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A `$name` reference, bound to a `let` declaration during compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct DollarVar {
    pub name: Ident,
    pub id: LetId,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value, Span),
    Field(FieldPath),
    Var(DollarVar),
    Binary(Box<Expr>, BinOp, Box<Expr>, Span),
    Unary(UnaryOp, Box<Expr>, Span),
    Call(Ident, Vec<Expr>, Span),
    Record(Vec<(Ident, Expr)>, Span),
    List(Vec<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Constant(_, s) => *s,
            Expr::Field(path) => path.span,
            Expr::Var(var) => var.name.span,
            Expr::Binary(_, _, _, s) => *s,
            Expr::Unary(_, _, s) => *s,
            Expr::Call(_, _, s) => *s,
            Expr::Record(_, s) => *s,
            Expr::List(_, s) => *s,
        }
    }

    pub fn constant(value: Value, span: Span) -> Self {
        Expr::Constant(value, span)
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant(value, _) => Some(value),
            _ => None,
        }
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        let span = left.span().merge(right.span());
        Expr::Binary(Box::new(left), op, Box::new(right), span)
    }

    /// Split a conjunction `a and b and c` into its parts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Binary(left, BinOp::And, right, _) => {
                let mut parts = left.into_conjuncts();
                parts.extend(right.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Join expressions with `and`. An empty list yields `true`.
    pub fn conjunction(parts: impl IntoIterator<Item = Expr>) -> Expr {
        parts
            .into_iter()
            .reduce(|acc, part| Expr::binary(acc, BinOp::And, part))
            .unwrap_or_else(|| Expr::Constant(Value::Bool(true), Span::unknown()))
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// The operator that results from swapping the operands, for comparisons.
    pub fn flipped(self) -> Option<BinOp> {
        match self {
            BinOp::Eq => Some(BinOp::Eq),
            BinOp::Ne => Some(BinOp::Ne),
            BinOp::Lt => Some(BinOp::Gt),
            BinOp::Le => Some(BinOp::Ge),
            BinOp::Gt => Some(BinOp::Lt),
            BinOp::Ge => Some(BinOp::Le),
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}
