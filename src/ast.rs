//! The AST produced by the parser: declarations and the expression
//! tagged union. Every node carries its source span.

use crate::token::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    Int,
    Float,
    Bool,
    String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Source {
        name: String,
        ty: Option<DeclaredType>,
        init: Option<Expr>,
        span: Span,
    },
    Stream {
        name: String,
        expr: Expr,
        span: Span,
    },
    Sink {
        name: String,
        expr: Expr,
        span: Span,
    },
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Source { name, .. } => name,
            Decl::Stream { name, .. } => name,
            Decl::Sink { name, .. } => name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Source { span, .. } => *span,
            Decl::Stream { span, .. } => *span,
            Decl::Sink { span, .. } => *span,
        }
    }

    /// Source declarations have no formula body of their own.
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Decl::Source { init, .. } => init.as_ref(),
            Decl::Stream { expr, .. } => Some(expr),
            Decl::Sink { expr, .. } => Some(expr),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Decl::Source { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// A built-in function call, e.g. `col(t, 0)`, `filter(t, f)`.
    Call { name: String, args: Vec<Expr> },
    Lambda(Lambda),
    /// `pre(name, initial)`. `name` is carried as the raw identifier,
    /// not wrapped in an `Ident` expression, since the analyzer must
    /// treat it specially: it is a temporal back-edge, not a
    /// same-wave dependency.
    Pre { name: String, initial: Box<Expr> },
    /// `fold(stream_expr, initial_expr, (acc, x) => body)`.
    Fold {
        stream: Box<Expr>,
        initial: Box<Expr>,
        lambda: Lambda,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
}
