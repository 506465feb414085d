//! Structured diagnostic types and the source-context error reporter
//! used to render them back to a human or a log line.

use crate::token::Span;
use thiserror::Error;

/// Errors raised while turning source text into a validated graph
/// description (lexing, parsing, analysis). Compile-stage errors abort
/// compilation before any graph is constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RippleError {
    #[error("unexpected character {ch:?}")]
    LexError { ch: char, span: Span },

    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("{message}")]
    ParseError { message: String, span: Span },

    #[error("`{name}` is defined more than once")]
    DuplicateDefinition { name: String, span: Span },

    #[error("`{name}` is not defined (referenced in `{in_node}`)")]
    UndefinedReference {
        name: String,
        in_node: String,
        span: Span,
    },

    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("`{name}` is not a known built-in function")]
    UnknownBuiltin { name: String, span: Span },

    #[error("`{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("source `{name}`'s initializer cannot reference other declared names (found `{reference}`)")]
    InvalidSourceInitializer {
        name: String,
        reference: String,
        span: Span,
    },
}

impl RippleError {
    pub fn span(&self) -> Option<Span> {
        match self {
            RippleError::LexError { span, .. } => Some(*span),
            RippleError::UnterminatedString { span } => Some(*span),
            RippleError::ParseError { span, .. } => Some(*span),
            RippleError::DuplicateDefinition { span, .. } => Some(*span),
            RippleError::UndefinedReference { span, .. } => Some(*span),
            RippleError::CircularDependency { .. } => None,
            RippleError::UnknownBuiltin { span, .. } => Some(*span),
            RippleError::ArityMismatch { span, .. } => Some(*span),
            RippleError::InvalidSourceInitializer { span, .. } => Some(*span),
        }
    }

    /// Single-line, machine-readable form: `kind: message (line:col)`.
    pub fn headline(&self) -> String {
        let kind = match self {
            RippleError::LexError { .. } => "LexError",
            RippleError::UnterminatedString { .. } => "LexError",
            RippleError::ParseError { .. } => "ParseError",
            RippleError::DuplicateDefinition { .. } => "DuplicateDefinition",
            RippleError::UndefinedReference { .. } => "UndefinedReference",
            RippleError::CircularDependency { .. } => "CircularDependency",
            RippleError::UnknownBuiltin { .. } => "UnknownBuiltin",
            RippleError::ArityMismatch { .. } => "ArityMismatch",
            RippleError::InvalidSourceInitializer { .. } => "InvalidSourceInitializer",
        };
        match self.span() {
            Some(span) => format!("{kind}: {self} ({}:{})", span.line, span.column),
            None => format!("{kind}: {self}"),
        }
    }
}

/// Runtime errors surfaced from [`crate::Graph::push`]. A wave that
/// raises one preserves every node's prior cached value and
/// re-evaluates nothing downstream of the failing node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("I/O error loading {path}: {message}")]
    IOError { path: String, message: String },

    #[error("step budget exceeded")]
    StepBudgetExceeded,
}

/// One or more [`RippleError`]s collected from a failed compile,
/// together with the source text needed to render context. Multiple
/// entries only occur for independently-detected circular-dependency
/// errors; every other kind aborts at the first violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    source: String,
    errors: Vec<RippleError>,
}

impl ErrorReport {
    pub fn new(source: impl Into<String>, errors: Vec<RippleError>) -> Self {
        Self {
            source: source.into(),
            errors,
        }
    }

    pub fn single(source: impl Into<String>, error: RippleError) -> Self {
        Self::new(source, vec![error])
    }

    pub fn errors(&self) -> &[RippleError] {
        &self.errors
    }

    /// Three lines of source context around each error, a caret under
    /// the offending column where a span is available, and a one-line
    /// headline.
    pub fn render(&self) -> String {
        let lines: Vec<&str> = self.source.lines().collect();
        let mut out = String::new();
        for err in &self.errors {
            out.push_str(&format!("error: {}\n", err.headline()));
            if let Some(span) = err.span() {
                out.push_str(&format!("  --> line {}, column {}\n", span.line, span.column));
                let start = span.line.saturating_sub(2);
                for (offset, idx) in (start..=span.line).enumerate() {
                    if idx == 0 || idx > lines.len() {
                        continue;
                    }
                    let _ = offset;
                    out.push_str(&format!("{:>4} | {}\n", idx, lines[idx - 1]));
                    if idx == span.line {
                        let caret_col = span.column.saturating_sub(1);
                        out.push_str(&format!("     | {}^\n", " ".repeat(caret_col)));
                    }
                }
                if span.line < lines.len() {
                    out.push_str(&format!("{:>4} | {}\n", span.line + 1, lines[span.line]));
                }
            }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::error::Error for ErrorReport {}
