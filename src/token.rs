//! Tokens produced by the lexer and carried through the parser and AST
//! for diagnostics.

use derive_new::new;
use std::fmt::Display;

/// A location in the source text, one-based like most editors.
#[derive(new, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // literals
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),

    // keywords
    Source,
    Stream,
    Sink,
    If,
    Then,
    Else,
    End,
    Pre,
    Fold,
    TypeInt,
    TypeFloat,
    TypeBool,
    TypeString,

    // punctuation
    Colon,
    Assign,   // :=
    Arrow,    // <-
    Semi,     // ;
    LParen,
    RParen,
    Comma,
    FatArrow, // =>

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl TokenKind {
    /// A short human name used in parser error messages.
    pub fn describe(&self) -> String {
        use TokenKind::*;
        match self {
            Int(v) => format!("integer `{v}`"),
            Float(v) => format!("float `{v}`"),
            Str(v) => format!("string {v:?}"),
            Bool(v) => format!("bool `{v}`"),
            Ident(v) => format!("identifier `{v}`"),
            Source => "`source`".into(),
            Stream => "`stream`".into(),
            Sink => "`sink`".into(),
            If => "`if`".into(),
            Then => "`then`".into(),
            Else => "`else`".into(),
            End => "`end`".into(),
            Pre => "`pre`".into(),
            Fold => "`fold`".into(),
            TypeInt => "`int`".into(),
            TypeFloat => "`float`".into(),
            TypeBool => "`bool`".into(),
            TypeString => "`string`".into(),
            Colon => "`:`".into(),
            Assign => "`:=`".into(),
            Arrow => "`<-`".into(),
            Semi => "`;`".into(),
            LParen => "`(`".into(),
            RParen => "`)`".into(),
            Comma => "`,`".into(),
            FatArrow => "`=>`".into(),
            Plus => "`+`".into(),
            Minus => "`-`".into(),
            Star => "`*`".into(),
            Slash => "`/`".into(),
            Percent => "`%`".into(),
            EqEq => "`==`".into(),
            NotEq => "`!=`".into(),
            Lt => "`<`".into(),
            LtEq => "`<=`".into(),
            Gt => "`>`".into(),
            GtEq => "`>=`".into(),
            AndAnd => "`&&`".into(),
            OrOr => "`||`".into(),
            Bang => "`!`".into(),
            Eof => "end of file".into(),
        }
    }
}

#[derive(new, Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

pub fn keyword(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match ident {
        "source" => Source,
        "stream" => Stream,
        "sink" => Sink,
        "if" => If,
        "then" => Then,
        "else" => Else,
        "end" => End,
        "pre" => Pre,
        "fold" => Fold,
        "true" => Bool(true),
        "false" => Bool(false),
        "int" => TypeInt,
        "float" => TypeFloat,
        "bool" => TypeBool,
        "string" => TypeString,
        _ => return None,
    })
}
