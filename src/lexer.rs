//! Source text → token stream.

use crate::error::RippleError;
use crate::token::{keyword, Span, Token, TokenKind};

/// Scans a `.rpl` program into a token stream, skipping whitespace and
/// `//` line comments. Fails on the first unrecognized character or
/// unterminated string literal.
pub struct Lexer<'a> {
    chars: Vec<char>,
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, RippleError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        trace!("lexed {} tokens from {} bytes", tokens.len(), source.len());
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, RippleError> {
        self.skip_whitespace_and_comments();
        let span = self.span();
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, String::new(), span));
        };

        if c.is_ascii_digit() {
            return Ok(self.lex_number(span));
        }
        if c == '"' {
            return self.lex_string(span);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.lex_ident_or_keyword(span));
        }

        // punctuation / operators, maximal-munch on two-character forms first
        let two: Option<(char, char, TokenKind)> = match (c, self.peek_at(1)) {
            (':', Some('=')) => Some((':', '=', TokenKind::Assign)),
            ('<', Some('-')) => Some(('<', '-', TokenKind::Arrow)),
            ('=', Some('=')) => Some(('=', '=', TokenKind::EqEq)),
            ('!', Some('=')) => Some(('!', '=', TokenKind::NotEq)),
            ('<', Some('=')) => Some(('<', '=', TokenKind::LtEq)),
            ('>', Some('=')) => Some(('>', '=', TokenKind::GtEq)),
            ('&', Some('&')) => Some(('&', '&', TokenKind::AndAnd)),
            ('|', Some('|')) => Some(('|', '|', TokenKind::OrOr)),
            ('=', Some('>')) => Some(('=', '>', TokenKind::FatArrow)),
            _ => None,
        };
        if let Some((_, _, kind)) = two {
            self.advance();
            self.advance();
            let lexeme = kind.describe();
            return Ok(Token::new(kind, lexeme, span));
        }

        let kind = match c {
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semi,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Bang,
            other => {
                self.advance();
                return Err(RippleError::LexError { ch: other, span });
            }
        };
        let lexeme = c.to_string();
        self.advance();
        Ok(Token::new(kind, lexeme, span))
    }

    fn lex_number(&mut self, span: Span) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            Token::new(TokenKind::Float(lexeme.parse().unwrap()), lexeme, span)
        } else {
            Token::new(TokenKind::Int(lexeme.parse().unwrap()), lexeme, span)
        }
    }

    fn lex_string(&mut self, span: Span) -> Result<Token, RippleError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(RippleError::UnterminatedString { span }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => return Err(RippleError::UnterminatedString { span }),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        let lexeme = format!("{value:?}");
        Ok(Token::new(TokenKind::Str(value), lexeme, span))
    }

    fn lex_ident_or_keyword(&mut self, span: Span) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        let _ = self.source;
        Token::new(kind, lexeme, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_source_decl() {
        let k = kinds("source A:int:=1;");
        assert_eq!(
            k,
            vec![
                Source,
                Ident("A".into()),
                Colon,
                TypeInt,
                Assign,
                Int(1),
                Semi,
                Eof,
            ]
        );
    }

    #[test]
    fn lexes_multi_char_operators_maximal_munch() {
        let k = kinds("a<-b<=c&&d||e==f!=g=>h");
        assert_eq!(
            k,
            vec![
                Ident("a".into()),
                Arrow,
                Ident("b".into()),
                LtEq,
                Ident("c".into()),
                AndAnd,
                Ident("d".into()),
                OrOr,
                Ident("e".into()),
                EqEq,
                Ident("f".into()),
                NotEq,
                Ident("g".into()),
                FatArrow,
                Ident("h".into()),
                Eof,
            ]
        );
    }

    #[test]
    fn lexes_float_vs_int() {
        let k = kinds("1 1.5 10");
        assert_eq!(k, vec![Int(1), Float(1.5), Int(10), Eof]);
    }

    #[test]
    fn skips_line_comments() {
        let k = kinds("1 // comment\n2");
        assert_eq!(k, vec![Int(1), Int(2), Eof]);
    }

    #[test]
    fn string_escapes() {
        let k = kinds(r#""a\"b\n\\c""#);
        assert_eq!(k, vec![Str("a\"b\n\\c".into()), Eof]);
    }

    #[test]
    fn reports_line_and_column() {
        let tokens = Lexer::tokenize("a\n  b").unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 1));
        assert_eq!(tokens[1].span, Span::new(2, 3));
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Lexer::tokenize("\"abc").unwrap_err();
        assert!(matches!(err, RippleError::UnterminatedString { .. }));
    }

    #[test]
    fn illegal_character_errors() {
        let err = Lexer::tokenize("a @ b").unwrap_err();
        assert!(matches!(err, RippleError::LexError { ch: '@', .. }));
    }
}
