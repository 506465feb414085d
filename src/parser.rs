//! Recursive-descent parser over the token stream. Expression
//! precedence, lowest to highest: `||`, `&&`, comparisons, additive,
//! multiplicative, unary, primary.

use crate::ast::*;
use crate::error::RippleError;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse(source: &str) -> Result<Program, RippleError> {
        let tokens = Lexer::tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let program = parser.parse_program()?;
        debug!("parsed {} declarations", program.decls.len());
        Ok(program)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn error(&self, message: impl Into<String>) -> RippleError {
        RippleError::ParseError {
            message: message.into(),
            span: self.span(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, RippleError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {} but found {}",
                kind.describe(),
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, RippleError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected an identifier but found {}", other.describe()))),
        }
    }

    fn parse_program(&mut self) -> Result<Program, RippleError> {
        let mut decls = Vec::new();
        while !self.check(&TokenKind::Eof) {
            decls.push(self.parse_decl()?);
        }
        Ok(Program { decls })
    }

    fn parse_decl(&mut self) -> Result<Decl, RippleError> {
        let span = self.span();
        match self.peek_kind().clone() {
            TokenKind::Source => {
                self.advance();
                let name = self.expect_ident()?;
                let ty = if self.check(&TokenKind::Colon) {
                    self.advance();
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let init = if self.check(&TokenKind::Assign) {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi)?;
                Ok(Decl::Source { name, ty, init, span })
            }
            TokenKind::Stream => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(TokenKind::Arrow)?;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Decl::Stream { name, expr, span })
            }
            TokenKind::Sink => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(TokenKind::Arrow)?;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Decl::Sink { name, expr, span })
            }
            other => Err(self.error(format!(
                "expected `source`, `stream` or `sink` but found {}",
                other.describe()
            ))),
        }
    }

    fn parse_type(&mut self) -> Result<DeclaredType, RippleError> {
        let kind = self.peek_kind().clone();
        let ty = match kind {
            TokenKind::TypeInt => DeclaredType::Int,
            TokenKind::TypeFloat => DeclaredType::Float,
            TokenKind::TypeBool => DeclaredType::Bool,
            TokenKind::TypeString => DeclaredType::String,
            other => return Err(self.error(format!("expected a type but found {}", other.describe()))),
        };
        self.advance();
        Ok(ty)
    }

    // expr := or_expr
    fn parse_expr(&mut self) -> Result<Expr, RippleError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, RippleError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            let span = self.span();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, RippleError> {
        let mut left = self.parse_comparison()?;
        while self.check(&TokenKind::AndAnd) {
            let span = self.span();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, RippleError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, RippleError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, RippleError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, RippleError> {
        let span = self.span();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, RippleError> {
        let span = self.span();
        match self.peek_kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Int(v)), span))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Float(v)), span))
            }
            TokenKind::Str(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Str(v)), span))
            }
            TokenKind::Bool(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(v)), span))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::Pre => self.parse_pre(),
            TokenKind::Fold => self.parse_fold(),
            TokenKind::Ident(name) => self.parse_ident_led(name, span),
            TokenKind::LParen => self.parse_paren_or_lambda(),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, RippleError> {
        let span = self.span();
        self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_branch = self.parse_expr()?;
        self.expect(TokenKind::Else)?;
        let else_branch = self.parse_expr()?;
        self.expect(TokenKind::End)?;
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    fn parse_pre(&mut self) -> Result<Expr, RippleError> {
        let span = self.span();
        self.expect(TokenKind::Pre)?;
        self.expect(TokenKind::LParen)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Comma)?;
        let initial = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(
            ExprKind::Pre {
                name,
                initial: Box::new(initial),
            },
            span,
        ))
    }

    fn parse_fold(&mut self) -> Result<Expr, RippleError> {
        let span = self.span();
        self.expect(TokenKind::Fold)?;
        self.expect(TokenKind::LParen)?;
        let stream = self.parse_expr()?;
        self.expect(TokenKind::Comma)?;
        let initial = self.parse_expr()?;
        self.expect(TokenKind::Comma)?;
        let lambda = self.parse_lambda(2)?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(
            ExprKind::Fold {
                stream: Box::new(stream),
                initial: Box::new(initial),
                lambda,
            },
            span,
        ))
    }

    /// An identifier starts either a bare reference or a call
    /// `name(args)`. `filter`/`count_if` take a lambda of arity 1 as
    /// their second argument; other builtins take plain expressions.
    fn parse_ident_led(&mut self, name: String, span: Span) -> Result<Expr, RippleError> {
        self.advance();
        if !self.check(&TokenKind::LParen) {
            return Ok(Expr::new(ExprKind::Ident(name), span));
        }
        self.advance();
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_call_arg(&name, args.len())?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(ExprKind::Call { name, args }, span))
    }

    /// `filter`/`count_if`'s second argument is always a one-parameter
    /// lambda; every other builtin argument is a plain expression.
    fn parse_call_arg(&mut self, callee: &str, index: usize) -> Result<Expr, RippleError> {
        let expects_lambda =
            index == 1 && matches!(callee, "filter" | "count_if") && self.check(&TokenKind::LParen);
        if expects_lambda && self.looks_like_lambda() {
            let span = self.span();
            let lambda = self.parse_lambda(1)?;
            return Ok(Expr::new(ExprKind::Lambda(lambda), span));
        }
        self.parse_expr()
    }

    fn parse_paren_or_lambda(&mut self) -> Result<Expr, RippleError> {
        if self.looks_like_lambda() {
            let span = self.span();
            let lambda = self.parse_any_arity_lambda()?;
            return Ok(Expr::new(ExprKind::Lambda(lambda), span));
        }
        self.advance();
        let inner = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(inner)
    }

    /// Lookahead: `(` ident (`,` ident)* `)` `=>` marks a lambda;
    /// anything else starting with `(` is a parenthesized expression.
    fn looks_like_lambda(&self) -> bool {
        let mut i = self.pos;
        if self.tokens[i].kind != TokenKind::LParen {
            return false;
        }
        i += 1;
        if self.tokens[i].kind == TokenKind::RParen {
            i += 1;
        } else {
            loop {
                match &self.tokens[i].kind {
                    TokenKind::Ident(_) => i += 1,
                    _ => return false,
                }
                match &self.tokens[i].kind {
                    TokenKind::Comma => {
                        i += 1;
                        continue;
                    }
                    TokenKind::RParen => {
                        i += 1;
                        break;
                    }
                    _ => return false,
                }
            }
        }
        self.tokens[i].kind == TokenKind::FatArrow
    }

    fn parse_any_arity_lambda(&mut self) -> Result<Lambda, RippleError> {
        let span = self.span();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;
        let body = self.parse_expr()?;
        Ok(Lambda {
            params,
            body: Box::new(body),
            span,
        })
    }

    /// Parses a lambda and checks it has exactly `arity` parameters —
    /// the count the enclosing call (`filter`/`count_if`/`fold`)
    /// expects to bind.
    fn parse_lambda(&mut self, arity: usize) -> Result<Lambda, RippleError> {
        let lambda = self.parse_any_arity_lambda()?;
        if lambda.params.len() != arity {
            return Err(RippleError::ParseError {
                message: format!(
                    "expected a lambda with {arity} parameter(s) but found {}",
                    lambda.params.len()
                ),
                span: lambda.span,
            });
        }
        Ok(lambda)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_program() {
        let program =
            Parser::parse("source A:int:=1; stream B<-A*2; stream C<-A+1; stream D<-B+C; sink out<-D;")
                .unwrap();
        assert_eq!(program.decls.len(), 5);
        assert_eq!(program.decls[0].name(), "A");
        assert!(program.decls[0].is_source());
    }

    #[test]
    fn parses_precedence() {
        // `1 + 2 * 3` should parse as `1 + (2 * 3)`.
        let program = Parser::parse("stream s<-1+2*3;").unwrap();
        let Decl::Stream { expr, .. } = &program.decls[0] else {
            panic!()
        };
        match &expr.kind {
            ExprKind::Binary { op: BinOp::Add, right, .. } => match &right.kind {
                ExprKind::Binary { op: BinOp::Mul, .. } => {}
                other => panic!("expected nested mul, got {other:?}"),
            },
            other => panic!("expected top-level add, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_if() {
        let program =
            Parser::parse("stream s<-if t<10 then \"cold\" else if t<25 then \"ok\" else \"hot\" end end;")
                .unwrap();
        assert_eq!(program.decls.len(), 1);
    }

    #[test]
    fn parses_pre_and_fold() {
        let program = Parser::parse(
            "stream counter<-pre(counter,0)+1; stream s<-fold(n,0,(a,x)=>a+x);",
        )
        .unwrap();
        assert_eq!(program.decls.len(), 2);
    }

    #[test]
    fn fold_lambda_wrong_arity_errors() {
        let err = Parser::parse("stream s<-fold(n,0,(a)=>a);").unwrap_err();
        assert!(matches!(err, RippleError::ParseError { .. }));
    }

    #[test]
    fn filter_lambda_arity_one() {
        let program = Parser::parse("stream s<-filter(t,(r)=>len(r)>0);").unwrap();
        assert_eq!(program.decls.len(), 1);
    }

    #[test]
    fn missing_semicolon_errors() {
        let err = Parser::parse("stream s<-1").unwrap_err();
        assert!(matches!(err, RippleError::ParseError { .. }));
    }
}
