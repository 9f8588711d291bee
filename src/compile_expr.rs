//! Text front end: parses formula source (`|x| x.value > 5`) into [`Expr`] trees.
//!
//! Precedence, loosest first: `|`, `&`, comparisons, `+ -`, `* /`, unary `- ~ !`, `**`,
//! then postfix `.attr`, `[index]` and calls.

use crate::error::CompileError;
use crate::expr::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
use crate::value::Value;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Amp,
    Pipe,
    Tilde,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn bump(&mut self, tok: Token) -> Result<Token, CompileError> {
        self.chars.next();
        Ok(tok)
    }

    /// Consumes `second` when it follows, yielding `long`; otherwise `short`.
    fn pair(&mut self, second: char, long: Token, short: Token) -> Result<Token, CompileError> {
        self.chars.next();
        if self.chars.peek() == Some(&second) {
            self.chars.next();
            Ok(long)
        } else {
            Ok(short)
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_ws();
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        match ch {
            '+' => self.bump(Token::Plus),
            '-' => self.bump(Token::Minus),
            '*' => self.pair('*', Token::StarStar, Token::Star),
            '/' => self.bump(Token::Slash),
            '&' => self.bump(Token::Amp),
            '|' => self.bump(Token::Pipe),
            '~' => self.bump(Token::Tilde),
            '<' => self.pair('=', Token::Le, Token::Lt),
            '>' => self.pair('=', Token::Ge, Token::Gt),
            '!' => self.pair('=', Token::NotEq, Token::Bang),
            '(' => self.bump(Token::LParen),
            ')' => self.bump(Token::RParen),
            '[' => self.bump(Token::LBracket),
            ']' => self.bump(Token::RBracket),
            ',' => self.bump(Token::Comma),
            '=' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Ok(Token::EqEq)
                } else {
                    Err(CompileError::InvalidExpression {
                        expr: "=".to_string(),
                        reason: "unexpected character `=` (did you mean `==`?)".to_string(),
                    })
                }
            }
            '"' | '\'' => self.read_string(ch).map(Token::Str),
            '.' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    let raw = format!("0.{}", self.read_number());
                    parse_number(&raw)
                } else {
                    Ok(Token::Dot)
                }
            }
            c if is_ident_start(c) => Ok(Token::Ident(self.read_ident())),
            c if c.is_ascii_digit() => {
                let raw = self.read_number();
                parse_number(&raw)
            }
            other => Err(CompileError::InvalidExpression {
                expr: other.to_string(),
                reason: format!("unexpected character `{other}`"),
            }),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.chars.next();
        }
    }

    fn read_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }

    fn read_string(&mut self, quote: char) -> Result<String, CompileError> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(CompileError::InvalidExpression {
            expr: format!("{quote}{out}"),
            reason: "unterminated string literal".to_string(),
        })
    }

    fn read_number(&mut self) -> String {
        let mut out = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    out.push(c);
                }
                self.chars.next();
                continue;
            }
            if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                out.push(c);
                self.chars.next();
                continue;
            }
            if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                out.push(c);
                self.chars.next();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        out.push(sign);
                        self.chars.next();
                    }
                }
                continue;
            }
            break;
        }
        out
    }
}

fn parse_number(raw: &str) -> Result<Token, CompileError> {
    let invalid = || CompileError::InvalidExpression {
        expr: raw.to_string(),
        reason: format!("invalid number `{raw}`"),
    };
    if raw.contains(['.', 'e', 'E']) {
        raw.parse::<f64>().map(Token::Float).map_err(|_| invalid())
    } else {
        raw.parse::<i64>().map(Token::Int).map_err(|_| invalid())
    }
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn parse_expression(source: &str) -> Result<Arc<Expr>, CompileError> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_expr()?;
    match parser.next_token()? {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected trailing token: {other:?}"))),
    }
}

struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            lexer: Lexer::new(source),
            lookahead: None,
        }
    }

    fn error(&self, reason: String) -> CompileError {
        CompileError::InvalidExpression {
            expr: self.source.to_string(),
            reason,
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        if let Some(tok) = self.lookahead.take() {
            return Ok(tok);
        }
        self.lexer.next_token()
    }

    fn peek_token(&mut self) -> Result<&Token, CompileError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(self.lookahead.get_or_insert(Token::Eof))
    }

    fn parse_expr(&mut self) -> Result<Arc<Expr>, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut lhs = self.parse_and()?;
        while let Token::Pipe = self.peek_token()? {
            self.next_token()?;
            let rhs = self.parse_and()?;
            lhs = Arc::new(Expr::Logical {
                op: LogicalOp::Or,
                lhs,
                rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut lhs = self.parse_compare()?;
        while let Token::Amp = self.peek_token()? {
            self.next_token()?;
            let rhs = self.parse_compare()?;
            lhs = Arc::new(Expr::Logical {
                op: LogicalOp::And,
                lhs,
                rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut lhs = self.parse_add_sub()?;
        loop {
            let op = match self.peek_token()? {
                Token::Lt => CompareOp::Lt,
                Token::Le => CompareOp::Le,
                Token::Gt => CompareOp::Gt,
                Token::Ge => CompareOp::Ge,
                Token::EqEq => CompareOp::Eq,
                Token::NotEq => CompareOp::Ne,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_add_sub()?;
            lhs = Arc::new(Expr::Compare { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_add_sub(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut lhs = self.parse_mul_div()?;
        loop {
            let op = match self.peek_token()? {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_mul_div()?;
            lhs = Arc::new(Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_mul_div(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_token()? {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_unary()?;
            lhs = Arc::new(Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Arc<Expr>, CompileError> {
        let op = match self.peek_token()? {
            Token::Plus => {
                self.next_token()?;
                return self.parse_unary();
            }
            Token::Minus => UnaryOp::Neg,
            Token::Tilde | Token::Bang => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.next_token()?;
        let expr = self.parse_unary()?;
        // `-2` is a literal, not a negation node.
        if op == UnaryOp::Neg {
            match expr.as_ref() {
                Expr::Const(Value::Int(v)) => return Ok(Expr::constant(-v)),
                Expr::Const(Value::Float(v)) => return Ok(Expr::constant(-v)),
                _ => {}
            }
        }
        Ok(Arc::new(Expr::Unary { op, expr }))
    }

    fn parse_power(&mut self) -> Result<Arc<Expr>, CompileError> {
        let base = self.parse_postfix()?;
        if let Token::StarStar = self.peek_token()? {
            self.next_token()?;
            let exponent = self.parse_unary()?;
            return Ok(Arc::new(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: base,
                rhs: exponent,
            }));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Arc<Expr>, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_token()? {
                Token::Dot => {
                    self.next_token()?;
                    match self.next_token()? {
                        Token::Ident(attr) => expr = Expr::attribute(expr, attr),
                        other => {
                            return Err(
                                self.error(format!("expected attribute name, got {other:?}"))
                            )
                        }
                    }
                }
                Token::LBracket => {
                    self.next_token()?;
                    let index = self.parse_expr()?;
                    self.expect_token(Token::RBracket)?;
                    expr = Arc::new(Expr::Index {
                        target: expr,
                        index,
                    });
                }
                Token::LParen => {
                    self.next_token()?;
                    let args = self.parse_items(Token::RParen)?;
                    expr = Expr::call(expr, args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Arc<Expr>, CompileError> {
        match self.next_token()? {
            Token::Ident(name) => Ok(match name.as_str() {
                "true" | "True" => Expr::constant(true),
                "false" | "False" => Expr::constant(false),
                "null" | "None" => Expr::constant(Value::Null),
                _ => Expr::name(name),
            }),
            Token::Int(v) => Ok(Expr::constant(v)),
            Token::Float(v) => Ok(Expr::constant(v)),
            Token::Str(s) => Ok(Expr::constant(s)),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                let items = self.parse_items(Token::RBracket)?;
                Ok(Arc::new(Expr::List(items)))
            }
            // `|x| body`
            Token::Pipe => {
                let param = match self.next_token()? {
                    Token::Ident(param) => param,
                    other => {
                        return Err(self.error(format!("expected lambda parameter, got {other:?}")))
                    }
                };
                self.expect_token(Token::Pipe)?;
                let body = self.parse_expr()?;
                Ok(Arc::new(Expr::Lambda { param, body }))
            }
            other => Err(self.error(format!("unexpected token: {other:?}"))),
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn parse_items(&mut self, close: Token) -> Result<Vec<Arc<Expr>>, CompileError> {
        let mut items = Vec::new();
        loop {
            match self.peek_token()? {
                tok if *tok == close => {
                    self.next_token()?;
                    return Ok(items);
                }
                Token::Eof => return Err(self.error("unexpected EOF in argument list".to_string())),
                _ => {}
            }
            items.push(self.parse_expr()?);
            match self.next_token()? {
                Token::Comma => {}
                tok if tok == close => return Ok(items),
                other => {
                    return Err(self.error(format!("invalid token in argument list: {other:?}")))
                }
            }
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), CompileError> {
        let got = self.next_token()?;
        if got == expected {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, got {got:?}")))
        }
    }
}
