/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lexer and recursive-descent parser for the built-in expression language.
//!
//! The grammar is a small OGNL-like subset:
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := equality (("and" | "&&") equality)*
//! equality   := relational (("==" | "!=" | "eq" | "neq") relational)*
//! relational := additive (("<" | "<=" | ">" | ">=" | "lt" | "lte" | "gt" | "gte") additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("!" | "not" | "-") unary | postfix
//! postfix    := primary ("." ident ("(" args ")")? | "[" or "]")*
//! primary    := literal | ident | "(" or ")"
//! ```

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
}

/// Symbolic operators, longest first so `<=` wins over `<`.
const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
];

fn tokenize(input: &str) -> EvalResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < input.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        match c {
            b'(' => tokens.push((start, Token::LParen)),
            b')' => tokens.push((start, Token::RParen)),
            b'[' => tokens.push((start, Token::LBracket)),
            b']' => tokens.push((start, Token::RBracket)),
            b',' => tokens.push((start, Token::Comma)),
            b'.' if !bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                tokens.push((start, Token::Dot))
            }
            b'\'' | b'"' => {
                let (text, end) = lex_string(input, pos)?;
                tokens.push((start, Token::Str(text)));
                pos = end;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                let (token, end) = lex_number(input, pos)?;
                tokens.push((start, token));
                pos = end;
                continue;
            }
            _ if c == b'_' || c == b'$' || c.is_ascii_alphabetic() => {
                let end = input[pos..]
                    .find(|ch: char| !(ch == '_' || ch == '$' || ch.is_ascii_alphanumeric()))
                    .map_or(input.len(), |offset| pos + offset);
                tokens.push((start, Token::Ident(input[pos..end].to_string())));
                pos = end;
                continue;
            }
            _ => {
                let op = OPERATORS
                    .iter()
                    .find(|op| input[pos..].starts_with(*op))
                    .ok_or_else(|| EvalError::Syntax {
                        position: pos,
                        message: format!(
                            "unexpected character '{}'",
                            input[pos..].chars().next().unwrap_or_default()
                        ),
                    })?;
                tokens.push((start, Token::Op(op)));
                pos += op.len();
                continue;
            }
        }
        pos += 1;
    }

    Ok(tokens)
}

fn lex_string(input: &str, start: usize) -> EvalResult<(String, usize)> {
    let mut chars = input[start..].char_indices();
    let quote = chars.next().map(|(_, c)| c).unwrap_or('\'');
    let mut text = String::new();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, escaped)) => text.push(escaped),
                None => break,
            },
            c if c == quote => return Ok((text, start + offset + c.len_utf8())),
            c => text.push(c),
        }
    }

    Err(EvalError::Syntax {
        position: start,
        message: "unterminated string literal".to_string(),
    })
}

fn lex_number(input: &str, start: usize) -> EvalResult<(Token, usize)> {
    let rest = &input[start..];
    let mut end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let mut is_float = false;

    // `1.` without a digit after the dot is an integer followed by a dot.
    if rest[end..].starts_with('.')
        && rest[end + 1..].starts_with(|c: char| c.is_ascii_digit())
    {
        is_float = true;
        end += 1;
        end += rest[end..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - end);
    }

    let text = &rest[..end];
    let syntax = |message: String| EvalError::Syntax {
        position: start,
        message,
    };
    let token = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| syntax(format!("invalid number '{}'", text)))?,
        )
    } else {
        Token::Int(
            text.parse()
                .map_err(|_| syntax(format!("integer literal '{}' out of range", text)))?,
        )
    };
    Ok((token, start + end))
}

/// Parse an expression string into an [`Expr`].
pub fn parse_expression(input: &str) -> EvalResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.len(),
    };
    if parser.tokens.is_empty() {
        return Err(EvalError::Syntax {
            position: 0,
            message: "empty expression".to_string(),
        });
    }
    let expr = parser.parse_or()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(EvalError::Syntax {
            position: *position,
            message: format!("unexpected {}", describe(token)),
        });
    }
    Ok(expr)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("identifier '{}'", name),
        Token::Int(i) => format!("number {}", i),
        Token::Float(f) => format!("number {}", f),
        Token::Str(_) => "string literal".to_string(),
        Token::Op(op) => format!("'{}'", op),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |(pos, _)| *pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        self.pos += 1;
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> EvalResult<T> {
        Err(EvalError::Syntax {
            position: self.position(),
            message: message.into(),
        })
    }

    fn expect(&mut self, expected: Token) -> EvalResult<()> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => {
                let message = format!("expected {}, found {}", describe(&expected), describe(token));
                self.error(message)
            }
            None => self.error(format!("expected {}, found end of input", describe(&expected))),
        }
    }

    /// Match the next token against symbolic or keyword spellings of an operator.
    fn binary_op(&self, table: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        let spelled = match self.peek()? {
            Token::Op(op) => *op,
            Token::Ident(word) => word.as_str(),
            _ => return None,
        };
        table
            .iter()
            .find(|(text, _)| *text == spelled)
            .map(|(_, op)| *op)
    }

    fn parse_level(
        &mut self,
        table: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> EvalResult<Expr>,
    ) -> EvalResult<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.binary_op(table) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> EvalResult<Expr> {
        self.parse_level(&[("or", BinaryOp::Or), ("||", BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> EvalResult<Expr> {
        self.parse_level(
            &[("and", BinaryOp::And), ("&&", BinaryOp::And)],
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> EvalResult<Expr> {
        self.parse_level(
            &[
                ("==", BinaryOp::Eq),
                ("eq", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
                ("neq", BinaryOp::Ne),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> EvalResult<Expr> {
        self.parse_level(
            &[
                ("<", BinaryOp::Lt),
                ("lt", BinaryOp::Lt),
                ("<=", BinaryOp::Le),
                ("lte", BinaryOp::Le),
                (">", BinaryOp::Gt),
                ("gt", BinaryOp::Gt),
                (">=", BinaryOp::Ge),
                ("gte", BinaryOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> EvalResult<Expr> {
        self.parse_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> EvalResult<Expr> {
        self.parse_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Some(Token::Op("!")) => Some(UnaryOp::Not),
            Some(Token::Ident(word)) if word == "not" => Some(UnaryOp::Not),
            Some(Token::Op("-")) => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                Ok(Expr::Unary(op, Box::new(self.parse_unary()?)))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => {
                            self.pos -= 1;
                            return self.error("expected property name after '.'");
                        }
                    };
                    if self.peek() == Some(&Token::LParen) {
                        self.pos += 1;
                        let args = self.parse_args()?;
                        expr = Expr::Call {
                            receiver: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Property(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => {
                    self.pos -= 1;
                    return self.error("expected ',' or ')' in argument list");
                }
            }
        }
    }

    fn parse_primary(&mut self) -> EvalResult<Expr> {
        let Some(token) = self.advance() else {
            return self.error("unexpected end of expression");
        };
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(word) => Ok(match word.as_str() {
                "null" => Expr::Literal(Value::Null),
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                _ => Expr::Variable(word),
            }),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => {
                self.pos -= 1;
                self.error(format!("unexpected {}", describe(&other)))
            }
        }
    }
}
