//! Recursive-descent parser producing the small statement/expression AST.
//!
//! Calls are restricted to the shim surface shapes: `name(args)` and
//! `namespace.name(args)`. Arbitrary attribute access is not part of the
//! language.

use crate::lexer::{tokenize, Spanned, Token};
use crate::value::Value;
use crate::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Assign { name: String, expr: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Name(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        namespace: Option<String>,
        function: String,
        args: Vec<Expr>,
        line: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, cursor: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&Token::Separator) {}
            if self.at_end() {
                return Ok(statements);
            }
            statements.push(self.statement()?);
            if !self.at_end() && !self.eat(&Token::Separator) {
                return Err(self.unexpected("statement separator"));
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if let Some(Token::Ident(name)) = self.peek_token() {
            if self.peek_next_token() == Some(&Token::Assign) {
                let name = name.clone();
                self.cursor += 2;
                let expr = self.expression()?;
                return Ok(Stmt::Assign { name, expr });
            }
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let line = self.current_line();
        let Some(spanned) = self.tokens.get(self.cursor).cloned() else {
            return Err(self.unexpected("expression"));
        };
        self.cursor += 1;
        match spanned.token {
            Token::Int(value) => Ok(Expr::Literal(Value::Int(value))),
            Token::Float(value) => Ok(Expr::Literal(Value::Float(value))),
            Token::Str(value) => Ok(Expr::Literal(Value::Str(value))),
            Token::LParen => {
                let inner = self.expression()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.unexpected("')'"));
                }
                Ok(inner)
            }
            Token::Ident(ident) => self.ident_tail(ident, line),
            _ => Err(ScriptError::Syntax {
                line,
                message: format!("unexpected token {:?}", spanned.token),
            }),
        }
    }

    fn ident_tail(&mut self, ident: String, line: usize) -> Result<Expr, ScriptError> {
        match ident.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }
        if self.eat(&Token::Dot) {
            let Some(Token::Ident(function)) = self.peek_token().cloned() else {
                return Err(self.unexpected("method name"));
            };
            self.cursor += 1;
            let args = self.call_args()?;
            return Ok(Expr::Call {
                namespace: Some(ident),
                function,
                args,
                line,
            });
        }
        if self.peek_token() == Some(&Token::LParen) {
            let args = self.call_args()?;
            return Ok(Expr::Call {
                namespace: None,
                function: ident,
                args,
                line,
            });
        }
        Ok(Expr::Name(ident))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ScriptError> {
        if !self.eat(&Token::LParen) {
            return Err(self.unexpected("'('"));
        }
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err(self.unexpected("',' or ')'"));
            }
        }
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|spanned| &spanned.token)
    }

    fn peek_next_token(&self) -> Option<&Token> {
        self.tokens
            .get(self.cursor + 1)
            .map(|spanned| &spanned.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .or_else(|| self.tokens.last())
            .map(|spanned| spanned.line)
            .unwrap_or(1)
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.current_line(),
            message: match self.peek_token() {
                Some(token) => format!("expected {expected}, found {token:?}"),
                None => format!("expected {expected}, found end of script"),
            },
        }
    }
}
