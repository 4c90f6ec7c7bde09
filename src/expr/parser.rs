use serde_json::Value;

use crate::error::{Result, SqlMapperError};

use super::lexer::{lex, Token};

/// A parsed boolean/property expression, compiled once per statement and
/// evaluated per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<PathSeg>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Name(String),
    Position(usize),
    Key(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// Parse `source` into an expression tree.
    pub fn parse(source: &str) -> Result<Expr> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            source,
        };
        let expr = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(SqlMapperError::Expression(format!(
                "trailing input in expression '{source}'"
            )));
        }
        Ok(expr)
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        match self.bump() {
            Some(ref t) if t == token => Ok(()),
            other => Err(SqlMapperError::Expression(format!(
                "expected {token:?}, found {other:?} in '{}'",
                self.source
            ))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.bump();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.bump();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.bump();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.operand()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn operand(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.path(name),
            other => Err(SqlMapperError::Expression(format!(
                "unexpected token {other:?} in '{}'",
                self.source
            ))),
        }
    }

    fn path(&mut self, first: String) -> Result<Expr> {
        let mut segments = vec![PathSeg::Name(first)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.bump();
                    match self.bump() {
                        Some(Token::Ident(name)) => segments.push(PathSeg::Name(name)),
                        other => {
                            return Err(SqlMapperError::Expression(format!(
                                "expected property name after '.', found {other:?} in '{}'",
                                self.source
                            )))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.bump();
                    let seg = match self.bump() {
                        Some(Token::Int(n)) if n >= 0 => PathSeg::Position(n as usize),
                        Some(Token::Int(n)) => {
                            return Err(SqlMapperError::Expression(format!(
                                "negative index {n} in '{}'",
                                self.source
                            )))
                        }
                        Some(Token::Str(key)) | Some(Token::Ident(key)) => PathSeg::Key(key),
                        other => {
                            return Err(SqlMapperError::Expression(format!(
                                "unsupported index {other:?} in '{}'",
                                self.source
                            )))
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    segments.push(seg);
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_precedence() {
        // not binds tighter than and, and tighter than or.
        let e = Expr::parse("not a and b or c").unwrap();
        match e {
            Expr::Or(left, _) => match *left {
                Expr::And(l2, _) => assert!(matches!(*l2, Expr::Not(_))),
                other => panic!("expected And, got {other:?}"),
            },
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parses_paths_with_indexes() {
        let e = Expr::parse("items[0].name == 'x'").unwrap();
        match e {
            Expr::Cmp(CmpOp::Eq, l, r) => {
                assert_eq!(
                    *l,
                    Expr::Path(vec![
                        PathSeg::Name("items".into()),
                        PathSeg::Position(0),
                        PathSeg::Name("name".into()),
                    ])
                );
                assert_eq!(*r, Expr::Literal(json!("x")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Expr::parse("a ==").is_err());
        assert!(Expr::parse("a b").is_err());
    }
}
