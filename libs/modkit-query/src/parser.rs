//! Recursive descent parsers for the `filter`, `orderBy` and `select` strings
//! of a [`QueryRequest`](crate::QueryRequest).
//!
//! ```text
//! filter  := or
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" filter ")"
//!          | func "(" ident ["," string] ")"
//!          | ident cmp literal
//!          | ident "in" "(" [literal ("," literal)*] ")"
//! orderby := key ("," key)*       key := ["+"|"-"] ident ["asc"|"desc"]
//! select  := ident ("," ident)*
//! ```

use crate::ast::{CompareOperator, Expr, TextFunction, Value};
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::{Error, OrderBy, OrderKey, SortDir};

/// Deepest `not` / parenthesis nesting a filter may use.
pub const MAX_NESTING: usize = 128;

/// Parse a filter expression.
pub fn parse_filter(source: &str) -> Result<Expr, Error> {
    let mut p = Parser::new(source, "filter")?;
    let expr = p.parse_or()?;
    p.expect_end()?;
    Ok(expr)
}

/// Parse an ordering chain such as `Name desc, Id` or `-Name,+Id`.
pub fn parse_order_by(source: &str) -> Result<OrderBy, Error> {
    let mut p = Parser::new(source, "orderBy")?;
    let mut keys = Vec::new();
    loop {
        let signed = match p.peek() {
            Some(Token::Plus) => {
                p.bump();
                Some(SortDir::Asc)
            }
            Some(Token::Minus) => {
                p.bump();
                Some(SortDir::Desc)
            }
            _ => None,
        };
        let field = p.expect_ident()?;
        let dir = match (signed, p.peek()) {
            (None, Some(Token::Asc)) => {
                p.bump();
                SortDir::Asc
            }
            (None, Some(Token::Desc)) => {
                p.bump();
                SortDir::Desc
            }
            (Some(dir), _) => dir,
            (None, _) => SortDir::Asc,
        };
        keys.push(OrderKey { field, dir });
        if !p.eat(&Token::Comma) {
            break;
        }
    }
    p.expect_end()?;
    Ok(OrderBy(keys))
}

/// Parse a projection list such as `Id, Name`. Blank entries are skipped.
pub fn parse_select(source: &str) -> Result<Vec<String>, Error> {
    let mut p = Parser::new(source, "select")?;
    let mut fields = Vec::new();
    while !p.at_end() {
        if p.eat(&Token::Comma) {
            continue;
        }
        fields.push(p.expect_ident()?);
        if !p.at_end() {
            p.expect(&Token::Comma)?;
        }
    }
    Ok(fields)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    len: usize,
    depth: usize,
    what: &'static str,
}

impl Parser {
    fn new(source: &str, what: &'static str) -> Result<Self, Error> {
        Ok(Self {
            tokens: tokenize(source, what)?,
            pos: 0,
            len: source.len(),
            depth: 0,
            what,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.len)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn bump(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(self.what, self.offset(), message)
    }

    fn expect(&mut self, token: &Token) -> Result<(), Error> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {}", self.describe())))
        }
    }

    fn expect_end(&self) -> Result<(), Error> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {}", self.describe())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, Error> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected field name, found {}", self.describe()))),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            Some(tok) => format!("{tok:?}"),
            None => "end of input".to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut parts = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(Expr::any(parts))
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            parts.push(self.parse_unary()?);
        }
        Ok(Expr::all(parts))
    }

    fn descend(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        if self.peek() == Some(&Token::Not) {
            self.descend()?;
            self.pos += 1;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        if self.peek() == Some(&Token::LParen) {
            self.descend()?;
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            self.depth -= 1;
            return Ok(inner);
        }

        let name = self.expect_ident()?;
        if self.peek() == Some(&Token::LParen) {
            return self.parse_function(name);
        }

        let op = match self.peek() {
            Some(Token::Eq) => CompareOperator::Eq,
            Some(Token::Ne) => CompareOperator::Ne,
            Some(Token::Gt) => CompareOperator::Gt,
            Some(Token::Ge) => CompareOperator::Ge,
            Some(Token::Lt) => CompareOperator::Lt,
            Some(Token::Le) => CompareOperator::Le,
            Some(Token::In) => {
                self.pos += 1;
                return self.parse_in_list(name);
            }
            _ => {
                return Err(self.error(format!(
                    "expected comparison operator after '{name}', found {}",
                    self.describe()
                )))
            }
        };
        self.pos += 1;
        let value = self.parse_literal()?;
        Ok(Expr::Compare {
            field: name,
            op,
            value,
        })
    }

    fn parse_in_list(&mut self, field: String) -> Result<Expr, Error> {
        self.expect(&Token::LParen)?;
        let mut values = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                values.push(self.parse_literal()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        Ok(Expr::In { field, values })
    }

    fn parse_function(&mut self, name: String) -> Result<Expr, Error> {
        let lowered = name.to_ascii_lowercase();
        let func = match lowered.as_str() {
            "contains" => Some(TextFunction::Contains),
            "startswith" => Some(TextFunction::StartsWith),
            "endswith" => Some(TextFunction::EndsWith),
            "isempty" => None,
            _ => return Err(self.error(format!("unknown function '{name}'"))),
        };
        self.expect(&Token::LParen)?;
        let field = self.expect_ident()?;

        let Some(func) = func else {
            self.expect(&Token::RParen)?;
            return Ok(Expr::IsEmpty { field });
        };

        self.expect(&Token::Comma)?;
        let value = match self.peek() {
            Some(Token::String(s)) => s.clone(),
            _ => return Err(self.error(format!("{lowered}() expects a string literal"))),
        };
        self.pos += 1;
        self.expect(&Token::RParen)?;
        Ok(Expr::Text { func, field, value })
    }

    fn parse_literal(&mut self) -> Result<Value, Error> {
        let value = match self.peek() {
            Some(Token::Null) => Value::Null,
            Some(Token::True) => Value::Bool(true),
            Some(Token::False) => Value::Bool(false),
            Some(Token::Number(n)) => Value::Number(n.clone()),
            Some(Token::String(s)) => Value::String(s.clone()),
            _ => return Err(self.error(format!("expected literal, found {}", self.describe()))),
        };
        self.pos += 1;
        Ok(value)
    }
}
