//! Tokens of the filter / orderby / select expression language.
//!
//! Keywords are matched ignoring ASCII case, so a field cannot be named `and`,
//! `desc`, `null` and so on.

use std::ops::Range;

use bigdecimal::BigDecimal;
use logos::Logos;

use crate::Error;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Logical operators
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("not", ignore(ascii_case))]
    Not,

    // Comparison operators
    #[token("eq", ignore(ascii_case))]
    Eq,
    #[token("ne", ignore(ascii_case))]
    Ne,
    #[token("gt", ignore(ascii_case))]
    Gt,
    #[token("ge", ignore(ascii_case))]
    Ge,
    #[token("lt", ignore(ascii_case))]
    Lt,
    #[token("le", ignore(ascii_case))]
    Le,
    #[token("in", ignore(ascii_case))]
    In,

    // Sort direction
    #[token("asc", ignore(ascii_case))]
    Asc,
    #[token("desc", ignore(ascii_case))]
    Desc,

    // Literals
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("null", ignore(ascii_case))]
    Null,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Single-quoted; a quote inside the literal is doubled.
    #[regex(r"'([^']|'')*'", |lex| unquote(lex.slice()))]
    String(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<BigDecimal>().ok())]
    Number(BigDecimal),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
}

fn unquote(raw: &str) -> String {
    raw[1..raw.len() - 1].replace("''", "'")
}

/// Quote a string literal so that [`Token::String`] reads it back unchanged.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
}

/// Tokenize the whole source; the first unrecognised character is an error.
pub fn tokenize(source: &str, what: &'static str) -> Result<Vec<SpannedToken>, Error> {
    let mut lexer = Token::lexer(source);
    let mut out = Vec::new();
    while let Some(next) = lexer.next() {
        match next {
            Ok(token) => out.push(SpannedToken {
                token,
                span: lexer.span(),
            }),
            Err(()) => {
                return Err(Error::parse(
                    what,
                    lexer.span().start,
                    format!("unexpected input '{}'", lexer.slice()),
                ))
            }
        }
    }
    Ok(out)
}
