//! Storage-agnostic request vocabulary for the dynamic query engine.
//!
//! A request arrives either as a [`QueryRequest`] (wire shape with textual
//! `filter` / `orderBy` / `select`) or as a [`FilterInput`] (structured UI
//! shape). Both end up as a typed [`Query`] whose filter is an [`ast::Expr`].

pub mod ast {
    use bigdecimal::BigDecimal;

    /// Filter expression tree.
    ///
    /// `And` / `Or` are n-ary; build them through [`Expr::all`] and
    /// [`Expr::any`] so nested chains stay flat.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Expr {
        And(Vec<Expr>),
        Or(Vec<Expr>),
        Not(Box<Expr>),
        Compare {
            field: String,
            op: CompareOperator,
            value: Value,
        },
        In {
            field: String,
            values: Vec<Value>,
        },
        Text {
            func: TextFunction,
            field: String,
            value: String,
        },
        IsEmpty {
            field: String,
        },
    }

    impl Expr {
        /// Conjunction of `parts`. A single part is returned as is.
        pub fn all(parts: Vec<Expr>) -> Expr {
            Self::flatten(parts, true)
        }

        /// Disjunction of `parts`. A single part is returned as is.
        pub fn any(parts: Vec<Expr>) -> Expr {
            Self::flatten(parts, false)
        }

        /// Like [`Expr::all`] but `None` for an empty input.
        pub fn conjunction(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
            let parts: Vec<Expr> = parts.into_iter().collect();
            (!parts.is_empty()).then(|| Self::all(parts))
        }

        /// Like [`Expr::any`] but `None` for an empty input.
        pub fn disjunction(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
            let parts: Vec<Expr> = parts.into_iter().collect();
            (!parts.is_empty()).then(|| Self::any(parts))
        }

        pub fn and(self, other: Expr) -> Expr {
            Self::all(vec![self, other])
        }

        pub fn or(self, other: Expr) -> Expr {
            Self::any(vec![self, other])
        }

        #[allow(clippy::should_implement_trait)]
        pub fn not(self) -> Expr {
            Expr::Not(Box::new(self))
        }

        pub fn compare(field: impl Into<String>, op: CompareOperator, value: Value) -> Expr {
            Expr::Compare {
                field: field.into(),
                op,
                value,
            }
        }

        fn flatten(parts: Vec<Expr>, conj: bool) -> Expr {
            let mut out = Vec::with_capacity(parts.len());
            for p in parts {
                match (p, conj) {
                    (Expr::And(inner), true) | (Expr::Or(inner), false) => out.extend(inner),
                    (other, _) => out.push(other),
                }
            }
            if out.len() == 1 {
                return out.remove(0);
            }
            if conj {
                Expr::And(out)
            } else {
                Expr::Or(out)
            }
        }

        /// Every field name referenced by the expression, in order of appearance.
        pub fn fields(&self) -> Vec<&str> {
            let mut acc = Vec::new();
            self.collect_fields(&mut acc);
            acc
        }

        fn collect_fields<'a>(&'a self, acc: &mut Vec<&'a str>) {
            match self {
                Expr::And(parts) | Expr::Or(parts) => {
                    for p in parts {
                        p.collect_fields(acc);
                    }
                }
                Expr::Not(inner) => inner.collect_fields(acc),
                Expr::Compare { field, .. }
                | Expr::In { field, .. }
                | Expr::Text { field, .. }
                | Expr::IsEmpty { field } => acc.push(field),
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CompareOperator {
        Eq,
        Ne,
        Gt,
        Ge,
        Lt,
        Le,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum TextFunction {
        Contains,
        StartsWith,
        EndsWith,
    }

    /// Literal in a filter expression.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Value {
        Null,
        Bool(bool),
        Number(BigDecimal),
        String(String),
    }

    impl Value {
        pub fn is_null(&self) -> bool {
            matches!(self, Value::Null)
        }
    }

    impl From<&str> for Value {
        fn from(s: &str) -> Self {
            Value::String(s.to_string())
        }
    }

    impl From<String> for Value {
        fn from(s: String) -> Self {
            Value::String(s)
        }
    }

    impl From<bool> for Value {
        fn from(b: bool) -> Self {
            Value::Bool(b)
        }
    }

    impl From<i64> for Value {
        fn from(n: i64) -> Self {
            Value::Number(BigDecimal::from(n))
        }
    }
}

pub mod filter;
pub mod lexer;
pub mod order;
pub mod page;
pub mod parser;
pub mod render;
pub mod request;

pub use filter::{FilterDescriptor, FilterInput, FilterOp, SearchTerm};
pub use order::{OrderBy, OrderKey, SortDescriptor, SortDir, SortState};
pub use page::PagedResult;
pub use parser::{parse_filter, parse_order_by, parse_select};
pub use request::{Query, QueryRequest};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid {what} at offset {offset}: {message}")]
    Parse {
        what: &'static str,
        offset: usize,
        message: String,
    },

    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error("operator {operator} on '{field}' requires a value")]
    MissingValue { field: String, operator: String },

    #[error("invalid literal for '{field}': {message}")]
    InvalidLiteral { field: String, message: String },

    #[error("invalid sort direction '{0}'")]
    InvalidSortDirection(String),
}

impl Error {
    pub fn parse(what: &'static str, offset: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            what,
            offset,
            message: message.into(),
        }
    }
}
