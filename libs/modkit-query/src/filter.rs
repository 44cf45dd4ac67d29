//! Structured filter input, as a grid or form submits it.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::ast::{CompareOperator, Expr, TextFunction, Value};
use crate::{Error, OrderBy, Query, SortDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    In,
}

impl FilterOp {
    pub const ALL: [FilterOp; 14] = [
        FilterOp::Equals,
        FilterOp::NotEquals,
        FilterOp::Contains,
        FilterOp::StartsWith,
        FilterOp::EndsWith,
        FilterOp::GreaterThan,
        FilterOp::GreaterThanOrEqual,
        FilterOp::LessThan,
        FilterOp::LessThanOrEqual,
        FilterOp::IsNull,
        FilterOp::IsNotNull,
        FilterOp::IsEmpty,
        FilterOp::IsNotEmpty,
        FilterOp::In,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Equals => "Equals",
            FilterOp::NotEquals => "NotEquals",
            FilterOp::Contains => "Contains",
            FilterOp::StartsWith => "StartsWith",
            FilterOp::EndsWith => "EndsWith",
            FilterOp::GreaterThan => "GreaterThan",
            FilterOp::GreaterThanOrEqual => "GreaterThanOrEqual",
            FilterOp::LessThan => "LessThan",
            FilterOp::LessThanOrEqual => "LessThanOrEqual",
            FilterOp::IsNull => "IsNull",
            FilterOp::IsNotNull => "IsNotNull",
            FilterOp::IsEmpty => "IsEmpty",
            FilterOp::IsNotEmpty => "IsNotEmpty",
            FilterOp::In => "In",
        }
    }

    /// Operators that ignore the literal value.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            FilterOp::IsNull | FilterOp::IsNotNull | FilterOp::IsEmpty | FilterOp::IsNotEmpty
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    /// Accepts the PascalCase names in any case, with or without `_`, `-` or
    /// spaces, plus the short forms of the expression language and symbols.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim() {
            "=" | "==" => FilterOp::Equals,
            "!=" | "<>" => FilterOp::NotEquals,
            ">" => FilterOp::GreaterThan,
            ">=" => FilterOp::GreaterThanOrEqual,
            "<" => FilterOp::LessThan,
            "<=" => FilterOp::LessThanOrEqual,
            other => {
                let norm: String = other
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                match norm.as_str() {
                    "eq" | "equals" | "equal" => FilterOp::Equals,
                    "ne" | "neq" | "notequals" | "notequal" => FilterOp::NotEquals,
                    "contains" => FilterOp::Contains,
                    "startswith" => FilterOp::StartsWith,
                    "endswith" => FilterOp::EndsWith,
                    "gt" | "greaterthan" => FilterOp::GreaterThan,
                    "ge" | "gte" | "greaterthanorequal" | "greaterthanorequalto" => {
                        FilterOp::GreaterThanOrEqual
                    }
                    "lt" | "lessthan" => FilterOp::LessThan,
                    "le" | "lte" | "lessthanorequal" | "lessthanorequalto" => {
                        FilterOp::LessThanOrEqual
                    }
                    "isnull" | "null" => FilterOp::IsNull,
                    "isnotnull" | "notnull" => FilterOp::IsNotNull,
                    "isempty" | "empty" => FilterOp::IsEmpty,
                    "isnotempty" | "notempty" => FilterOp::IsNotEmpty,
                    "in" => FilterOp::In,
                    _ => return Err(Error::UnknownOperator(s.to_string())),
                }
            }
        };
        Ok(op)
    }
}

impl TryFrom<String> for FilterOp {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FilterOp> for String {
    fn from(op: FilterOp) -> Self {
        op.as_str().to_string()
    }
}

/// One `{field, operator, value}` filter row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDescriptor {
    pub field: String,
    pub operator: FilterOp,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterDescriptor {
    pub fn new(field: impl Into<String>, operator: FilterOp, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn to_expr(&self) -> Result<Expr, Error> {
        let field = || self.field.clone();
        let cmp = |op| -> Result<Expr, Error> {
            Ok(Expr::Compare {
                field: field(),
                op,
                value: self.literal()?,
            })
        };
        let ordered = |op| -> Result<Expr, Error> {
            if self.value.is_null() {
                return Err(self.missing());
            }
            cmp(op)
        };
        let text = |func| -> Result<Expr, Error> {
            Ok(Expr::Text {
                func,
                field: field(),
                value: self.text()?,
            })
        };

        match self.operator {
            FilterOp::Equals => cmp(CompareOperator::Eq),
            FilterOp::NotEquals => cmp(CompareOperator::Ne),
            FilterOp::GreaterThan => ordered(CompareOperator::Gt),
            FilterOp::GreaterThanOrEqual => ordered(CompareOperator::Ge),
            FilterOp::LessThan => ordered(CompareOperator::Lt),
            FilterOp::LessThanOrEqual => ordered(CompareOperator::Le),
            FilterOp::Contains => text(TextFunction::Contains),
            FilterOp::StartsWith => text(TextFunction::StartsWith),
            FilterOp::EndsWith => text(TextFunction::EndsWith),
            FilterOp::IsNull => Ok(Expr::compare(field(), CompareOperator::Eq, Value::Null)),
            FilterOp::IsNotNull => Ok(Expr::compare(field(), CompareOperator::Ne, Value::Null)),
            FilterOp::IsEmpty => Ok(Expr::IsEmpty { field: field() }),
            FilterOp::IsNotEmpty => Ok(Expr::IsEmpty { field: field() }.not()),
            FilterOp::In => {
                let values = match &self.value {
                    serde_json::Value::Null => return Err(self.missing()),
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|v| json_literal(&self.field, v))
                        .collect::<Result<Vec<_>, _>>()?,
                    scalar => vec![json_literal(&self.field, scalar)?],
                };
                Ok(Expr::In {
                    field: field(),
                    values,
                })
            }
        }
    }

    fn literal(&self) -> Result<Value, Error> {
        json_literal(&self.field, &self.value)
    }

    fn text(&self) -> Result<String, Error> {
        match &self.value {
            serde_json::Value::Null => Err(self.missing()),
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(Error::InvalidLiteral {
                field: self.field.clone(),
                message: "expected a string".into(),
            }),
        }
    }

    fn missing(&self) -> Error {
        Error::MissingValue {
            field: self.field.clone(),
            operator: self.operator.to_string(),
        }
    }
}

fn json_literal(field: &str, v: &serde_json::Value) -> Result<Value, Error> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            n.to_string()
                .parse::<BigDecimal>()
                .map(Value::Number)
                .map_err(|e| Error::InvalidLiteral {
                    field: field.to_string(),
                    message: e.to_string(),
                })
        }
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        _ => Err(Error::InvalidLiteral {
            field: field.to_string(),
            message: "arrays and objects are not filter literals".into(),
        }),
    }
}

/// Free-text search over an allow-list of string fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTerm {
    pub term: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SearchTerm {
    pub fn new<I, S>(term: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            term: term.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// `contains(f, term)` OR-ed over the fields; `None` for a blank term.
    pub fn to_expr(&self) -> Option<Expr> {
        let term = self.term.trim();
        if term.is_empty() {
            return None;
        }
        Expr::disjunction(self.fields.iter().map(|f| Expr::Text {
            func: TextFunction::Contains,
            field: f.clone(),
            value: term.to_string(),
        }))
    }
}

/// Everything a list view submits: filter rows, sorts, search box, window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterInput {
    pub filters: Vec<FilterDescriptor>,
    pub sorts: Vec<SortDescriptor>,
    pub search: Option<SearchTerm>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl FilterInput {
    pub fn filter(mut self, f: FilterDescriptor) -> Self {
        self.filters.push(f);
        self
    }

    pub fn sort(mut self, s: SortDescriptor) -> Self {
        self.sorts.push(s);
        self
    }

    pub fn search(mut self, s: SearchTerm) -> Self {
        self.search = Some(s);
        self
    }

    pub fn window(mut self, skip: Option<u64>, take: Option<u64>) -> Self {
        self.skip = skip;
        self.take = take;
        self
    }

    /// All filter rows and the search term AND-ed together.
    pub fn to_expr(&self) -> Result<Option<Expr>, Error> {
        let mut parts = self
            .filters
            .iter()
            .map(FilterDescriptor::to_expr)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(search) = self.search.as_ref().and_then(SearchTerm::to_expr) {
            parts.push(search);
        }
        Ok(Expr::conjunction(parts))
    }

    pub fn into_query(self) -> Result<Query, Error> {
        Ok(Query {
            include: Vec::new(),
            filter: self.to_expr()?,
            order: OrderBy::from_sorts(&self.sorts),
            select: None,
            skip: self.skip,
            take: self.take,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operator_names_are_forgiving() {
        for (raw, op) in [
            ("Equals", FilterOp::Equals),
            ("equals", FilterOp::Equals),
            ("eq", FilterOp::Equals),
            ("==", FilterOp::Equals),
            ("not_equals", FilterOp::NotEquals),
            ("Starts With", FilterOp::StartsWith),
            ("greater-than-or-equal", FilterOp::GreaterThanOrEqual),
            ("<=", FilterOp::LessThanOrEqual),
            ("IS_NOT_EMPTY", FilterOp::IsNotEmpty),
            ("in", FilterOp::In),
        ] {
            assert_eq!(raw.parse::<FilterOp>().unwrap(), op, "{raw}");
        }
        assert!(matches!(
            "between".parse::<FilterOp>(),
            Err(Error::UnknownOperator(_))
        ));
    }

    #[test]
    fn every_operator_displays_and_parses_back() {
        for op in FilterOp::ALL {
            assert_eq!(op.to_string().parse::<FilterOp>().unwrap(), op);
        }
    }

    #[test]
    fn descriptor_deserializes_from_wire() {
        let f: FilterDescriptor =
            serde_json::from_value(json!({"field": "Name", "operator": "contains", "value": "ana"}))
                .unwrap();
        assert_eq!(f.operator, FilterOp::Contains);
        assert_eq!(
            serde_json::to_value(&f).unwrap(),
            json!({"field": "Name", "operator": "Contains", "value": "ana"})
        );
    }

    #[test]
    fn unary_operators_ignore_value() {
        let f = FilterDescriptor::new("Bio", FilterOp::IsNotEmpty, json!("ignored"));
        assert_eq!(
            f.to_expr().unwrap(),
            Expr::Not(Box::new(Expr::IsEmpty { field: "Bio".into() }))
        );
        let f = FilterDescriptor::new("Bio", FilterOp::IsNull, json!(null));
        assert_eq!(
            f.to_expr().unwrap(),
            Expr::compare("Bio", CompareOperator::Eq, Value::Null)
        );
    }

    #[test]
    fn ordered_comparison_needs_value() {
        let f = FilterDescriptor::new("Stock", FilterOp::GreaterThan, json!(null));
        assert!(matches!(f.to_expr(), Err(Error::MissingValue { .. })));
    }

    #[test]
    fn in_accepts_array_or_scalar() {
        let f = FilterDescriptor::new("Id", FilterOp::In, json!([1, 2]));
        assert_eq!(
            f.to_expr().unwrap(),
            Expr::In {
                field: "Id".into(),
                values: vec![Value::from(1), Value::from(2)],
            }
        );
        let f = FilterDescriptor::new("Id", FilterOp::In, json!(3));
        assert!(matches!(f.to_expr().unwrap(), Expr::In { values, .. } if values.len() == 1));
    }

    #[test]
    fn blank_search_is_ignored() {
        assert!(SearchTerm::new("   ", ["Name"]).to_expr().is_none());
        assert!(SearchTerm::new("ana", Vec::<String>::new()).to_expr().is_none());
        let e = SearchTerm::new(" ana ", ["Name", "Bio"]).to_expr().unwrap();
        assert!(matches!(e, Expr::Or(parts) if parts.len() == 2));
    }

    #[test]
    fn filter_input_combines_with_and() {
        let q = FilterInput::default()
            .filter(FilterDescriptor::new("Name", FilterOp::Contains, json!("ana")))
            .filter(FilterDescriptor::new("Stock", FilterOp::GreaterThan, json!(2)))
            .search(SearchTerm::new("x", ["Bio"]))
            .sort(SortDescriptor::new("Name", crate::SortDir::Desc))
            .window(Some(10), Some(5))
            .into_query()
            .unwrap();
        assert!(matches!(q.filter, Some(Expr::And(ref parts)) if parts.len() == 3));
        assert_eq!(q.order.to_string(), "Name desc");
        assert_eq!((q.skip, q.take), (Some(10), Some(5)));
    }
}
