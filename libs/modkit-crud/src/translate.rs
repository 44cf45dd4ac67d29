//! Filter / sort translation: request vocabulary in, backend-neutral
//! [`Predicate`] and [`OrderTerm`]s out.
//!
//! Field names are resolved case-insensitively against a [`TableSchema`] and
//! literals are coerced into the column kind here, so backends only ever see
//! canonical column names and well-typed values.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use modkit_query::ast::{CompareOperator, Expr, TextFunction, Value};
use modkit_query::{FilterDescriptor, OrderBy, SearchTerm, SortDescriptor, SortDir};

use crate::error::QueryError;
use crate::model::{ColumnDef, TableSchema};
use crate::value::{FieldKind, FieldValue, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl From<CompareOperator> for CmpOp {
    fn from(op: CompareOperator) -> Self {
        match op {
            CompareOperator::Eq => CmpOp::Eq,
            CompareOperator::Ne => CmpOp::Ne,
            CompareOperator::Gt => CmpOp::Gt,
            CompareOperator::Ge => CmpOp::Ge,
            CompareOperator::Lt => CmpOp::Lt,
            CompareOperator::Le => CmpOp::Le,
        }
    }
}

/// Position of the needle in a case-insensitive `LIKE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeKind {
    Contains,
    StartsWith,
    EndsWith,
}

impl From<TextFunction> for LikeKind {
    fn from(f: TextFunction) -> Self {
        match f {
            TextFunction::Contains => LikeKind::Contains,
            TextFunction::StartsWith => LikeKind::StartsWith,
            TextFunction::EndsWith => LikeKind::EndsWith,
        }
    }
}

/// Translated filter over canonical column names.
///
/// Evaluation follows SQL three-valued logic: a comparison against a null
/// column is unknown, and unknown never matches, not even under `Not`.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Cmp {
        column: String,
        op: CmpOp,
        value: FieldValue,
    },
    IsNull(String),
    IsNotNull(String),
    In {
        column: String,
        values: Vec<FieldValue>,
    },
    /// `lower(column)` matched against the lower-cased `needle`.
    Like {
        column: String,
        kind: LikeKind,
        needle: String,
    },
    /// Null, or `''` for string columns.
    Empty { column: String, text: bool },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Predicate::Cmp {
            column: column.into(),
            op: CmpOp::Eq,
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::All(mut parts) => {
                parts.push(other);
                Predicate::All(parts)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.eval(row) == Some(true)
    }

    /// `None` is SQL's unknown.
    pub fn eval(&self, row: &Row) -> Option<bool> {
        let col = |name: &str| row.get(name).unwrap_or(&FieldValue::Null);
        match self {
            Predicate::All(parts) => {
                let mut unknown = false;
                for p in parts {
                    match p.eval(row) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Predicate::Any(parts) => {
                let mut unknown = false;
                for p in parts {
                    match p.eval(row) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Predicate::Not(inner) => inner.eval(row).map(|b| !b),
            Predicate::Cmp { column, op, value } => {
                let ord = col(column).compare(value)?;
                Some(match op {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                })
            }
            Predicate::IsNull(column) => Some(col(column).is_null()),
            Predicate::IsNotNull(column) => Some(!col(column).is_null()),
            Predicate::In { column, values } => {
                let v = col(column);
                if v.is_null() {
                    return None;
                }
                Some(values.iter().any(|x| v.same_as(x)))
            }
            Predicate::Like {
                column,
                kind,
                needle,
            } => {
                let hay = col(column).as_str()?.to_lowercase();
                Some(match kind {
                    LikeKind::Contains => hay.contains(needle.as_str()),
                    LikeKind::StartsWith => hay.starts_with(needle.as_str()),
                    LikeKind::EndsWith => hay.ends_with(needle.as_str()),
                })
            }
            Predicate::Empty { column, text } => {
                let v = col(column);
                Some(v.is_null() || (*text && v.as_str() == Some("")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub dir: SortDir,
}

fn resolve<'s>(schema: &'s TableSchema, field: &str) -> Result<&'s ColumnDef, QueryError> {
    schema
        .column(field)
        .ok_or_else(|| QueryError::UnknownField(field.to_string()))
}

fn text_column<'s>(schema: &'s TableSchema, field: &str) -> Result<&'s ColumnDef, QueryError> {
    let c = resolve(schema, field)?;
    if c.kind != FieldKind::String {
        return Err(QueryError::TypeMismatch {
            field: c.name.clone(),
            expected: FieldKind::String,
            got: "non-string field",
        });
    }
    Ok(c)
}

/// Coerce a filter literal into the column kind.
fn literal(c: &ColumnDef, v: &Value) -> Result<FieldValue, QueryError> {
    let invalid = |message: String| QueryError::InvalidLiteral {
        field: c.name.clone(),
        message,
    };
    if c.kind == FieldKind::Json {
        return Err(QueryError::Unsupported(format!(
            "comparison on JSON field {}",
            c.name
        )));
    }
    if c.kind.is_numeric() {
        let n: BigDecimal = match v {
            Value::Number(n) => n.clone(),
            Value::String(s) => s.trim().parse().map_err(|_| QueryError::NotNumeric {
                field: c.name.clone(),
                value: s.clone(),
            })?,
            Value::Bool(b) => {
                return Err(QueryError::NotNumeric {
                    field: c.name.clone(),
                    value: b.to_string(),
                })
            }
            Value::Null => return Ok(FieldValue::Null),
        };
        return FieldValue::String(n.to_string())
            .coerce(c.kind)
            .map_err(|e| invalid(e.to_string()));
    }
    let raw = match v {
        Value::Null => return Ok(FieldValue::Null),
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => FieldValue::String(n.to_string()),
        Value::String(s) => FieldValue::String(s.clone()),
    };
    raw.coerce(c.kind).map_err(|e| invalid(e.to_string()))
}

/// Translate a parsed filter expression.
pub fn translate_expr(expr: &Expr, schema: &TableSchema) -> Result<Predicate, QueryError> {
    Ok(match expr {
        Expr::And(parts) => Predicate::All(
            parts
                .iter()
                .map(|p| translate_expr(p, schema))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Or(parts) => Predicate::Any(
            parts
                .iter()
                .map(|p| translate_expr(p, schema))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Not(inner) => Predicate::Not(Box::new(translate_expr(inner, schema)?)),
        Expr::Compare { field, op, value } => {
            let c = resolve(schema, field)?;
            let column = c.name.clone();
            if value.is_null() {
                return match op {
                    CompareOperator::Eq => Ok(Predicate::IsNull(column)),
                    CompareOperator::Ne => Ok(Predicate::IsNotNull(column)),
                    _ => Err(QueryError::TypeMismatch {
                        field: column,
                        expected: c.kind,
                        got: "null",
                    }),
                };
            }
            Predicate::Cmp {
                column,
                op: (*op).into(),
                value: literal(c, value)?,
            }
        }
        Expr::In { field, values } => {
            let c = resolve(schema, field)?;
            let values = values
                .iter()
                .map(|v| match literal(c, v)? {
                    FieldValue::Null => Err(QueryError::TypeMismatch {
                        field: c.name.clone(),
                        expected: c.kind,
                        got: "null",
                    }),
                    fv => Ok(fv),
                })
                .collect::<Result<_, _>>()?;
            Predicate::In {
                column: c.name.clone(),
                values,
            }
        }
        Expr::Text { func, field, value } => Predicate::Like {
            column: text_column(schema, field)?.name.clone(),
            kind: (*func).into(),
            needle: value.to_lowercase(),
        },
        Expr::IsEmpty { field } => {
            let c = resolve(schema, field)?;
            Predicate::Empty {
                column: c.name.clone(),
                text: c.kind == FieldKind::String,
            }
        }
    })
}

/// Translate one `{field, operator, value}` row.
pub fn translate_filter(
    filter: &FilterDescriptor,
    schema: &TableSchema,
) -> Result<Predicate, QueryError> {
    translate_expr(&filter.to_expr()?, schema)
}

/// AND of all rows; `None` when there are none.
pub fn translate_filters(
    filters: &[FilterDescriptor],
    schema: &TableSchema,
) -> Result<Option<Predicate>, QueryError> {
    let mut parts = filters
        .iter()
        .map(|f| translate_filter(f, schema))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Predicate::All(parts)),
    })
}

/// Case-insensitive `contains` OR-ed over the allow-listed string fields.
/// A blank term yields `None`.
pub fn translate_search(
    search: &SearchTerm,
    schema: &TableSchema,
) -> Result<Option<Predicate>, QueryError> {
    let term = search.term.trim();
    if term.is_empty() {
        return Ok(None);
    }
    let needle = term.to_lowercase();
    let parts = search
        .fields
        .iter()
        .map(|f| {
            Ok(Predicate::Like {
                column: text_column(schema, f)?.name.clone(),
                kind: LikeKind::Contains,
                needle: needle.clone(),
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;
    Ok((!parts.is_empty()).then_some(Predicate::Any(parts)))
}

pub fn translate_sort(sort: &SortDescriptor, schema: &TableSchema) -> Result<OrderTerm, QueryError> {
    Ok(OrderTerm {
        column: resolve(schema, &sort.field)?.name.clone(),
        dir: sort.direction,
    })
}

/// Keys chain left to right.
pub fn translate_order(order: &OrderBy, schema: &TableSchema) -> Result<Vec<OrderTerm>, QueryError> {
    order
        .keys()
        .iter()
        .map(|k| {
            Ok(OrderTerm {
                column: resolve(schema, &k.field)?.name.clone(),
                dir: k.dir,
            })
        })
        .collect()
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn like_pattern(kind: LikeKind, needle: &str) -> String {
    let escaped = like_escape(needle);
    match kind {
        LikeKind::Contains => format!("%{escaped}%"),
        LikeKind::StartsWith => format!("{escaped}%"),
        LikeKind::EndsWith => format!("%{escaped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDef;
    use modkit_query::{parse_filter, FilterOp};
    use serde_json::json;

    fn schema() -> TableSchema {
        let col = |name: &str, kind| ColumnDef {
            name: name.into(),
            kind,
            nullable: true,
            writable: true,
        };
        TableSchema {
            entity: "Book".into(),
            table: "books".into(),
            primary_key: "Id".into(),
            columns: vec![
                col("Id", FieldKind::I64),
                col("Title", FieldKind::String),
                col("Price", FieldKind::F64),
                col("Published", FieldKind::Date),
                col("InStock", FieldKind::Bool),
            ],
        }
    }

    fn pred(src: &str) -> Result<Predicate, QueryError> {
        translate_expr(&parse_filter(src).unwrap(), &schema())
    }

    #[test]
    fn field_names_resolve_to_canonical_case() {
        assert_eq!(
            pred("title eq 'Dune'").unwrap(),
            Predicate::Cmp {
                column: "Title".into(),
                op: CmpOp::Eq,
                value: FieldValue::from("Dune"),
            }
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert_eq!(
            pred("Author eq 'x'").unwrap_err(),
            QueryError::UnknownField("Author".into())
        );
    }

    #[test]
    fn numeric_literal_must_be_numeric() {
        assert!(matches!(
            pred("Price gt 'cheap'"),
            Err(QueryError::NotNumeric { .. })
        ));
        assert_eq!(
            pred("Price gt '9.5'").unwrap(),
            Predicate::Cmp {
                column: "Price".into(),
                op: CmpOp::Gt,
                value: FieldValue::F64(9.5),
            }
        );
    }

    #[test]
    fn null_literal_becomes_null_check() {
        assert_eq!(pred("Title eq null").unwrap(), Predicate::IsNull("Title".into()));
        assert_eq!(pred("Title ne null").unwrap(), Predicate::IsNotNull("Title".into()));
        assert!(pred("Price gt null").is_err());
    }

    #[test]
    fn text_functions_need_string_fields() {
        assert!(matches!(
            pred("contains(Price,'1')"),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert_eq!(
            pred("contains(Title,'AnA')").unwrap(),
            Predicate::Like {
                column: "Title".into(),
                kind: LikeKind::Contains,
                needle: "ana".into(),
            }
        );
    }

    #[test]
    fn contains_is_case_insensitive() {
        let p = translate_filter(
            &FilterDescriptor::new("Title", FilterOp::Contains, json!("Ana")),
            &schema(),
        )
        .unwrap();
        assert!(p.matches(&Row::new().with("Title", "Ana María")));
        assert!(p.matches(&Row::new().with("Title", "ana maría")));
        assert!(!p.matches(&Row::new().with("Title", "Carlos")));
    }

    #[test]
    fn equality_is_case_sensitive_and_null_safe() {
        let p = pred("Title eq 'Dune'").unwrap();
        assert!(p.matches(&Row::new().with("Title", "Dune")));
        assert!(!p.matches(&Row::new().with("Title", "dune")));

        let ne = pred("Title ne 'Dune'").unwrap();
        assert!(!ne.matches(&Row::new().with("Title", FieldValue::Null)));
        let not_eq = pred("not Title eq 'Dune'").unwrap();
        assert!(!not_eq.matches(&Row::new().with("Title", FieldValue::Null)));
    }

    #[test]
    fn is_empty_depends_on_kind() {
        let text = translate_filter(
            &FilterDescriptor::new("Title", FilterOp::IsEmpty, json!(null)),
            &schema(),
        )
        .unwrap();
        assert!(text.matches(&Row::new().with("Title", "")));
        assert!(text.matches(&Row::new().with("Title", FieldValue::Null)));

        let not_empty = translate_filter(
            &FilterDescriptor::new("Price", FilterOp::IsNotEmpty, json!(null)),
            &schema(),
        )
        .unwrap();
        assert!(not_empty.matches(&Row::new().with("Price", 0.0)));
        assert!(!not_empty.matches(&Row::new().with("Price", FieldValue::Null)));
    }

    #[test]
    fn dates_compare_chronologically() {
        let p = pred("Published ge '2020-01-01'").unwrap();
        let row = |d: &str| {
            Row::new().with(
                "Published",
                FieldValue::from(d).coerce(FieldKind::Date).unwrap(),
            )
        };
        assert!(p.matches(&row("2021-06-30")));
        assert!(!p.matches(&row("2019-12-31")));
    }

    #[test]
    fn filters_combine_with_and() {
        let p = translate_filters(
            &[
                FilterDescriptor::new("Title", FilterOp::StartsWith, json!("d")),
                FilterDescriptor::new("InStock", FilterOp::Equals, json!(true)),
            ],
            &schema(),
        )
        .unwrap()
        .unwrap();
        assert!(p.matches(&Row::new().with("Title", "Dune").with("InStock", true)));
        assert!(!p.matches(&Row::new().with("Title", "Dune").with("InStock", false)));
        assert!(translate_filters(&[], &schema()).unwrap().is_none());
    }

    #[test]
    fn search_rejects_unknown_fields_and_skips_blank_terms() {
        let s = schema();
        assert!(translate_search(&SearchTerm::new("  ", ["Nope"]), &s)
            .unwrap()
            .is_none());
        assert!(translate_search(&SearchTerm::new("x", ["Nope"]), &s).is_err());
        let p = translate_search(&SearchTerm::new("DUNE", ["title"]), &s)
            .unwrap()
            .unwrap();
        assert!(p.matches(&Row::new().with("Title", "Dune Messiah")));
    }

    #[test]
    fn in_list_and_empty_in() {
        let p = pred("Id in (1, 3)").unwrap();
        assert!(p.matches(&Row::new().with("Id", 3_i64)));
        assert!(!p.matches(&Row::new().with("Id", 2_i64)));
        assert!(!pred("Id in ()").unwrap().matches(&Row::new().with("Id", 2_i64)));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(like_pattern(LikeKind::Contains, "50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern(LikeKind::StartsWith, "a"), "a%");
        assert_eq!(like_pattern(LikeKind::EndsWith, "a"), "%a");
    }

    #[test]
    fn sorts_resolve_and_chain() {
        let order = modkit_query::parse_order_by("title desc, Id").unwrap();
        let terms = translate_order(&order, &schema()).unwrap();
        assert_eq!(terms[0].column, "Title");
        assert_eq!(terms[0].dir, SortDir::Desc);
        assert_eq!(terms[1].column, "Id");
        assert!(translate_sort(&SortDescriptor::new("Nope", SortDir::Asc), &schema()).is_err());
    }
}
