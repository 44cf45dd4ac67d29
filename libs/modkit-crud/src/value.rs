//! Tagged field values and untyped rows.
//!
//! Rows travel between the engine and storage as [`Row`]s of [`FieldValue`]s;
//! entities are filled from them through the descriptor's setters, which
//! first [`coerce`](FieldValue::coerce) a value into the declared [`FieldKind`].

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::ValueError;

/// Declared type of an entity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    I64,
    F64,
    Decimal,
    Bool,
    Uuid,
    DateTimeUtc,
    Date,
    Time,
    Json,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::I64 | FieldKind::F64 | FieldKind::Decimal)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(Json),
    /// Rows of an eagerly loaded relation.
    Related(Vec<Row>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// "No value" for reference purposes: null, `0`, nil UUID or `""`.
    pub fn is_default(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::I64(n) => *n == 0,
            FieldValue::Uuid(u) => u.is_nil(),
            FieldValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldValue::I64(_) | FieldValue::F64(_) | FieldValue::Decimal(_)
        )
    }

    pub fn kind(&self) -> Option<FieldKind> {
        Some(match self {
            FieldValue::Null | FieldValue::Related(_) => return None,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::I64(_) => FieldKind::I64,
            FieldValue::F64(_) => FieldKind::F64,
            FieldValue::Decimal(_) => FieldKind::Decimal,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Uuid(_) => FieldKind::Uuid,
            FieldValue::DateTime(_) => FieldKind::DateTimeUtc,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Time(_) => FieldKind::Time,
            FieldValue::Json(_) => FieldKind::Json,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::I64(_) => "integer",
            FieldValue::F64(_) => "float",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::String(_) => "string",
            FieldValue::Uuid(_) => "uuid",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::Json(_) => "json",
            FieldValue::Related(_) => "related rows",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::I64(n) => Some(Decimal::from(*n)),
            FieldValue::F64(f) => Decimal::from_f64(*f),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::I64(n) => Some(*n as f64),
            FieldValue::F64(f) => Some(*f),
            FieldValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Convert into the declared `kind`. Null stays null; strings are parsed,
    /// JSON values are deserialized by the kind they are asked for.
    pub fn coerce(&self, kind: FieldKind) -> Result<FieldValue, ValueError> {
        use FieldValue as V;

        let mismatch = |got: &FieldValue| ValueError::TypeMismatch {
            expected: kind,
            got: got.type_name(),
        };

        Ok(match (kind, self) {
            (_, V::Null) => V::Null,
            (FieldKind::Json, V::Json(j)) => V::Json(j.clone()),
            (_, V::Json(j)) => return json_as(kind, j),
            (_, V::Related(_)) => return Err(mismatch(self)),

            (FieldKind::String, V::String(s)) => V::String(s.clone()),
            (FieldKind::String, other) => V::String(other.to_string()),

            (FieldKind::I64, V::I64(n)) => V::I64(*n),
            (FieldKind::I64, V::F64(f)) => {
                if f.fract() != 0.0 || !f.is_finite() {
                    return Err(ValueError::OutOfRange {
                        kind,
                        value: f.to_string(),
                    });
                }
                V::I64(f.to_i64().ok_or_else(|| ValueError::OutOfRange {
                    kind,
                    value: f.to_string(),
                })?)
            }
            (FieldKind::I64, V::Decimal(d)) => {
                let n = d
                    .fract()
                    .is_zero()
                    .then(|| d.to_i64())
                    .flatten()
                    .ok_or_else(|| ValueError::OutOfRange {
                        kind,
                        value: d.to_string(),
                    })?;
                V::I64(n)
            }
            (FieldKind::I64, V::Bool(b)) => V::I64(i64::from(*b)),
            (FieldKind::I64, V::String(s)) => V::I64(
                s.trim()
                    .parse::<i64>()
                    .map_err(|e| ValueError::parse(kind, s.as_str(), e))?,
            ),

            (FieldKind::F64, V::I64(n)) => V::F64(*n as f64),
            (FieldKind::F64, V::F64(f)) => V::F64(*f),
            (FieldKind::F64, V::Decimal(d)) => {
                V::F64(d.to_f64().ok_or_else(|| ValueError::OutOfRange {
                    kind,
                    value: d.to_string(),
                })?)
            }
            (FieldKind::F64, V::String(s)) => V::F64(
                s.trim()
                    .parse::<f64>()
                    .map_err(|e| ValueError::parse(kind, s.as_str(), e))?,
            ),

            (FieldKind::Decimal, V::I64(n)) => V::Decimal(Decimal::from(*n)),
            (FieldKind::Decimal, V::F64(f)) => {
                V::Decimal(Decimal::from_f64(*f).ok_or_else(|| ValueError::OutOfRange {
                    kind,
                    value: f.to_string(),
                })?)
            }
            (FieldKind::Decimal, V::Decimal(d)) => V::Decimal(*d),
            (FieldKind::Decimal, V::String(s)) => V::Decimal(parse_decimal(s)?),

            (FieldKind::Bool, V::Bool(b)) => V::Bool(*b),
            (FieldKind::Bool, V::I64(0)) => V::Bool(false),
            (FieldKind::Bool, V::I64(1)) => V::Bool(true),
            (FieldKind::Bool, V::String(s)) => V::Bool(parse_bool(s)?),

            (FieldKind::Uuid, V::Uuid(u)) => V::Uuid(*u),
            (FieldKind::Uuid, V::String(s)) => V::Uuid(
                s.trim()
                    .parse::<Uuid>()
                    .map_err(|e| ValueError::parse(kind, s.as_str(), e))?,
            ),

            (FieldKind::DateTimeUtc, V::DateTime(dt)) => V::DateTime(*dt),
            (FieldKind::DateTimeUtc, V::Date(d)) => V::DateTime(d.and_time(NaiveTime::MIN).and_utc()),
            (FieldKind::DateTimeUtc, V::String(s)) => V::DateTime(parse_datetime(s)?),

            (FieldKind::Date, V::Date(d)) => V::Date(*d),
            (FieldKind::Date, V::DateTime(dt)) => V::Date(dt.date_naive()),
            (FieldKind::Date, V::String(s)) => V::Date(
                s.trim()
                    .parse::<NaiveDate>()
                    .or_else(|_| parse_datetime(s).map(|dt| dt.date_naive()))
                    .map_err(|_| ValueError::parse(kind, s.as_str(), "expected YYYY-MM-DD"))?,
            ),

            (FieldKind::Time, V::Time(t)) => V::Time(*t),
            (FieldKind::Time, V::DateTime(dt)) => V::Time(dt.time()),
            (FieldKind::Time, V::String(s)) => V::Time(
                s.trim()
                    .parse::<NaiveTime>()
                    .map_err(|e| ValueError::parse(kind, s.as_str(), e))?,
            ),

            (FieldKind::Json, other) => V::Json(other.to_json()),

            (_, other) => return Err(mismatch(other)),
        })
    }

    /// Ordering between values of compatible kinds; numbers compare across
    /// integer, float and decimal. `None` for null or unrelated kinds.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue as V;
        match (self, other) {
            (V::Null, _) | (_, V::Null) => None,
            (V::I64(a), V::I64(b)) => Some(a.cmp(b)),
            (V::Decimal(a), V::Decimal(b)) => Some(a.cmp(b)),
            (V::String(a), V::String(b)) => Some(a.cmp(b)),
            (V::Bool(a), V::Bool(b)) => Some(a.cmp(b)),
            (V::Uuid(a), V::Uuid(b)) => Some(a.cmp(b)),
            (V::DateTime(a), V::DateTime(b)) => Some(a.cmp(b)),
            (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
            (V::Time(a), V::Time(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
            _ => None,
        }
    }

    /// Equality used by filters and key lookups: numeric kinds compare by
    /// value, JSON structurally.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Json(a), FieldValue::Json(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Untyped conversion from JSON: numbers become `I64` when integral.
    pub fn from_json(j: &Json) -> FieldValue {
        match j {
            Json::Null => FieldValue::Null,
            Json::Bool(b) => FieldValue::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::I64(i),
                None => n.as_f64().map_or(FieldValue::Null, FieldValue::F64),
            },
            Json::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::Json(other.clone()),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Bool(b) => Json::Bool(*b),
            FieldValue::I64(n) => Json::from(*n),
            FieldValue::F64(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            FieldValue::Decimal(d) => Json::String(d.to_string()),
            FieldValue::String(s) => Json::String(s.clone()),
            FieldValue::Uuid(u) => Json::String(u.to_string()),
            FieldValue::DateTime(dt) => Json::String(dt.to_rfc3339()),
            FieldValue::Date(d) => Json::String(d.to_string()),
            FieldValue::Time(t) => Json::String(t.to_string()),
            FieldValue::Json(j) => j.clone(),
            FieldValue::Related(rows) => Json::Array(rows.iter().map(Row::to_json).collect()),
        }
    }
}

fn json_as(kind: FieldKind, j: &Json) -> Result<FieldValue, ValueError> {
    fn typed<T: serde::de::DeserializeOwned>(kind: FieldKind, j: &Json) -> Result<T, ValueError> {
        serde_json::from_value(j.clone()).map_err(|e| ValueError::parse(kind, j.to_string(), e))
    }

    Ok(match (kind, j) {
        (_, Json::Null) => FieldValue::Null,
        (FieldKind::Json, _) => FieldValue::Json(j.clone()),
        (FieldKind::String, Json::String(s)) => FieldValue::String(s.clone()),
        (FieldKind::String, other) => FieldValue::String(other.to_string()),
        // strings take the textual parsing path
        (_, Json::String(s)) => return FieldValue::String(s.clone()).coerce(kind),
        (FieldKind::I64, _) => FieldValue::I64(typed(kind, j)?),
        (FieldKind::F64, _) => FieldValue::F64(typed(kind, j)?),
        (FieldKind::Decimal, _) => FieldValue::Decimal(typed(kind, j)?),
        (FieldKind::Bool, _) => FieldValue::Bool(typed(kind, j)?),
        (FieldKind::Uuid, _) => FieldValue::Uuid(typed(kind, j)?),
        (FieldKind::DateTimeUtc, _) => FieldValue::DateTime(typed(kind, j)?),
        (FieldKind::Date, _) => FieldValue::Date(typed(kind, j)?),
        (FieldKind::Time, _) => FieldValue::Time(typed(kind, j)?),
    })
}

fn parse_decimal(s: &str) -> Result<Decimal, ValueError> {
    let t = s.trim();
    Decimal::from_str_exact(t)
        .or_else(|_| Decimal::from_scientific(t))
        .map_err(|e| ValueError::parse(FieldKind::Decimal, t, e))
}

fn parse_bool(s: &str) -> Result<bool, ValueError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ValueError::parse(FieldKind::Bool, s, "expected true or false")),
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ValueError> {
    let t = s.trim();
    DateTime::parse_from_rfc3339(t)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f").map(|n| n.and_utc()))
        .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()))
        .or_else(|_| {
            NaiveDate::parse_from_str(t, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
        .map_err(|e| ValueError::parse(FieldKind::DateTimeUtc, t, e))
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::I64(n) => write!(f, "{n}"),
            FieldValue::F64(x) => write!(f, "{x}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Uuid(u) => write!(f, "{u}"),
            FieldValue::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Time(t) => write!(f, "{t}"),
            FieldValue::Json(j) => write!(f, "{j}"),
            FieldValue::Related(rows) => write!(f, "[{} rows]", rows.len()),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! field_value_conversions {
    ($($ty:ty => $variant:ident as $kind:ident;)*) => {$(
        impl From<$ty> for FieldValue {
            fn from(v: $ty) -> Self {
                FieldValue::$variant(v)
            }
        }

        impl From<Option<$ty>> for FieldValue {
            fn from(v: Option<$ty>) -> Self {
                v.map_or(FieldValue::Null, FieldValue::$variant)
            }
        }

        impl TryFrom<FieldValue> for $ty {
            type Error = ValueError;

            fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
                match v.coerce(FieldKind::$kind)? {
                    FieldValue::$variant(x) => Ok(x),
                    FieldValue::Null => Err(ValueError::UnexpectedNull(stringify!($ty))),
                    other => Err(ValueError::TypeMismatch {
                        expected: FieldKind::$kind,
                        got: other.type_name(),
                    }),
                }
            }
        }

        impl TryFrom<FieldValue> for Option<$ty> {
            type Error = ValueError;

            fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
                match v {
                    FieldValue::Null => Ok(None),
                    other => <$ty>::try_from(other).map(Some),
                }
            }
        }
    )*};
}

field_value_conversions! {
    bool => Bool as Bool;
    i64 => I64 as I64;
    f64 => F64 as F64;
    Decimal => Decimal as Decimal;
    String => String as String;
    Uuid => Uuid as Uuid;
    DateTime<Utc> => DateTime as DateTimeUtc;
    NaiveDate => Date as Date;
    NaiveTime => Time as Time;
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::I64(i64::from(n))
    }
}

impl From<Option<i32>> for FieldValue {
    fn from(n: Option<i32>) -> Self {
        n.map_or(FieldValue::Null, FieldValue::from)
    }
}

impl TryFrom<FieldValue> for i32 {
    type Error = ValueError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        let n = i64::try_from(v)?;
        i32::try_from(n).map_err(|_| ValueError::OutOfRange {
            kind: FieldKind::I64,
            value: n.to_string(),
        })
    }
}

impl TryFrom<FieldValue> for Option<i32> {
    type Error = ValueError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Null => Ok(None),
            other => i32::try_from(other).map(Some),
        }
    }
}

impl From<Json> for FieldValue {
    fn from(j: Json) -> Self {
        FieldValue::Json(j)
    }
}

impl TryFrom<FieldValue> for Json {
    type Error = ValueError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v.coerce(FieldKind::Json)? {
            FieldValue::Json(j) => Ok(j),
            _ => Ok(Json::Null),
        }
    }
}

/// Column name to value, in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(IndexMap<String, FieldValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self(IndexMap::with_capacity(n))
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Exact name first, then ASCII case-insensitive.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    pub fn get_exact(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy of the listed columns only; missing ones are skipped.
    pub fn project(&self, columns: &[String]) -> Row {
        columns
            .iter()
            .filter_map(|c| self.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    }

    /// Build a row from a JSON object without type hints.
    pub fn from_json(j: &Json) -> Result<Row, ValueError> {
        match j {
            Json::Object(map) => Ok(map
                .iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect()),
            _ => Err(ValueError::NotAnObject),
        }
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, FieldValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_parse_into_declared_kinds() {
        let id = "6f1c1a52-8d0e-4a4c-9d53-2a3c4f7f2b10";
        assert_eq!(
            FieldValue::from(id).coerce(FieldKind::Uuid).unwrap(),
            FieldValue::Uuid(id.parse().unwrap())
        );
        assert_eq!(
            FieldValue::from(" 42 ").coerce(FieldKind::I64).unwrap(),
            FieldValue::I64(42)
        );
        assert_eq!(
            FieldValue::from("TRUE").coerce(FieldKind::Bool).unwrap(),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::from("2024-03-01 10:30:00")
                .coerce(FieldKind::DateTimeUtc)
                .unwrap()
                .to_string(),
            "2024-03-01T10:30:00+00:00"
        );
        assert_eq!(
            FieldValue::from("2024-03-01T10:30:00Z")
                .coerce(FieldKind::Date)
                .unwrap(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(FieldValue::from("abc").coerce(FieldKind::I64).is_err());
    }

    #[test]
    fn json_deserializes_by_kind() {
        assert_eq!(
            FieldValue::Json(json!(12.5)).coerce(FieldKind::Decimal).unwrap(),
            FieldValue::Decimal("12.5".parse().unwrap())
        );
        assert_eq!(
            FieldValue::Json(json!("7")).coerce(FieldKind::I64).unwrap(),
            FieldValue::I64(7)
        );
        assert!(matches!(
            FieldValue::Json(json!({"a": 1})).coerce(FieldKind::I64),
            Err(ValueError::Parse { .. })
        ));
        assert_eq!(
            FieldValue::Json(json!({"a": 1})).coerce(FieldKind::String).unwrap(),
            FieldValue::String(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn integer_coercion_rejects_fractions() {
        assert!(FieldValue::F64(1.5).coerce(FieldKind::I64).is_err());
        assert_eq!(
            FieldValue::F64(3.0).coerce(FieldKind::I64).unwrap(),
            FieldValue::I64(3)
        );
    }

    #[test]
    fn numbers_compare_across_kinds() {
        let d = FieldValue::Decimal("2.50".parse().unwrap());
        assert_eq!(FieldValue::I64(2).compare(&d), Some(Ordering::Less));
        assert!(FieldValue::F64(2.5).same_as(&d));
        assert_eq!(FieldValue::Null.compare(&FieldValue::Null), None);
        assert_eq!(FieldValue::from("a").compare(&FieldValue::I64(1)), None);
    }

    #[test]
    fn default_values() {
        assert!(FieldValue::I64(0).is_default());
        assert!(FieldValue::Uuid(Uuid::nil()).is_default());
        assert!(FieldValue::from("").is_default());
        assert!(!FieldValue::Bool(false).is_default());
        assert!(!FieldValue::I64(7).is_default());
    }

    #[test]
    fn typed_conversions() {
        let n: i64 = FieldValue::from("5").try_into().unwrap();
        assert_eq!(n, 5);
        let o: Option<String> = FieldValue::Null.try_into().unwrap();
        assert_eq!(o, None);
        let r: Result<String, _> = FieldValue::Null.try_into();
        assert!(matches!(r, Err(ValueError::UnexpectedNull(_))));
        assert_eq!(FieldValue::from(Some(3_i32)), FieldValue::I64(3));
    }

    #[test]
    fn row_lookup_falls_back_to_case_insensitive() {
        let row = Row::new().with("name", "exact").with("Title", "t");
        assert_eq!(row.get("name"), Some(&FieldValue::from("exact")));
        assert_eq!(row.get("TITLE"), Some(&FieldValue::from("t")));
        assert_eq!(row.get_exact("TITLE"), None);

        let both = Row::new().with("Name", "upper").with("name", "lower");
        assert_eq!(both.get("name"), Some(&FieldValue::from("lower")));
    }

    #[test]
    fn row_from_json_object() {
        let row = Row::from_json(&json!({"Id": 3, "Price": 9.5, "Tags": ["a"]})).unwrap();
        assert_eq!(row.get("Id"), Some(&FieldValue::I64(3)));
        assert_eq!(row.get("Price"), Some(&FieldValue::F64(9.5)));
        assert!(matches!(row.get("Tags"), Some(FieldValue::Json(_))));
        assert!(matches!(
            Row::from_json(&json!([1])),
            Err(ValueError::NotAnObject)
        ));
        assert_eq!(row.to_json()["Price"], json!(9.5));
    }
}
