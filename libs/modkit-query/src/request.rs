use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::{parse_filter, parse_order_by, parse_select, Error, OrderBy, OrderKey};

/// Wire shape of a query.
///
/// ```json
/// { "include": ["Books"], "filter": "Name eq 'Ana'", "orderBy": "Name desc",
///   "select": "Id, Name", "skip": 0, "take": 20 }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub include: Vec<String>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub select: Option<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl QueryRequest {
    pub fn parse(&self) -> Result<Query, Error> {
        Query::try_from(self)
    }
}

/// Parsed query. `take == None` is unbounded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub include: Vec<String>,
    pub filter: Option<Expr>,
    pub order: OrderBy,
    pub select: Option<Vec<String>>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, name: impl Into<String>) -> Self {
        self.include.push(name.into());
        self
    }

    /// AND-s `expr` onto the current filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(prev) => prev.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.0.push(key);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    /// 1-based page number of the window; 1 when there is no usable `take`.
    pub fn page(&self) -> u64 {
        match (self.skip, self.take) {
            (skip, Some(take)) if take > 0 => skip.unwrap_or(0) / take + 1,
            _ => 1,
        }
    }

    /// Render back to the wire shape.
    pub fn to_request(&self) -> QueryRequest {
        QueryRequest {
            include: self.include.clone(),
            filter: self.filter.as_ref().map(ToString::to_string),
            order_by: (!self.order.is_empty()).then(|| self.order.to_string()),
            select: self.select.as_ref().map(|s| s.join(", ")),
            skip: self.skip,
            take: self.take,
        }
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl TryFrom<&QueryRequest> for Query {
    type Error = Error;

    /// Blank `filter` / `orderBy` / `select` strings count as absent.
    fn try_from(req: &QueryRequest) -> Result<Self, Self::Error> {
        Ok(Query {
            include: req.include.clone(),
            filter: non_blank(&req.filter).map(parse_filter).transpose()?,
            order: non_blank(&req.order_by)
                .map(parse_order_by)
                .transpose()?
                .unwrap_or_default(),
            select: non_blank(&req.select).map(parse_select).transpose()?,
            skip: req.skip,
            take: req.take,
        })
    }
}

impl TryFrom<QueryRequest> for Query {
    type Error = Error;

    fn try_from(req: QueryRequest) -> Result<Self, Self::Error> {
        Query::try_from(&req)
    }
}
