use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn reverse(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

impl FromStr for SortDir {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "+" => Ok(SortDir::Asc),
            "desc" | "descending" | "-" => Ok(SortDir::Desc),
            _ => Err(Error::InvalidSortDirection(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Ordered list of sort keys; an empty list means storage order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderBy(pub Vec<OrderKey>);

impl OrderBy {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.0
    }

    pub fn then(mut self, key: OrderKey) -> Self {
        self.0.push(key);
        self
    }

    pub fn from_sorts(sorts: &[SortDescriptor]) -> Self {
        Self(
            sorts
                .iter()
                .map(|s| OrderKey {
                    field: s.field.clone(),
                    dir: s.direction,
                })
                .collect(),
        )
    }
}

impl FromStr for OrderBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse_order_by(s)
    }
}

/// UI-side sort selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    pub field: String,
    #[serde(default)]
    pub direction: SortDir,
}

impl SortDescriptor {
    pub fn new(field: impl Into<String>, direction: SortDir) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Sort selection as a grid keeps it: picking a column replaces the current
/// ordering, secondary keys are added explicitly with [`SortState::then_by`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortState {
    sorts: Vec<SortDescriptor>,
}

impl SortState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, field: impl Into<String>, direction: SortDir) -> &mut Self {
        self.sorts.clear();
        self.sorts.push(SortDescriptor::new(field, direction));
        self
    }

    pub fn then_by(&mut self, field: impl Into<String>, direction: SortDir) -> &mut Self {
        let field = field.into();
        self.sorts.retain(|s| !s.field.eq_ignore_ascii_case(&field));
        self.sorts.push(SortDescriptor::new(field, direction));
        self
    }

    pub fn clear(&mut self) {
        self.sorts.clear();
    }

    pub fn sorts(&self) -> &[SortDescriptor] {
        &self.sorts
    }

    pub fn to_order_by(&self) -> OrderBy {
        OrderBy::from_sorts(&self.sorts)
    }
}
