use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Paging limits applied by [`CrudService`](crate::CrudService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudConfig {
    /// Page size when the caller gives none.
    pub default_page_size: u64,
    /// Upper bound on any requested page size.
    pub max_page_size: u64,
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 1000,
        }
    }
}

impl CrudConfig {
    /// Requested size clamped to `1..=max_page_size`; `None` means the default.
    pub fn clamp_page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }

    /// Requested `take` for a paged query, kept as given. `None` means the
    /// default; `0` is an empty page; above the maximum is rejected.
    pub fn page_size(&self, requested: Option<u64>) -> Result<u64, QueryError> {
        match requested {
            None => Ok(self.default_page_size.min(self.max_page_size)),
            Some(take) if take > self.max_page_size => Err(QueryError::PageSizeTooLarge {
                requested: take,
                max: self.max_page_size,
            }),
            Some(take) => Ok(take),
        }
    }
}
