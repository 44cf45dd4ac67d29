use serde::{Deserialize, Serialize};

/// One window of a larger result set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub data: Vec<T>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> PagedResult<T> {
    /// Build from a `skip`/`take` window. `page` is `skip / take + 1` when
    /// `take > 0`, else 1; `page_size` is `take`, or the item count when unbounded.
    pub fn from_window(data: Vec<T>, total_count: u64, skip: Option<u64>, take: Option<u64>) -> Self {
        let page = match take {
            Some(t) if t > 0 => skip.unwrap_or(0) / t + 1,
            _ => 1,
        };
        let page_size = take.unwrap_or(data.len() as u64);
        Self {
            data,
            total_count,
            page,
            page_size,
        }
    }

    pub fn empty(page_size: u64) -> Self {
        Self {
            data: Vec::new(),
            total_count: 0,
            page: 1,
            page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return u64::from(self.total_count > 0);
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Map items while keeping the paging info (domain -> DTO convenience).
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            data: self.data.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}
