//! Pagination types for list queries.

use serde::{Deserialize, Serialize};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum allowed items per page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page selection for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed).
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Creates a pagination, clamping `page` to at least 1 and `page_size`
    /// to `[1, MAX_PAGE_SIZE]`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Creates a pagination from optional query parameters with defaults.
    pub fn from_query(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self::new(page.unwrap_or(1), page_size.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.page_size
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    /// Total page count for `total_items`; an empty result still has one page.
    pub fn total_pages(&self, total_items: u64) -> u32 {
        if total_items == 0 {
            return 1;
        }
        total_items.div_ceil(self.page_size as u64) as u32
    }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub items: Vec<T>,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: pagination.total_pages(total),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> PaginatedResult<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResult {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            items: self.items.into_iter().map(f).collect(),
        }
    }

    /// Maps the items with a fallible function, propagating the first error.
    pub fn try_map<U, E, F>(self, f: F) -> Result<PaginatedResult<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<U>, E>>()?;
        Ok(PaginatedResult {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_default() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 20);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_offset() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_pagination_clamps_values() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 500).page_size, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(1, 0).page_size, 1);
        assert_eq!(Pagination::from_query(None, Some(100)).page_size, 100);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination::new(1, 20);
        assert_eq!(p.total_pages(0), 1);
        assert_eq!(p.total_pages(20), 1);
        assert_eq!(p.total_pages(21), 2);
    }

    #[test]
    fn test_paginated_result_map() {
        let p = Pagination::new(1, 2);
        let result = PaginatedResult::new(vec![1, 2], 5, &p);

        assert!(result.has_next_page());
        let mapped = result.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20]);
        assert_eq!(mapped.total_pages, 3);

        let failed: Result<PaginatedResult<i32>, &str> =
            PaginatedResult::new(vec![1], 1, &p).try_map(|_| Err("boom"));
        assert_eq!(failed.unwrap_err(), "boom");
    }
}
