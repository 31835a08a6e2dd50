//! Pagination
//!
//! List endpoints accept either `page`/`size` or `skip`/`limit` query
//! parameters. Both are normalized into a [`Pagination`] window, and results
//! are wrapped in a [`Page`] envelope.

use crate::core::error::{AppError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw pagination query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

/// A validated result window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if page < 1 {
            return Err(AppError::ValidationError("page must be at least 1".to_string()));
        }
        check_size("size", size)?;
        let offset = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| AppError::ValidationError("page is out of range".to_string()))?;
        Ok(Self { page, size, offset })
    }

    /// SQL `LIMIT` for this window
    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    /// SQL `OFFSET` for this window
    pub fn offset(&self) -> i64 {
        self.offset as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

fn check_size(name: &str, size: u32) -> Result<()> {
    if size < 1 || size > MAX_PAGE_SIZE {
        return Err(AppError::ValidationError(format!(
            "{} must be between 1 and {}",
            name, MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

impl PageParams {
    /// Normalize the parameters; `skip`/`limit` win over `page`/`size`
    pub fn resolve(&self) -> Result<Pagination> {
        if self.skip.is_some() || self.limit.is_some() {
            let skip = self.skip.unwrap_or(0);
            let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
            check_size("limit", limit)?;
            return Ok(Pagination {
                page: (skip / limit).saturating_add(1),
                size: limit,
                offset: skip,
            });
        }

        Pagination::new(self.page.unwrap_or(1), self.size.unwrap_or(DEFAULT_PAGE_SIZE))
    }
}

/// Pagination metadata returned with every list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    pub size: u32,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// A page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, window: Pagination) -> Self {
        let size = window.size as i64;
        let pages = if total <= 0 { 0 } else { (total + size - 1) / size };
        let has_next = (window.offset as i64) + (items.len() as i64) < total;
        Self {
            items,
            pagination: PageMeta {
                total,
                page: window.page,
                size: window.size,
                pages,
                has_prev: window.offset > 0,
                has_next,
            },
        }
    }

    /// Convert the items while keeping the pagination metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_page_size_defaults() {
        let window = PageParams::default().resolve().unwrap();
        assert_eq!(window, Pagination { page: 1, size: 20, offset: 0 });
    }

    #[test]
    fn test_skip_limit_wins() {
        let params = PageParams {
            page: Some(7),
            size: Some(5),
            skip: Some(40),
            limit: Some(20),
        };
        let window = params.resolve().unwrap();
        assert_eq!(window, Pagination { page: 3, size: 20, offset: 40 });
    }

    #[test]
    fn test_bounds_rejected() {
        let zero_page = PageParams { page: Some(0), ..Default::default() };
        assert!(matches!(zero_page.resolve(), Err(AppError::ValidationError(_))));

        let huge = PageParams { size: Some(101), ..Default::default() };
        assert!(matches!(huge.resolve(), Err(AppError::ValidationError(_))));

        let zero_limit = PageParams { limit: Some(0), ..Default::default() };
        assert!(matches!(zero_limit.resolve(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_offset_overflow_rejected() {
        let last = PageParams { page: Some(u32::MAX), size: Some(100), ..Default::default() };
        assert!(matches!(last.resolve(), Err(AppError::ValidationError(_))));

        // the largest page whose offset still fits
        let window = Pagination::new(u32::MAX / 100 + 1, 100).unwrap();
        assert_eq!(window.offset, (u32::MAX / 100) * 100);

        let skip_all = PageParams { skip: Some(u32::MAX), limit: Some(1), ..Default::default() };
        assert_eq!(skip_all.resolve().unwrap().page, u32::MAX);
    }

    #[test]
    fn test_page_meta() {
        let window = Pagination::new(2, 10).unwrap();
        let page = Page::new(vec![0; 10], 25, window);
        assert_eq!(
            page.pagination,
            PageMeta { total: 25, page: 2, size: 10, pages: 3, has_prev: true, has_next: true }
        );

        let empty: Page<u8> = Page::new(vec![], 0, Pagination::default());
        assert_eq!(empty.pagination.pages, 0);
        assert!(!empty.pagination.has_prev);
        assert!(!empty.pagination.has_next);
    }

    proptest! {
        #[test]
        fn prop_offset_matches_page(page in 1u32..1000, size in 1u32..=100) {
            let window = PageParams { page: Some(page), size: Some(size), ..Default::default() }
                .resolve()
                .unwrap();
            prop_assert_eq!(window.offset, (page - 1) * size);
            prop_assert!(window.size >= 1 && window.size <= MAX_PAGE_SIZE);
        }

        #[test]
        fn prop_pages_cover_total(total in 0i64..10_000, size in 1u32..=100) {
            let page: Page<u8> = Page::new(vec![], total, Pagination::new(1, size).unwrap());
            let pages = page.pagination.pages;
            prop_assert!(pages * size as i64 >= total);
            prop_assert!(pages == 0 || (pages - 1) * (size as i64) < total);
        }
    }
}
