//! Shared query-string types for list endpoints.

use serde::Deserialize;

/// Default page size for listings.
const DEFAULT_PER_PAGE: usize = 20;
/// Ceiling on the page size.
const MAX_PER_PAGE: usize = 100;

/// Standard `?page=&per_page=` pagination parameters (1-based page).
#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl Pagination {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Slice a full result set down to the requested page.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let per_page = self.per_page();
        let start = (self.page() - 1) * per_page;
        items.iter().skip(start).take(per_page).cloned().collect()
    }
}
