//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::service::{Page, PageRequest};

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

impl PaginationMeta {
    /// Splits a service page into its items and the wire metadata.
    #[must_use]
    pub fn split<T>(page: Page<T>) -> (Vec<T>, Self) {
        let meta = Self {
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
        };
        (page.items, meta)
    }
}

/// Builds a clamped page request from optional `page` / `per_page`
/// query values (defaults 1 and 20).
#[must_use]
pub fn page_request(page: Option<u32>, per_page: Option<u32>) -> PageRequest {
    let defaults = PageRequest::default();
    PageRequest {
        page: page.unwrap_or(defaults.page),
        per_page: per_page.unwrap_or(defaults.per_page),
    }
    .clamped()
}

/// Free-text search over account names and e-mails.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Case-insensitive substring of name or e-mail.
    #[serde(default)]
    pub search: Option<String>,
}

impl SearchParams {
    /// The search term, or `None` when blank.
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }
}

pub(super) fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_defaults_and_clamps() {
        assert_eq!(page_request(None, None), PageRequest::default());
        let clamped = page_request(Some(0), Some(5_000));
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.per_page, 100);
    }

    #[test]
    fn blank_search_is_ignored() {
        let params = SearchParams {
            search: Some("   ".to_string()),
        };
        assert_eq!(params.term(), None);
    }
}
