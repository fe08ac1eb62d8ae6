//! Account listing DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::Account;
use crate::service::PageRequest;

use super::PaginationMeta;
use super::common_dto::{non_blank, page_request};

/// Query string of `GET /accounts`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccountListParams {
    /// Case-insensitive substring of name or e-mail.
    #[serde(default)]
    pub search: Option<String>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl AccountListParams {
    /// The search term, or `None` when blank.
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }

    /// Requested page, clamped.
    #[must_use]
    pub fn page_request(&self) -> PageRequest {
        page_request(self.page, self.per_page)
    }
}

/// Response body for `GET /accounts`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountListResponse {
    /// Accounts on this page, ordered by ID.
    pub data: Vec<Account>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
