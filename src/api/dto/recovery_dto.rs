//! Recovery and ban management DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Account, AccountId};

/// Request body for `POST /recovery`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecoverRequest {
    /// Banned account whose whole balance is swept.
    pub banned_account_id: AccountId,
    /// Verified, active account receiving the chips.
    pub verified_account_id: AccountId,
    /// Why the chips are being recovered. Required.
    pub reason: String,
}

/// Request body for `POST /accounts/{id}/ban`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BanRequest {
    /// Why the account is banned. Required.
    pub reason: String,
}

/// Response body of the recovery listings.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountsResponse {
    /// Matching accounts, ordered by ID.
    pub data: Vec<Account>,
}
