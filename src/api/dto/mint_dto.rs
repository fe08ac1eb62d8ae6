//! Daily mint DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{AccountId, Transaction};
use crate::error::ErrorBody;
use crate::service::{MintReport, MintStatus};

/// Query string selecting the account of a mint operation.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MintTargetParams {
    /// Target account; defaults to the caller. Admins may name any player.
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

/// Response body for `GET /daily-mint/status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintStatusResponse {
    /// Whether a claim would succeed now.
    pub eligible: bool,
    /// Last successful claim.
    pub last_claimed_at: Option<DateTime<Utc>>,
    /// Earliest next claim.
    pub next_claim_at: Option<DateTime<Utc>>,
    /// Seconds until the next claim is allowed.
    pub remaining_secs: i64,
    /// Chips credited per claim.
    pub amount: u64,
}

impl From<MintStatus> for MintStatusResponse {
    fn from(s: MintStatus) -> Self {
        Self {
            eligible: s.eligible,
            last_claimed_at: s.last_claimed_at,
            next_claim_at: s.next_claim_at,
            remaining_secs: s.remaining_secs,
            amount: s.amount,
        }
    }
}

/// Request body for `POST /daily-mint/batch`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BatchMintRequest {
    /// Chips per account; defaults to the configured daily amount.
    #[serde(default)]
    pub amount: Option<u64>,
}

/// A credited account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintCreditDto {
    /// Credited account.
    pub account_id: AccountId,
    /// Journaled mint.
    pub transaction: Transaction,
}

/// An account that was not credited.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintSkipDto {
    /// Skipped account.
    pub account_id: AccountId,
    /// Why it was skipped.
    pub error: ErrorBody,
}

/// Response body for `POST /daily-mint/batch`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MintReportResponse {
    /// Chips credited per account.
    pub amount: u64,
    /// Accounts that received chips.
    pub credited: Vec<MintCreditDto>,
    /// Accounts that did not.
    pub skipped: Vec<MintSkipDto>,
}

impl From<MintReport> for MintReportResponse {
    fn from(r: MintReport) -> Self {
        Self {
            amount: r.amount,
            credited: r
                .credited
                .into_iter()
                .map(|c| MintCreditDto {
                    account_id: c.account_id,
                    transaction: c.transaction,
                })
                .collect(),
            skipped: r
                .skipped
                .into_iter()
                .map(|s| MintSkipDto {
                    account_id: s.account_id,
                    error: ErrorBody::from(&s.error),
                })
                .collect(),
        }
    }
}
