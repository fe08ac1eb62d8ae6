//! Transaction history DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{AccountId, Transaction, TransactionStatus, TransactionType};
use crate::service::{Direction, TransactionQuery, TransactionView};

use super::PaginationMeta;
use super::common_dto::{non_blank, page_request};

/// Query string of `GET /transactions`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionListParams {
    /// Only this type (`manual`, `request`, `reversal`, `recovery`,
    /// `daily-mint`).
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionType>,
    /// Only this status.
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    /// Created at or after (RFC 3339).
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    /// Created at or before (RFC 3339).
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
    /// Case-insensitive match on party names, reason or ID.
    #[serde(default)]
    pub search: Option<String>,
    /// Only transactions involving this account.
    #[serde(default)]
    pub account_id: Option<AccountId>,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl From<TransactionListParams> for TransactionQuery {
    fn from(p: TransactionListParams) -> Self {
        Self {
            kind: p.kind,
            status: p.status,
            from_date: p.from_date,
            to_date: p.to_date,
            search: non_blank(p.search.as_deref()).map(str::to_string),
            account_id: p.account_id,
            page: page_request(p.page, p.per_page),
        }
    }
}

/// Side of a transaction relative to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DirectionDto {
    /// The viewer was debited.
    Sent,
    /// The viewer was credited.
    Received,
}

impl From<Direction> for DirectionDto {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Sent => Self::Sent,
            Direction::Received => Self::Received,
        }
    }
}

/// A transaction with its parties' display names.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionDto {
    /// Journal entry fields.
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Sender's display name; absent for minted chips.
    pub from_display_name: Option<String>,
    /// Recipient's display name; absent for burned chips.
    pub to_display_name: Option<String>,
    /// Direction relative to the viewing account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<DirectionDto>,
}

impl From<TransactionView> for TransactionDto {
    fn from(v: TransactionView) -> Self {
        Self {
            transaction: v.transaction,
            from_display_name: v.from_display_name,
            to_display_name: v.to_display_name,
            direction: v.direction.map(DirectionDto::from),
        }
    }
}

/// Response body for `GET /transactions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// Transactions on this page, newest first.
    pub data: Vec<TransactionDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
