//! Transfer workflow DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{AccountId, Transaction};
use crate::error::ErrorBody;
use crate::service::{BulkTransferReport, ManualTransfer};

/// Request body for `POST /transfers`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualTransferRequest {
    /// Debited account; omit to mint new chips.
    #[serde(default)]
    pub from_account_id: Option<AccountId>,
    /// Credited account.
    pub to_account_id: AccountId,
    /// Amount in chips.
    pub amount: u64,
    /// Free-text reason.
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<ManualTransferRequest> for ManualTransfer {
    fn from(req: ManualTransferRequest) -> Self {
        Self {
            from: req.from_account_id,
            to: req.to_account_id,
            amount: req.amount,
            reason: req.reason,
        }
    }
}

/// Request body for `POST /transfers/bulk`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkTransferRequest {
    /// Transfers to apply, each independently.
    pub items: Vec<ManualTransferRequest>,
}

/// Request body for `POST /transfer-requests`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequestBody {
    /// Account to pay.
    pub to_account_id: AccountId,
    /// Amount in chips.
    pub amount: u64,
    /// Note for the approving admin.
    #[serde(default)]
    pub note: Option<String>,
}

/// Request body for `POST /transactions/{id}/reject`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    /// Why the request was declined.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for `POST /transactions/{id}/reverse`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReverseRequest {
    /// Why the transfer is being undone. Required.
    pub reason: String,
}

/// An applied bulk item.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkSuccessDto {
    /// Position in the submitted list.
    pub index: usize,
    /// Journaled transfer.
    pub transaction: Transaction,
}

/// A rejected bulk item.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkFailureDto {
    /// Position in the submitted list.
    pub index: usize,
    /// Error the item failed with.
    pub error: ErrorBody,
}

/// Response body for `POST /transfers/bulk`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkTransferResponse {
    /// Applied items.
    pub succeeded: Vec<BulkSuccessDto>,
    /// Rejected items.
    pub failed: Vec<BulkFailureDto>,
}

impl From<BulkTransferReport> for BulkTransferResponse {
    fn from(report: BulkTransferReport) -> Self {
        Self {
            succeeded: report
                .succeeded
                .into_iter()
                .map(|s| BulkSuccessDto {
                    index: s.index,
                    transaction: s.transaction,
                })
                .collect(),
            failed: report
                .failed
                .into_iter()
                .map(|f| BulkFailureDto {
                    index: f.index,
                    error: ErrorBody::from(&f.error),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn manual_transfer_without_sender_is_a_mint() {
        let json = format!(
            r#"{{"to_account_id":"{}","amount":250}}"#,
            AccountId::new()
        );
        let Ok(req) = serde_json::from_str::<ManualTransferRequest>(&json) else {
            panic!("body should parse");
        };
        let transfer = ManualTransfer::from(req);
        assert_eq!(transfer.from, None);
        assert_eq!(transfer.amount, 250);
    }

    #[test]
    fn negative_amount_is_rejected_at_parse_time() {
        let json = format!(
            r#"{{"to_account_id":"{}","amount":-5}}"#,
            AccountId::new()
        );
        assert!(serde_json::from_str::<ManualTransferRequest>(&json).is_err());
    }
}
