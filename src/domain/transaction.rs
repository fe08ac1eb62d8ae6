//! Journaled transactions and their state machine.
//!
//! ```text
//! request:  pending ──► approved
//!              └──────► rejected
//! manual:   approved ──► reversed        (at most once)
//! reversal / recovery / daily-mint: approved (terminal)
//! ```
//!
//! Statuses only ever move forward along these edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AccountId, TransactionId};
use crate::error::LedgerError;

/// Kind of ledger event a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Admin-initiated transfer, applied immediately.
    Manual,
    /// Player-initiated proposal awaiting admin decision.
    Request,
    /// Undo of an approved manual transfer.
    Reversal,
    /// Sweep of a banned account's balance into a verified account.
    Recovery,
    /// Rate-limited system credit.
    DailyMint,
}

impl TransactionType {
    /// Returns the wire string of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Request => "request",
            Self::Reversal => "reversal",
            Self::Recovery => "recovery",
            Self::DailyMint => "daily-mint",
        }
    }

    /// Parses a wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "request" => Some(Self::Request),
            "reversal" => Some(Self::Reversal),
            "recovery" => Some(Self::Recovery),
            "daily-mint" => Some(Self::DailyMint),
            _ => None,
        }
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Waiting for an admin decision; no funds have moved.
    Pending,
    /// Funds moved.
    Approved,
    /// Declined; no funds moved.
    Rejected,
    /// Funds moved and were later moved back by a reversal.
    Reversed,
}

impl TransactionStatus {
    /// Returns the wire string of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Reversed => "reversed",
        }
    }

    /// Parses a wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "reversed" => Some(Self::Reversed),
            _ => None,
        }
    }
}

/// Journal entry for one ledger-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique transaction identifier.
    pub id: TransactionId,
    /// Debited account; `None` means chips were minted by the system.
    pub from_account_id: Option<AccountId>,
    /// Credited account; `None` only for a reversal that burns minted chips.
    pub to_account_id: Option<AccountId>,
    /// Amount in chips, always positive.
    pub amount: u64,
    /// Transaction kind.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Current status.
    pub status: TransactionStatus,
    /// Free-text reason or note.
    pub reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Account that initiated the transaction.
    pub created_by: AccountId,
    /// Admin who approved or rejected it (the creator, for entries approved
    /// on creation). Kept unchanged when a manual transfer is reversed.
    pub decided_by: Option<AccountId>,
    /// When that decision was taken.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reason given when rejecting. A reversal's reason lives on the
    /// reversal entry.
    pub decision_reason: Option<String>,
    /// For a reversal: the manual transfer it undoes.
    pub related_transaction_id: Option<TransactionId>,
    /// For a reversed manual transfer: the reversal that undid it.
    pub reversed_by: Option<TransactionId>,
    /// Scoped idempotency key of the request that created it. Internal; never
    /// sent to clients.
    #[serde(skip_serializing, default)]
    pub idempotency_key: Option<String>,
}

/// Parameters for a brand-new journal entry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Debited account.
    pub from: Option<AccountId>,
    /// Credited account.
    pub to: Option<AccountId>,
    /// Amount in chips.
    pub amount: u64,
    /// Transaction kind.
    pub kind: TransactionType,
    /// Initial status.
    pub status: TransactionStatus,
    /// Reason or note.
    pub reason: Option<String>,
    /// Initiating account.
    pub created_by: AccountId,
    /// Linked transaction.
    pub related: Option<TransactionId>,
    /// Idempotency key.
    pub idempotency_key: Option<String>,
}

impl Transaction {
    /// Builds a transaction from `new`, stamping it with `now`.
    ///
    /// Entries created already `approved` count as decided by their creator.
    #[must_use]
    pub fn create(new: NewTransaction, now: DateTime<Utc>) -> Self {
        let decided = new.status == TransactionStatus::Approved;
        Self {
            id: TransactionId::new(),
            from_account_id: new.from,
            to_account_id: new.to,
            amount: new.amount,
            kind: new.kind,
            status: new.status,
            reason: new.reason,
            created_at: now,
            created_by: new.created_by,
            decided_by: decided.then_some(new.created_by),
            decided_at: decided.then_some(now),
            decision_reason: None,
            related_transaction_id: new.related,
            reversed_by: None,
            idempotency_key: new.idempotency_key,
        }
    }

    /// Returns `true` if `account` is on either side of the transaction.
    #[must_use]
    pub fn involves(&self, account: AccountId) -> bool {
        self.from_account_id == Some(account) || self.to_account_id == Some(account)
    }

    /// Decides a pending request, recording who decided and why.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] when the edge is not part of
    /// the state machine for this transaction's type.
    pub fn transition(
        &mut self,
        next: TransactionStatus,
        actor: AccountId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        use TransactionStatus::{Approved, Pending, Rejected};

        let legal = matches!(
            (self.kind, self.status, next),
            (TransactionType::Request, Pending, Approved | Rejected)
        );
        if !legal {
            return Err(self.illegal_edge(next));
        }
        self.status = next;
        self.decided_by = Some(actor);
        self.decided_at = Some(now);
        self.decision_reason = reason;
        Ok(())
    }

    /// Marks an approved manual transfer as undone by `reversal`.
    ///
    /// The original approval (`decided_by`, `decided_at`) is left intact.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] unless this is an approved
    /// manual transfer.
    pub fn mark_reversed(&mut self, reversal: TransactionId) -> Result<(), LedgerError> {
        let next = TransactionStatus::Reversed;
        if self.kind != TransactionType::Manual || self.status != TransactionStatus::Approved {
            return Err(self.illegal_edge(next));
        }
        self.status = next;
        self.reversed_by = Some(reversal);
        Ok(())
    }

    fn illegal_edge(&self, next: TransactionStatus) -> LedgerError {
        LedgerError::InvalidState(format!(
            "{} transaction {} cannot move from {} to {}",
            self.kind.as_str(),
            self.id,
            self.status.as_str(),
            next.as_str()
        ))
    }
}

/// Criteria for journal queries. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Only this type.
    pub kind: Option<TransactionType>,
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Created at or after.
    pub from_date: Option<DateTime<Utc>>,
    /// Created at or before.
    pub to_date: Option<DateTime<Utc>>,
    /// Only transactions with this account on either side.
    pub involving: Option<AccountId>,
}

impl TransactionFilter {
    /// Returns `true` if `tx` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.kind.is_none_or(|k| tx.kind == k)
            && self.status.is_none_or(|s| tx.status == s)
            && self.from_date.is_none_or(|d| tx.created_at >= d)
            && self.to_date.is_none_or(|d| tx.created_at <= d)
            && self.involving.is_none_or(|a| tx.involves(a))
    }
}
