//! Database row models for accounts and transactions.
//!
//! Rows store enums as their wire strings and amounts as `BIGINT`; the
//! conversions below reject anything the domain types cannot represent.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStatus, DailyMintWindow, Role, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};
use crate::error::LedgerError;

/// A row of the `accounts` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AccountRow {
    /// Account ID.
    pub id: Uuid,
    /// Display name.
    pub display_name: String,
    /// E-mail address.
    pub email: String,
    /// `admin` or `player`.
    pub role: String,
    /// Non-negative balance.
    pub balance: i64,
    /// `active` or `banned`.
    pub status: String,
    /// Verification flag.
    pub verified: bool,
    /// Verification timestamp.
    pub verified_at: Option<DateTime<Utc>>,
    /// Current ban reason.
    pub ban_reason: Option<String>,
    /// Current ban start.
    pub banned_at: Option<DateTime<Utc>>,
    /// Last daily mint claim.
    pub last_mint_at: Option<DateTime<Utc>>,
    /// Provisioning timestamp.
    pub created_at: DateTime<Utc>,
}

/// A row of the `transactions` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TransactionRow {
    /// Transaction ID.
    pub id: Uuid,
    /// Debited account.
    pub from_account_id: Option<Uuid>,
    /// Credited account.
    pub to_account_id: Option<Uuid>,
    /// Positive amount.
    pub amount: i64,
    /// Transaction type wire string.
    pub kind: String,
    /// Status wire string.
    pub status: String,
    /// Reason or note.
    pub reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Initiating account.
    pub created_by: Uuid,
    /// Deciding admin.
    pub decided_by: Option<Uuid>,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Decision reason.
    pub decision_reason: Option<String>,
    /// Linked transaction.
    pub related_transaction_id: Option<Uuid>,
    /// Reversal that undid this transaction.
    pub reversed_by: Option<Uuid>,
    /// Idempotency key of the creating request.
    pub idempotency_key: Option<String>,
}

fn to_db_amount(value: u64, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Persistence(format!("{field} {value} exceeds BIGINT range")))
}

fn from_db_amount(value: i64, field: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Persistence(format!("negative {field} {value} in database")))
}

fn bad_value(field: &str, value: &str) -> LedgerError {
    LedgerError::Persistence(format!("unknown {field} {value:?} in database"))
}

impl TryFrom<&Account> for AccountRow {
    type Error = LedgerError;

    fn try_from(a: &Account) -> Result<Self, Self::Error> {
        Ok(Self {
            id: *a.id.as_uuid(),
            display_name: a.display_name.clone(),
            email: a.email.clone(),
            role: a.role.as_str().to_string(),
            balance: to_db_amount(a.balance, "balance")?,
            status: a.status.as_str().to_string(),
            verified: a.verified,
            verified_at: a.verified_at,
            ban_reason: a.ban_reason.clone(),
            banned_at: a.banned_at,
            last_mint_at: a.mint_window.last_claimed_at,
            created_at: a.created_at,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: AccountId::from_uuid(row.id),
            role: Role::parse(&row.role).ok_or_else(|| bad_value("role", &row.role))?,
            status: AccountStatus::parse(&row.status)
                .ok_or_else(|| bad_value("status", &row.status))?,
            balance: from_db_amount(row.balance, "balance")?,
            display_name: row.display_name,
            email: row.email,
            verified: row.verified,
            verified_at: row.verified_at,
            ban_reason: row.ban_reason,
            banned_at: row.banned_at,
            mint_window: DailyMintWindow {
                last_claimed_at: row.last_mint_at,
            },
            created_at: row.created_at,
        })
    }
}

impl TryFrom<&Transaction> for TransactionRow {
    type Error = LedgerError;

    fn try_from(t: &Transaction) -> Result<Self, Self::Error> {
        Ok(Self {
            id: *t.id.as_uuid(),
            from_account_id: t.from_account_id.map(Uuid::from),
            to_account_id: t.to_account_id.map(Uuid::from),
            amount: to_db_amount(t.amount, "amount")?,
            kind: t.kind.as_str().to_string(),
            status: t.status.as_str().to_string(),
            reason: t.reason.clone(),
            created_at: t.created_at,
            created_by: *t.created_by.as_uuid(),
            decided_by: t.decided_by.map(Uuid::from),
            decided_at: t.decided_at,
            decision_reason: t.decision_reason.clone(),
            related_transaction_id: t.related_transaction_id.map(Uuid::from),
            reversed_by: t.reversed_by.map(Uuid::from),
            idempotency_key: t.idempotency_key.clone(),
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransactionId::from_uuid(row.id),
            from_account_id: row.from_account_id.map(AccountId::from),
            to_account_id: row.to_account_id.map(AccountId::from),
            amount: from_db_amount(row.amount, "amount")?,
            kind: TransactionType::parse(&row.kind).ok_or_else(|| bad_value("kind", &row.kind))?,
            status: TransactionStatus::parse(&row.status)
                .ok_or_else(|| bad_value("status", &row.status))?,
            reason: row.reason,
            created_at: row.created_at,
            created_by: AccountId::from_uuid(row.created_by),
            decided_by: row.decided_by.map(AccountId::from),
            decided_at: row.decided_at,
            decision_reason: row.decision_reason,
            related_transaction_id: row.related_transaction_id.map(TransactionId::from),
            reversed_by: row.reversed_by.map(TransactionId::from),
            idempotency_key: row.idempotency_key,
        })
    }
}
