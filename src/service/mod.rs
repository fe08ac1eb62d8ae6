//! Service layer: ledger workflows.
//!
//! [`LedgerEngine`] is the only component that changes balances. The
//! workflow services ([`TransferService`], [`RecoveryService`],
//! [`MintService`]) check the caller's role, run each mutation through an
//! idempotency cache and call into the engine. [`QueryService`] serves the
//! read paths straight from the stores.

pub mod ledger_engine;
pub mod mint_service;
pub mod query_service;
pub mod recovery_service;
pub mod transfer_service;

#[cfg(test)]
mod fixtures;

pub use ledger_engine::{LedgerEngine, TransferPlan, TransferReceipt};
pub use mint_service::{MintCredit, MintReport, MintService, MintSkip, MintStatus};
pub use query_service::{
    Direction, Page, PageRequest, QueryService, TransactionQuery, TransactionView,
};
pub use recovery_service::RecoveryService;
pub use transfer_service::{
    BulkFailure, BulkSuccess, BulkTransferReport, ManualTransfer, TransferService,
};

use chrono::TimeDelta;

use crate::domain::{Actor, Transaction};
use crate::error::LedgerError;

/// Namespaces a client idempotency key by caller and operation, so two
/// callers (or two endpoints) never share a result.
fn scoped_key(actor: &Actor, operation: &str, key: Option<&str>) -> Option<String> {
    key.map(|k| format!("{}:{operation}:{k}", actor.id))
}

/// Returns the transaction an earlier run journaled under `key`, while it
/// is still within `retention`.
///
/// Covers retries whose cached result was lost, e.g. across a restart. Past
/// the retention window the key is free for reuse.
async fn replay(
    engine: &LedgerEngine,
    key: Option<&str>,
    retention: TimeDelta,
) -> Result<Option<Transaction>, LedgerError> {
    let Some(key) = key else {
        return Ok(None);
    };
    let now = engine.now();
    Ok(engine
        .journal()
        .find_by_idempotency_key(key)
        .await?
        .filter(|tx| tx.created_at + retention > now))
}

fn required_reason(reason: &str, operation: &str) -> Result<String, LedgerError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        Err(LedgerError::Validation(format!(
            "{operation} requires a non-empty reason"
        )))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, Role};

    #[test]
    fn keys_are_scoped_by_actor_and_operation() {
        let a = Actor::new(AccountId::new(), Role::Admin);
        let b = Actor::new(AccountId::new(), Role::Admin);
        assert_ne!(
            scoped_key(&a, "manual-transfer", Some("k")),
            scoped_key(&b, "manual-transfer", Some("k"))
        );
        assert_ne!(
            scoped_key(&a, "manual-transfer", Some("k")),
            scoped_key(&a, "reverse", Some("k"))
        );
        assert_eq!(scoped_key(&a, "reverse", None), None);
    }

    #[test]
    fn blank_reason_is_rejected() {
        assert!(matches!(
            required_reason("   ", "ban"),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(required_reason(" fraud ", "ban"), Ok("fraud".to_string()));
        assert_eq!(optional_text(Some("  ".to_string())), None);
    }
}
