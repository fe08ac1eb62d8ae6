//! Transfer workflows: manual transfers, player requests, approval,
//! rejection and reversal.
//!
//! Lock order for workflows that touch an existing transaction is always
//! journal entry first, then the account locks (ascending ID). Nothing ever
//! waits for an entry lock while holding an account lock.

use std::sync::Arc;

use chrono::TimeDelta;

use super::{LedgerEngine, optional_text, replay, required_reason, scoped_key};
use crate::domain::{
    AccountId, Actor, IdempotencyCache, NewTransaction, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};
use crate::error::LedgerError;

/// Largest number of items accepted in one bulk transfer.
pub const MAX_BULK_ITEMS: usize = 100;

/// Parameters of an admin-initiated transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTransfer {
    /// Debited account; `None` mints new chips.
    pub from: Option<AccountId>,
    /// Credited account.
    pub to: AccountId,
    /// Amount in chips.
    pub amount: u64,
    /// Free-text reason.
    pub reason: Option<String>,
}

/// One applied item of a bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSuccess {
    /// Position of the item in the submitted list.
    pub index: usize,
    /// Journaled transfer.
    pub transaction: Transaction,
}

/// One rejected item of a bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    /// Position of the item in the submitted list.
    pub index: usize,
    /// Why the item was not applied.
    pub error: LedgerError,
}

/// Per-item outcome of a bulk transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkTransferReport {
    /// Items that were applied.
    pub succeeded: Vec<BulkSuccess>,
    /// Items that were not.
    pub failed: Vec<BulkFailure>,
}

/// Orchestrates every workflow that creates or decides a transfer.
#[derive(Debug, Clone)]
pub struct TransferService {
    engine: Arc<LedgerEngine>,
    idempotency: IdempotencyCache<Transaction>,
    bulk_idempotency: IdempotencyCache<BulkTransferReport>,
}

impl TransferService {
    /// Creates the service; cached results are kept for `retention`.
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>, retention: TimeDelta) -> Self {
        let clock = Arc::clone(engine.clock());
        Self {
            idempotency: IdempotencyCache::new(Arc::clone(&clock), retention),
            bulk_idempotency: IdempotencyCache::new(clock, retention),
            engine,
        }
    }

    /// Drops expired idempotency results; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.idempotency.evict_expired() + self.bulk_idempotency.evict_expired()
    }

    /// Applies an admin transfer immediately and journals it as approved.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] for non-admin callers;
    /// - [`LedgerError::InvalidAmount`], [`LedgerError::SameAccount`];
    /// - [`LedgerError::AccountNotFound`], [`LedgerError::InsufficientFunds`].
    pub async fn create_manual_transfer(
        &self,
        actor: Actor,
        transfer: ManualTransfer,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_admin()?;
        let key = scoped_key(&actor, "manual-transfer", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let retention = self.idempotency.retention();
        self.idempotency
            .execute(key.clone(), move || async move {
                if let Some(tx) = replay(&engine, key.as_deref(), retention).await? {
                    return Ok(tx);
                }
                apply_manual(&engine, actor, transfer, key).await
            })
            .await
    }

    /// Applies each item independently as a manual transfer.
    ///
    /// The whole batch is idempotent under one key; a failing item never
    /// stops the others.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-admin callers, or
    /// [`LedgerError::Validation`] for an empty or oversized batch. Item
    /// failures are reported, not returned.
    pub async fn create_bulk_transfers(
        &self,
        actor: Actor,
        items: Vec<ManualTransfer>,
        idempotency_key: Option<String>,
    ) -> Result<BulkTransferReport, LedgerError> {
        actor.require_admin()?;
        if items.is_empty() {
            return Err(LedgerError::Validation(
                "bulk transfer needs at least one item".to_string(),
            ));
        }
        if items.len() > MAX_BULK_ITEMS {
            return Err(LedgerError::Validation(format!(
                "bulk transfer accepts at most {MAX_BULK_ITEMS} items"
            )));
        }

        let key = scoped_key(&actor, "bulk-transfer", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let retention = self.bulk_idempotency.retention();
        self.bulk_idempotency
            .execute(key.clone(), move || async move {
                let mut report = BulkTransferReport::default();
                for (index, item) in items.into_iter().enumerate() {
                    let item_key = key.as_ref().map(|k| format!("{k}#{index}"));
                    let outcome = match replay(&engine, item_key.as_deref(), retention).await {
                        Ok(Some(tx)) => Ok(tx),
                        Ok(None) => apply_manual(&engine, actor, item, item_key).await,
                        Err(e) => Err(e),
                    };
                    match outcome {
                        Ok(transaction) => report.succeeded.push(BulkSuccess { index, transaction }),
                        Err(error) => report.failed.push(BulkFailure { index, error }),
                    }
                }
                tracing::info!(
                    succeeded = report.succeeded.len(),
                    failed = report.failed.len(),
                    "bulk transfer processed"
                );
                Ok(report)
            })
            .await
    }

    /// Files a pending transfer from the caller's own account.
    ///
    /// No funds move until an admin approves the request.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for a zero amount;
    /// - [`LedgerError::SameAccount`] when `to` is the caller;
    /// - [`LedgerError::AccountNotFound`] for an unknown party;
    /// - [`LedgerError::InvalidState`] if the caller is banned.
    pub async fn create_transfer_request(
        &self,
        actor: Actor,
        to: AccountId,
        amount: u64,
        note: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        if to == actor.id {
            return Err(LedgerError::SameAccount);
        }

        let key = scoped_key(&actor, "transfer-request", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let retention = self.idempotency.retention();
        self.idempotency
            .execute(key.clone(), move || async move {
                if let Some(tx) = replay(&engine, key.as_deref(), retention).await? {
                    return Ok(tx);
                }
                let requester = engine.accounts().snapshot(actor.id).await?;
                if requester.is_banned() {
                    return Err(LedgerError::InvalidState(format!(
                        "account {} is banned",
                        actor.id
                    )));
                }
                if !engine.accounts().contains(to).await {
                    return Err(LedgerError::AccountNotFound(to));
                }

                let tx = Transaction::create(
                    NewTransaction {
                        from: Some(actor.id),
                        to: Some(to),
                        amount,
                        kind: TransactionType::Request,
                        status: TransactionStatus::Pending,
                        reason: optional_text(note),
                        created_by: actor.id,
                        related: None,
                        idempotency_key: key,
                    },
                    engine.now(),
                );
                let tx = engine.record(tx).await?;
                tracing::info!(tx_id = %tx.id, from = %actor.id, %to, amount, "transfer request filed");
                Ok(tx)
            })
            .await
    }

    /// Approves a pending request, re-checking the requester's balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] for non-admin callers;
    /// - [`LedgerError::TransactionNotFound`];
    /// - [`LedgerError::InvalidState`] if it is not a pending request or
    ///   the requester is banned;
    /// - [`LedgerError::InsufficientFunds`], leaving the request pending.
    pub async fn approve_request(
        &self,
        actor: Actor,
        id: TransactionId,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_admin()?;
        let key = scoped_key(&actor, "approve", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        self.idempotency
            .execute(key, move || async move {
                let mut entry = engine.journal().lock(id).await?;
                ensure_pending_request(&entry)?;
                let (from, to) = parties(&entry)?;

                let mut locked = engine.lock_parties(Some(from), Some(to)).await?;
                if locked.require(from)?.is_banned() {
                    return Err(LedgerError::InvalidState(format!(
                        "requester {from} is banned"
                    )));
                }
                let plan = LedgerEngine::plan_transfer(&locked, Some(from), Some(to), entry.amount)?;
                entry.transition(TransactionStatus::Approved, actor.id, None, engine.now())?;
                engine.commit(&mut locked, &plan, None).await?;
                engine.persist_transaction(&entry);

                tracing::info!(tx_id = %id, admin = %actor.id, "transfer request approved");
                Ok(entry.clone())
            })
            .await
    }

    /// Rejects a pending request. No funds move.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::TransactionNotFound`],
    /// or [`LedgerError::InvalidState`] if it is not a pending request.
    pub async fn reject_request(
        &self,
        actor: Actor,
        id: TransactionId,
        reason: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_admin()?;
        let key = scoped_key(&actor, "reject", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        self.idempotency
            .execute(key, move || async move {
                let mut entry = engine.journal().lock(id).await?;
                ensure_pending_request(&entry)?;
                entry.transition(
                    TransactionStatus::Rejected,
                    actor.id,
                    optional_text(reason),
                    engine.now(),
                )?;
                engine.persist_transaction(&entry);

                tracing::info!(tx_id = %id, admin = %actor.id, "transfer request rejected");
                Ok(entry.clone())
            })
            .await
    }

    /// Undoes an approved manual transfer and returns the reversal entry.
    ///
    /// Chips go back to the original sender, or are burned when the
    /// original transfer was a mint.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] for non-admin callers;
    /// - [`LedgerError::Validation`] for a blank reason;
    /// - [`LedgerError::TransactionNotFound`];
    /// - [`LedgerError::InvalidState`] unless it is an approved,
    ///   not yet reversed manual transfer;
    /// - [`LedgerError::InsufficientFunds`] if the recipient already spent
    ///   the chips.
    pub async fn reverse_transaction(
        &self,
        actor: Actor,
        id: TransactionId,
        reason: String,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_admin()?;
        let reason = required_reason(&reason, "reversal")?;
        let key = scoped_key(&actor, "reverse", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let retention = self.idempotency.retention();
        self.idempotency
            .execute(key.clone(), move || async move {
                if let Some(tx) = replay(&engine, key.as_deref(), retention).await? {
                    return Ok(tx);
                }

                let mut original = engine.journal().lock(id).await?;
                if original.kind != TransactionType::Manual {
                    return Err(LedgerError::InvalidState(format!(
                        "only manual transfers can be reversed; {id} is a {}",
                        original.kind.as_str()
                    )));
                }
                if original.reversed_by.is_some() || original.status != TransactionStatus::Approved {
                    return Err(LedgerError::InvalidState(format!(
                        "transaction {id} is {} and cannot be reversed",
                        original.status.as_str()
                    )));
                }
                let recipient = original.to_account_id.ok_or_else(|| {
                    LedgerError::Internal(format!("manual transfer {id} has no recipient"))
                })?;
                let sender = original.from_account_id;

                let mut locked = engine.lock_parties(Some(recipient), sender).await?;
                let plan =
                    LedgerEngine::plan_transfer(&locked, Some(recipient), sender, original.amount)?;

                let now = engine.now();
                let reversal = Transaction::create(
                    NewTransaction {
                        from: Some(recipient),
                        to: sender,
                        amount: original.amount,
                        kind: TransactionType::Reversal,
                        status: TransactionStatus::Approved,
                        reason: Some(reason),
                        created_by: actor.id,
                        related: Some(id),
                        idempotency_key: key,
                    },
                    now,
                );

                let before = original.clone();
                original.mark_reversed(reversal.id)?;
                if let Err(e) = engine.commit(&mut locked, &plan, Some(reversal.clone())).await {
                    *original = before;
                    return Err(e);
                }
                engine.persist_transaction(&original);

                tracing::info!(
                    tx_id = %id,
                    reversal_id = %reversal.id,
                    admin = %actor.id,
                    burned = sender.is_none(),
                    "manual transfer reversed"
                );
                Ok(reversal)
            })
            .await
    }
}

async fn apply_manual(
    engine: &LedgerEngine,
    actor: Actor,
    transfer: ManualTransfer,
    key: Option<String>,
) -> Result<Transaction, LedgerError> {
    let entry = NewTransaction {
        from: transfer.from,
        to: Some(transfer.to),
        amount: transfer.amount,
        kind: TransactionType::Manual,
        status: TransactionStatus::Approved,
        reason: optional_text(transfer.reason),
        created_by: actor.id,
        related: None,
        idempotency_key: key,
    };
    let (receipt, tx) = engine
        .apply_transfer_journaled(transfer.from, transfer.to, transfer.amount, entry)
        .await?;
    tracing::info!(
        tx_id = %tx.id,
        admin = %actor.id,
        amount = receipt.amount,
        minted = transfer.from.is_none(),
        "manual transfer applied"
    );
    Ok(tx)
}

fn ensure_pending_request(tx: &Transaction) -> Result<(), LedgerError> {
    if tx.kind != TransactionType::Request {
        return Err(LedgerError::InvalidState(format!(
            "transaction {} is a {}, not a transfer request",
            tx.id,
            tx.kind.as_str()
        )));
    }
    if tx.status != TransactionStatus::Pending {
        return Err(LedgerError::InvalidState(format!(
            "transfer request {} is already {}",
            tx.id,
            tx.status.as_str()
        )));
    }
    Ok(())
}

fn parties(tx: &Transaction) -> Result<(AccountId, AccountId), LedgerError> {
    match (tx.from_account_id, tx.to_account_id) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(LedgerError::Internal(format!(
            "transfer request {} is missing a party",
            tx.id
        ))),
    }
}
