//! Daily mint: rate-limited system credit.
//!
//! A claim credits the account and stamps its mint window under the same
//! account lock, so the credit and the cooldown always move together.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use super::{LedgerEngine, replay, scoped_key};
use crate::domain::{
    AccountId, Actor, IdempotencyCache, NewTransaction, Role, Transaction, TransactionStatus,
    TransactionType,
};
use crate::error::LedgerError;

/// Eligibility of one account, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintStatus {
    /// Whether a claim would succeed now.
    pub eligible: bool,
    /// Last successful claim.
    pub last_claimed_at: Option<DateTime<Utc>>,
    /// Earliest next claim; `None` if never claimed.
    pub next_claim_at: Option<DateTime<Utc>>,
    /// Seconds until the next claim is allowed (0 when the window is open).
    pub remaining_secs: i64,
    /// Chips credited per claim.
    pub amount: u64,
}

/// An account credited by a batch mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintCredit {
    /// Credited account.
    pub account_id: AccountId,
    /// Journaled mint.
    pub transaction: Transaction,
}

/// An account a batch mint did not credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintSkip {
    /// Skipped account.
    pub account_id: AccountId,
    /// Why it was skipped.
    pub error: LedgerError,
}

/// Outcome of [`MintService::mint_for_all_eligible`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReport {
    /// Chips credited per account.
    pub amount: u64,
    /// Accounts that received chips.
    pub credited: Vec<MintCredit>,
    /// Accounts that did not, with the reason.
    pub skipped: Vec<MintSkip>,
}

/// Daily mint workflows.
#[derive(Debug, Clone)]
pub struct MintService {
    engine: Arc<LedgerEngine>,
    amount: u64,
    window: TimeDelta,
    claims: IdempotencyCache<Transaction>,
    batches: IdempotencyCache<MintReport>,
}

impl MintService {
    /// Creates the service crediting `amount` chips once per `window`.
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>, amount: u64, window: TimeDelta, retention: TimeDelta) -> Self {
        let clock = Arc::clone(engine.clock());
        Self {
            claims: IdempotencyCache::new(Arc::clone(&clock), retention),
            batches: IdempotencyCache::new(clock, retention),
            engine,
            amount,
            window,
        }
    }

    /// Chips credited per claim.
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.amount
    }

    /// Drops expired idempotency results; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.claims.evict_expired() + self.batches.evict_expired()
    }

    /// Credits the daily amount to `account_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] unless the caller owns the account
    ///   or is an admin;
    /// - [`LedgerError::AccountNotFound`];
    /// - [`LedgerError::InvalidState`] for banned or admin accounts;
    /// - [`LedgerError::AlreadyClaimed`] inside the cooldown window.
    pub async fn claim_daily_mint(
        &self,
        actor: Actor,
        account_id: AccountId,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_owner_or_admin(account_id)?;
        let key = scoped_key(&actor, "daily-mint", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let (amount, window) = (self.amount, self.window);
        let retention = self.claims.retention();
        self.claims
            .execute(key.clone(), move || async move {
                if let Some(tx) = replay(&engine, key.as_deref(), retention).await? {
                    return Ok(tx);
                }
                credit(&engine, actor, account_id, amount, window, key).await
            })
            .await
    }

    /// Reports whether `account_id` may claim now.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] or [`LedgerError::AccountNotFound`].
    pub async fn status(&self, actor: Actor, account_id: AccountId) -> Result<MintStatus, LedgerError> {
        actor.require_owner_or_admin(account_id)?;
        let account = self.engine.accounts().snapshot(account_id).await?;
        let now = self.engine.now();
        let window = account.mint_window;
        let remaining_secs = match window.check(now, self.window) {
            Ok(()) => 0,
            Err(LedgerError::AlreadyClaimed { remaining_secs, .. }) => remaining_secs,
            Err(e) => return Err(e),
        };
        Ok(MintStatus {
            eligible: remaining_secs == 0 && !account.is_banned() && account.role == Role::Player,
            last_claimed_at: window.last_claimed_at,
            next_claim_at: window.next_claim_at(self.window),
            remaining_secs,
            amount: self.amount,
        })
    }

    /// Credits every eligible player, independently.
    ///
    /// Uses the configured amount when `amount` is `None`. One account
    /// failing never stops the others; it lands in the report instead.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-admin callers, or
    /// [`LedgerError::InvalidAmount`] for a zero amount.
    pub async fn mint_for_all_eligible(
        &self,
        actor: Actor,
        amount: Option<u64>,
        idempotency_key: Option<String>,
    ) -> Result<MintReport, LedgerError> {
        actor.require_admin()?;
        let amount = amount.unwrap_or(self.amount);
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "mint amount must be greater than zero".to_string(),
            ));
        }

        let key = scoped_key(&actor, "batch-mint", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let window = self.window;
        let retention = self.batches.retention();
        self.batches
            .execute(key.clone(), move || async move {
                let mut report = MintReport {
                    amount,
                    credited: Vec::new(),
                    skipped: Vec::new(),
                };
                for account_id in engine.accounts().ids().await {
                    let item_key = key.as_ref().map(|k| format!("{k}#{account_id}"));
                    let outcome = match replay(&engine, item_key.as_deref(), retention).await {
                        Ok(Some(tx)) => Ok(tx),
                        Ok(None) => credit(&engine, actor, account_id, amount, window, item_key).await,
                        Err(e) => Err(e),
                    };
                    match outcome {
                        Ok(transaction) => report.credited.push(MintCredit {
                            account_id,
                            transaction,
                        }),
                        Err(error) => report.skipped.push(MintSkip { account_id, error }),
                    }
                }
                tracing::info!(
                    amount,
                    credited = report.credited.len(),
                    skipped = report.skipped.len(),
                    "batch mint processed"
                );
                Ok(report)
            })
            .await
    }
}

async fn credit(
    engine: &LedgerEngine,
    actor: Actor,
    account_id: AccountId,
    amount: u64,
    window: TimeDelta,
    key: Option<String>,
) -> Result<Transaction, LedgerError> {
    let mut locked = engine.lock_parties(None, Some(account_id)).await?;
    let now = engine.now();

    let account = locked.require(account_id)?;
    if account.role != Role::Player {
        return Err(LedgerError::InvalidState(format!(
            "account {account_id} is not a player account"
        )));
    }
    if account.is_banned() {
        return Err(LedgerError::InvalidState(format!(
            "account {account_id} is banned"
        )));
    }
    account.mint_window.check(now, window)?;

    let plan = LedgerEngine::plan_transfer(&locked, None, Some(account_id), amount)?;
    let tx = Transaction::create(
        NewTransaction {
            from: None,
            to: Some(account_id),
            amount,
            kind: TransactionType::DailyMint,
            status: TransactionStatus::Approved,
            reason: None,
            created_by: actor.id,
            related: None,
            idempotency_key: key,
        },
        now,
    );

    let account = locked.require_mut(account_id)?;
    let previous = account.mint_window;
    account.mint_window.last_claimed_at = Some(now);
    if let Err(e) = engine.commit(&mut locked, &plan, Some(tx.clone())).await {
        if let Some(account) = locked.get_mut(account_id) {
            account.mint_window = previous;
        }
        return Err(e);
    }

    tracing::info!(tx_id = %tx.id, %account_id, amount, "daily mint credited");
    Ok(tx)
}
