//! Recovery of banned balances and ban / verification management.

use std::sync::Arc;

use chrono::TimeDelta;

use super::{LedgerEngine, replay, required_reason, scoped_key};
use crate::domain::{
    Account, AccountId, AccountStatus, Actor, IdempotencyCache, NewTransaction, Transaction,
    TransactionStatus, TransactionType,
};
use crate::error::LedgerError;

/// Admin workflows around banned and verified accounts.
#[derive(Debug, Clone)]
pub struct RecoveryService {
    engine: Arc<LedgerEngine>,
    recoveries: IdempotencyCache<Transaction>,
    flags: IdempotencyCache<Account>,
}

impl RecoveryService {
    /// Creates the service; cached results are kept for `retention`.
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>, retention: TimeDelta) -> Self {
        let clock = Arc::clone(engine.clock());
        Self {
            recoveries: IdempotencyCache::new(Arc::clone(&clock), retention),
            flags: IdempotencyCache::new(clock, retention),
            engine,
        }
    }

    /// Drops expired idempotency results; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.recoveries.evict_expired() + self.flags.evict_expired()
    }

    /// Sweeps the whole balance of a banned account into a verified one.
    ///
    /// The amount is read under the account locks, so chips credited to
    /// the banned account up to that moment are included.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] for non-admin callers;
    /// - [`LedgerError::Validation`] for a blank reason;
    /// - [`LedgerError::SameAccount`] if source and target coincide;
    /// - [`LedgerError::AccountNotFound`] for an unknown account;
    /// - [`LedgerError::InvalidState`] unless the source is banned with a
    ///   positive balance and the target is verified and active.
    pub async fn recover_chips(
        &self,
        actor: Actor,
        banned_account: AccountId,
        verified_account: AccountId,
        reason: String,
        idempotency_key: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        actor.require_admin()?;
        let reason = required_reason(&reason, "recovery")?;
        if banned_account == verified_account {
            return Err(LedgerError::SameAccount);
        }

        let key = scoped_key(&actor, "recover", idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        let retention = self.recoveries.retention();
        self.recoveries
            .execute(key.clone(), move || async move {
                if let Some(tx) = replay(&engine, key.as_deref(), retention).await? {
                    return Ok(tx);
                }

                let mut locked = engine
                    .lock_parties(Some(banned_account), Some(verified_account))
                    .await?;
                let source = locked.require(banned_account)?;
                if !source.is_banned() {
                    return Err(LedgerError::InvalidState(format!(
                        "account {banned_account} is not banned"
                    )));
                }
                let amount = source.balance;
                if amount == 0 {
                    return Err(LedgerError::InvalidState(format!(
                        "account {banned_account} has no chips to recover"
                    )));
                }
                let target = locked.require(verified_account)?;
                if !target.verified || target.is_banned() {
                    return Err(LedgerError::InvalidState(format!(
                        "account {verified_account} must be verified and active to receive chips"
                    )));
                }

                let plan = LedgerEngine::plan_transfer(
                    &locked,
                    Some(banned_account),
                    Some(verified_account),
                    amount,
                )?;
                let tx = Transaction::create(
                    NewTransaction {
                        from: Some(banned_account),
                        to: Some(verified_account),
                        amount,
                        kind: TransactionType::Recovery,
                        status: TransactionStatus::Approved,
                        reason: Some(reason),
                        created_by: actor.id,
                        related: None,
                        idempotency_key: key,
                    },
                    engine.now(),
                );
                engine.commit(&mut locked, &plan, Some(tx.clone())).await?;

                tracing::info!(
                    tx_id = %tx.id,
                    from = %banned_account,
                    to = %verified_account,
                    amount,
                    admin = %actor.id,
                    "chips recovered"
                );
                Ok(tx)
            })
            .await
    }

    /// Bans an account. Funds stay where they are.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] for non-admin callers;
    /// - [`LedgerError::Validation`] for a blank reason;
    /// - [`LedgerError::AccountNotFound`];
    /// - [`LedgerError::InvalidState`] if already banned or if the caller
    ///   targets their own account.
    pub async fn ban_account(
        &self,
        actor: Actor,
        account_id: AccountId,
        reason: String,
        idempotency_key: Option<String>,
    ) -> Result<Account, LedgerError> {
        actor.require_admin()?;
        let reason = required_reason(&reason, "ban")?;
        if account_id == actor.id {
            return Err(LedgerError::InvalidState(
                "admins cannot ban their own account".to_string(),
            ));
        }
        self.update_flags(actor, account_id, "ban", idempotency_key, move |account, now| {
            if account.is_banned() {
                return Err(LedgerError::InvalidState(format!(
                    "account {} is already banned",
                    account.id
                )));
            }
            account.status = AccountStatus::Banned;
            account.ban_reason = Some(reason);
            account.banned_at = Some(now);
            Ok(())
        })
        .await
    }

    /// Lifts a ban.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::AccountNotFound`], or
    /// [`LedgerError::InvalidState`] if the account is not banned.
    pub async fn unban_account(
        &self,
        actor: Actor,
        account_id: AccountId,
        idempotency_key: Option<String>,
    ) -> Result<Account, LedgerError> {
        actor.require_admin()?;
        self.update_flags(actor, account_id, "unban", idempotency_key, |account, _| {
            if !account.is_banned() {
                return Err(LedgerError::InvalidState(format!(
                    "account {} is not banned",
                    account.id
                )));
            }
            account.status = AccountStatus::Active;
            account.ban_reason = None;
            account.banned_at = None;
            Ok(())
        })
        .await
    }

    /// Marks an account verified. Verifying twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] or [`LedgerError::AccountNotFound`].
    pub async fn verify_account(
        &self,
        actor: Actor,
        account_id: AccountId,
        idempotency_key: Option<String>,
    ) -> Result<Account, LedgerError> {
        actor.require_admin()?;
        self.update_flags(actor, account_id, "verify", idempotency_key, |account, now| {
            if !account.verified {
                account.verified = true;
                account.verified_at = Some(now);
            }
            Ok(())
        })
        .await
    }

    /// Banned accounts that still hold chips, optionally filtered by name
    /// or e-mail.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-admin callers, or
    /// [`LedgerError::Conflict`] if the snapshot cannot be taken.
    pub async fn list_recoverable(
        &self,
        actor: Actor,
        search: Option<&str>,
    ) -> Result<Vec<Account>, LedgerError> {
        actor.require_admin()?;
        let accounts = self.engine.accounts().list().await?;
        Ok(accounts
            .into_iter()
            .filter(|a| a.is_banned() && a.balance > 0)
            .filter(|a| search.is_none_or(|s| a.matches_search(s)))
            .collect())
    }

    /// Verified, active accounts that can receive recovered chips.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-admin callers, or
    /// [`LedgerError::Conflict`] if the snapshot cannot be taken.
    pub async fn list_verified(
        &self,
        actor: Actor,
        search: Option<&str>,
    ) -> Result<Vec<Account>, LedgerError> {
        actor.require_admin()?;
        let accounts = self.engine.accounts().list().await?;
        Ok(accounts
            .into_iter()
            .filter(|a| a.verified && !a.is_banned())
            .filter(|a| search.is_none_or(|s| a.matches_search(s)))
            .collect())
    }

    async fn update_flags<F>(
        &self,
        actor: Actor,
        account_id: AccountId,
        operation: &'static str,
        idempotency_key: Option<String>,
        update: F,
    ) -> Result<Account, LedgerError>
    where
        F: FnOnce(&mut Account, chrono::DateTime<chrono::Utc>) -> Result<(), LedgerError>
            + Send
            + 'static,
    {
        let key = scoped_key(&actor, operation, idempotency_key.as_deref());
        let engine = Arc::clone(&self.engine);
        self.flags
            .execute(key, move || async move {
                let mut locked = engine.lock_parties(Some(account_id), None).await?;
                let now = engine.now();
                let account = locked.require_mut(account_id)?;
                update(account, now)?;
                let snapshot = account.clone();
                engine.persist_accounts(&locked);

                tracing::info!(%account_id, admin = %actor.id, operation, "account flags updated");
                Ok(snapshot)
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::service::fixtures::Fixture;

    fn service(fx: &Fixture) -> RecoveryService {
        RecoveryService::new(Arc::clone(&fx.engine), Fixture::retention())
    }

    // Banned X holding 3,000 is swept into verified Y.
    #[tokio::test]
    async fn recovery_sweeps_entire_balance() {
        let fx = Fixture::new().await;
        let svc = service(&fx);
        let x = fx.player("X", 3_000).await;
        let y = fx.player("Y", 250).await;
        fx.mark(x.id, true, false).await;
        fx.mark(y.id, false, true).await;

        let Ok(tx) = svc
            .recover_chips(fx.admin, x.id, y.id, "fraud ring".to_string(), None)
            .await
        else {
            panic!("recovery failed");
        };
        assert_eq!(tx.kind, TransactionType::Recovery);
        assert_eq!(tx.amount, 3_000);
        assert_eq!(fx.balance(x.id).await, 0);
        assert_eq!(fx.balance(y.id).await, 3_250);
        assert!(fx.account(x.id).await.is_banned());
        assert_eq!(fx.engine.journal().len().await, 1);
        assert_eq!(fx.total().await, 3_250);
    }

    #[tokio::test]
    async fn recovery_preconditions() {
        let fx = Fixture::new().await;
        let svc = service(&fx);
        let x = fx.player("X", 100).await;
        let y = fx.player("Y", 0).await;
        let z = fx.player("Z", 0).await;
        fx.mark(y.id, false, true).await;

        // Source not banned.
        assert!(matches!(
            svc.recover_chips(fx.admin, x.id, y.id, "r".to_string(), None)
                .await,
            Err(LedgerError::InvalidState(_))
        ));
        fx.mark(x.id, true, false).await;
        // Target not verified.
        assert!(matches!(
            svc.recover_chips(fx.admin, x.id, z.id, "r".to_string(), None)
                .await,
            Err(LedgerError::InvalidState(_))
        ));
        assert!(matches!(
            svc.recover_chips(fx.admin, x.id, x.id, "r".to_string(), None)
                .await,
            Err(LedgerError::SameAccount)
        ));
        assert!(matches!(
            svc.recover_chips(fx.admin, x.id, y.id, String::new(), None)
                .await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            svc.recover_chips(y, x.id, y.id, "r".to_string(), None).await,
            Err(LedgerError::Unauthorized(_))
        ));

        assert!(
            svc.recover_chips(fx.admin, x.id, y.id, "r".to_string(), None)
                .await
                .is_ok()
        );
        // Nothing left.
        assert!(matches!(
            svc.recover_chips(fx.admin, x.id, y.id, "r".to_string(), None)
                .await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn ban_requires_reason_and_does_not_move_funds() {
        let fx = Fixture::new().await;
        let svc = service(&fx);
        let p = fx.player("P", 40).await;

        assert!(matches!(
            svc.ban_account(fx.admin, p.id, "  ".to_string(), None).await,
            Err(LedgerError::Validation(_))
        ));
        let Ok(banned) = svc
            .ban_account(fx.admin, p.id, "chargeback".to_string(), None)
            .await
        else {
            panic!("ban failed");
        };
        assert_eq!(banned.status, AccountStatus::Banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("chargeback"));
        assert!(banned.banned_at.is_some());
        assert_eq!(banned.balance, 40);

        assert!(matches!(
            svc.ban_account(fx.admin, p.id, "again".to_string(), None)
                .await,
            Err(LedgerError::InvalidState(_))
        ));

        let Ok(unbanned) = svc.unban_account(fx.admin, p.id, None).await else {
            panic!("unban failed");
        };
        assert_eq!(unbanned.status, AccountStatus::Active);
        assert_eq!(unbanned.ban_reason, None);
        assert!(matches!(
            svc.unban_account(fx.admin, p.id, None).await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn admin_cannot_ban_self() {
        let fx = Fixture::new().await;
        assert!(matches!(
            service(&fx)
                .ban_account(fx.admin, fx.admin.id, "oops".to_string(), None)
                .await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let fx = Fixture::new().await;
        let svc = service(&fx);
        let p = fx.player("P", 0).await;

        let Ok(first) = svc.verify_account(fx.admin, p.id, None).await else {
            panic!("verify failed");
        };
        fx.clock.advance(TimeDelta::hours(1));
        let Ok(second) = svc.verify_account(fx.admin, p.id, None).await else {
            panic!("verify failed");
        };
        assert!(second.verified);
        assert_eq!(first.verified_at, second.verified_at);
    }

    #[tokio::test]
    async fn listings_filter_by_flags_and_search() {
        let fx = Fixture::new().await;
        let svc = service(&fx);
        let a = fx.player("Alice", 10).await;
        let b = fx.player("Bob", 0).await;
        let c = fx.player("Carol", 0).await;
        fx.mark(a.id, true, false).await;
        fx.mark(b.id, true, false).await;
        fx.mark(c.id, false, true).await;

        let Ok(recoverable) = svc.list_recoverable(fx.admin, None).await else {
            panic!("list failed");
        };
        let ids: Vec<AccountId> = recoverable.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![a.id]);

        let Ok(verified) = svc.list_verified(fx.admin, Some("car")).await else {
            panic!("list failed");
        };
        assert_eq!(verified.len(), 1);
        let Ok(none) = svc.list_verified(fx.admin, Some("zed")).await else {
            panic!("list failed");
        };
        assert!(none.is_empty());
    }
}
