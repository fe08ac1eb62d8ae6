//! Ledger engine: the atomic balance-mutation primitive.
//!
//! Every balance change in the system goes through here. A change is done
//! in two steps while the write locks of every involved account are held:
//!
//! 1. [`LedgerEngine::plan_transfer`] validates the move and computes the
//!    resulting balances without touching anything;
//! 2. [`LedgerEngine::commit`] journals the accompanying transaction (if
//!    any) and only then writes the planned balances.
//!
//! Planning and journaling are the only fallible steps, so a failure never
//! leaves one side of a transfer applied. Readers need the same locks, so
//! nobody observes a debit without its credit.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    AccountId, AccountStore, Clock, LockedAccounts, NewTransaction, Transaction,
    TransactionJournal,
};
use crate::error::LedgerError;
use crate::persistence::PersistenceHandle;

/// Balances computed for a transfer that has not been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    debit: Option<(AccountId, u64)>,
    credit: Option<(AccountId, u64)>,
    amount: u64,
}

impl TransferPlan {
    /// Amount being moved.
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.amount
    }

    fn apply(&self, locked: &mut LockedAccounts) -> TransferReceipt {
        if let Some((id, balance)) = self.debit
            && let Some(account) = locked.get_mut(id)
        {
            account.balance = balance;
        }
        if let Some((id, balance)) = self.credit
            && let Some(account) = locked.get_mut(id)
        {
            account.balance = balance;
        }
        TransferReceipt {
            amount: self.amount,
            from_balance: self.debit.map(|(_, b)| b),
            to_balance: self.credit.map(|(_, b)| b),
        }
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Amount moved.
    pub amount: u64,
    /// Sender balance after the transfer; `None` for a mint.
    pub from_balance: Option<u64>,
    /// Recipient balance after the transfer; `None` for a burn.
    pub to_balance: Option<u64>,
}

/// Owner of the account store and journal, and the only component allowed
/// to change balances.
#[derive(Debug)]
pub struct LedgerEngine {
    accounts: Arc<AccountStore>,
    journal: Arc<TransactionJournal>,
    clock: Arc<dyn Clock>,
    persistence: Option<PersistenceHandle>,
}

impl LedgerEngine {
    /// Creates an engine over the given stores.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountStore>,
        journal: Arc<TransactionJournal>,
        clock: Arc<dyn Clock>,
        persistence: Option<PersistenceHandle>,
    ) -> Self {
        Self {
            accounts,
            journal,
            clock,
            persistence,
        }
    }

    /// Account store.
    #[must_use]
    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// Transaction journal.
    #[must_use]
    pub fn journal(&self) -> &Arc<TransactionJournal> {
        &self.journal
    }

    /// Shared clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time according to the engine's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Moves `amount` from `from` (or from nowhere, when minting) to `to`.
    ///
    /// Callers that need a journal entry written in the same unit use
    /// [`Self::apply_transfer_journaled`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount` is zero;
    /// - [`LedgerError::SameAccount`] if `from == to`;
    /// - [`LedgerError::AccountNotFound`] for an unknown account;
    /// - [`LedgerError::InsufficientFunds`] if the sender cannot cover it;
    /// - [`LedgerError::Conflict`] if the locks cannot be taken in time.
    pub async fn apply_transfer(
        &self,
        from: Option<AccountId>,
        to: AccountId,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        let (receipt, _) = self.transfer(from, Some(to), amount, None).await?;
        Ok(receipt)
    }

    /// Like [`Self::apply_transfer`], journaling `entry` in the same unit.
    ///
    /// # Errors
    ///
    /// Same as [`Self::apply_transfer`].
    pub async fn apply_transfer_journaled(
        &self,
        from: Option<AccountId>,
        to: AccountId,
        amount: u64,
        entry: NewTransaction,
    ) -> Result<(TransferReceipt, Transaction), LedgerError> {
        let (receipt, tx) = self.transfer(from, Some(to), amount, Some(entry)).await?;
        let tx = tx.ok_or_else(|| LedgerError::Internal("journal entry missing".to_string()))?;
        Ok((receipt, tx))
    }

    async fn transfer(
        &self,
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: u64,
        entry: Option<NewTransaction>,
    ) -> Result<(TransferReceipt, Option<Transaction>), LedgerError> {
        validate_parties(from, to, amount)?;
        let mut locked = self.lock_parties(from, to).await?;
        let plan = Self::plan_transfer(&locked, from, to, amount)?;
        let tx = entry.map(|e| Transaction::create(e, self.now()));
        let receipt = self.commit(&mut locked, &plan, tx.clone()).await?;
        Ok((receipt, tx))
    }

    /// Takes the write locks of both parties in ascending ID order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] or [`LedgerError::Conflict`].
    pub async fn lock_parties(
        &self,
        from: Option<AccountId>,
        to: Option<AccountId>,
    ) -> Result<LockedAccounts, LedgerError> {
        let ids: Vec<AccountId> = from.into_iter().chain(to).collect();
        self.accounts.lock(&ids).await
    }

    /// Validates a move between locked accounts and computes the result.
    ///
    /// `from = None` mints, `to = None` burns. Nothing is modified.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`], [`LedgerError::SameAccount`],
    ///   [`LedgerError::Validation`] for malformed moves;
    /// - [`LedgerError::AccountNotFound`] if a party is not in `locked`;
    /// - [`LedgerError::InsufficientFunds`] if the sender cannot cover it.
    pub fn plan_transfer(
        locked: &LockedAccounts,
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: u64,
    ) -> Result<TransferPlan, LedgerError> {
        validate_parties(from, to, amount)?;

        let debit = match from {
            Some(id) => {
                let account = locked.require(id)?;
                let balance = account.balance.checked_sub(amount).ok_or(
                    LedgerError::InsufficientFunds {
                        account: id,
                        available: account.balance,
                        requested: amount,
                    },
                )?;
                Some((id, balance))
            }
            None => None,
        };

        let credit = match to {
            Some(id) => {
                let account = locked.require(id)?;
                let balance = account.balance.checked_add(amount).ok_or_else(|| {
                    LedgerError::Validation(format!("balance of account {id} would overflow"))
                })?;
                Some((id, balance))
            }
            None => None,
        };

        Ok(TransferPlan {
            debit,
            credit,
            amount,
        })
    }

    /// Journals `entry` (if given), then applies `plan`.
    ///
    /// Must be called with the same locks `plan` was computed under. Every
    /// locked account and the new entry are queued for persistence.
    ///
    /// # Errors
    ///
    /// Fails only if the journal rejects `entry`, in which case no balance
    /// has changed.
    pub async fn commit(
        &self,
        locked: &mut LockedAccounts,
        plan: &TransferPlan,
        entry: Option<Transaction>,
    ) -> Result<TransferReceipt, LedgerError> {
        let journaled = match entry {
            Some(tx) => Some(self.journal.append_locked(tx).await?),
            None => None,
        };
        let receipt = plan.apply(locked);
        self.persist_accounts(locked);
        if let Some(tx) = &journaled {
            self.persist_transaction(tx);
        }
        Ok(receipt)
    }

    /// Journals an entry that moves no funds.
    ///
    /// The entry stays locked until its write is queued, so a later
    /// decision on it always reaches persistence after its creation.
    ///
    /// # Errors
    ///
    /// Fails if the journal rejects `tx`.
    pub async fn record(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        let entry = self.journal.append_locked(tx).await?;
        self.persist_transaction(&entry);
        Ok(entry.clone())
    }

    /// Queues the current state of every locked account for persistence.
    pub fn persist_accounts(&self, locked: &LockedAccounts) {
        if let Some(p) = &self.persistence {
            for account in locked.iter() {
                p.record_account(account);
            }
        }
    }

    /// Queues `tx` for persistence.
    pub fn persist_transaction(&self, tx: &Transaction) {
        if let Some(p) = &self.persistence {
            p.record_transaction(tx);
        }
    }
}

fn validate_parties(
    from: Option<AccountId>,
    to: Option<AccountId>,
    amount: u64,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    match (from, to) {
        (None, None) => Err(LedgerError::Validation(
            "a transfer needs a sender or a recipient".to_string(),
        )),
        (Some(f), Some(t)) if f == t => Err(LedgerError::SameAccount),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{Account, ManualClock, Role, TransactionStatus, TransactionType};
    use crate::persistence::PersistCommand;

    async fn engine_with(balances: &[u64]) -> (LedgerEngine, Vec<AccountId>) {
        let store = Arc::new(AccountStore::new(Duration::from_secs(5)));
        let mut ids = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            let mut a = Account::new(
                AccountId::new(),
                format!("player-{i}"),
                format!("p{i}@x.test"),
                Role::Player,
            );
            a.balance = *balance;
            ids.push(a.id);
            let _ = store.insert(a).await;
        }
        let engine = LedgerEngine::new(
            store,
            Arc::new(TransactionJournal::default()),
            Arc::new(ManualClock::default()),
            None,
        );
        (engine, ids)
    }

    async fn balance(engine: &LedgerEngine, id: AccountId) -> u64 {
        engine
            .accounts()
            .snapshot(id)
            .await
            .map(|a| a.balance)
            .unwrap_or(u64::MAX)
    }

    #[tokio::test]
    async fn transfer_moves_funds() {
        let (engine, ids) = engine_with(&[500, 0]).await;
        let [p, q] = ids[..] else {
            panic!("two accounts");
        };
        let receipt = engine.apply_transfer(Some(p), q, 200).await;
        assert_eq!(
            receipt,
            Ok(TransferReceipt {
                amount: 200,
                from_balance: Some(300),
                to_balance: Some(200),
            })
        );
        assert_eq!(balance(&engine, p).await, 300);
        assert_eq!(balance(&engine, q).await, 200);
    }

    #[tokio::test]
    async fn mint_has_no_debit_side() {
        let (engine, ids) = engine_with(&[0]).await;
        let [p] = ids[..] else {
            panic!("one account");
        };
        assert!(engine.apply_transfer(None, p, 10_000).await.is_ok());
        assert_eq!(balance(&engine, p).await, 10_000);
    }

    #[tokio::test]
    async fn underfunded_transfer_changes_nothing() {
        let (engine, ids) = engine_with(&[50, 7]).await;
        let [p, q] = ids[..] else {
            panic!("two accounts");
        };
        let result = engine.apply_transfer(Some(p), q, 51).await;
        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                account: p,
                available: 50,
                requested: 51,
            })
        );
        assert_eq!(balance(&engine, p).await, 50);
        assert_eq!(balance(&engine, q).await, 7);
    }

    #[tokio::test]
    async fn rejects_zero_same_and_unknown() {
        let (engine, ids) = engine_with(&[10]).await;
        let [p] = ids[..] else {
            panic!("one account");
        };
        assert!(matches!(
            engine.apply_transfer(Some(p), p, 1).await,
            Err(LedgerError::SameAccount)
        ));
        assert!(matches!(
            engine.apply_transfer(None, p, 0).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        let ghost = AccountId::new();
        assert_eq!(
            engine.apply_transfer(Some(ghost), p, 1).await,
            Err(LedgerError::AccountNotFound(ghost))
        );
    }

    #[tokio::test]
    async fn burn_plan_only_debits() {
        let (engine, ids) = engine_with(&[30]).await;
        let [p] = ids[..] else {
            panic!("one account");
        };
        let Ok(mut locked) = engine.lock_parties(Some(p), None).await else {
            panic!("lock failed");
        };
        let Ok(plan) = LedgerEngine::plan_transfer(&locked, Some(p), None, 30) else {
            panic!("plan failed");
        };
        let Ok(receipt) = engine.commit(&mut locked, &plan, None).await else {
            panic!("commit failed");
        };
        assert_eq!(receipt.to_balance, None);
        drop(locked);
        assert_eq!(balance(&engine, p).await, 0);
    }

    #[tokio::test]
    async fn recorded_entry_is_queued_before_its_decision() {
        let (handle, mut rx) = PersistenceHandle::channel();
        let engine = Arc::new(LedgerEngine::new(
            Arc::new(AccountStore::default()),
            Arc::new(TransactionJournal::default()),
            Arc::new(ManualClock::default()),
            Some(handle),
        ));
        let requester = AccountId::new();
        let request = Transaction::create(
            NewTransaction {
                from: Some(requester),
                to: Some(AccountId::new()),
                amount: 10,
                kind: TransactionType::Request,
                status: TransactionStatus::Pending,
                reason: None,
                created_by: requester,
                related: None,
                idempotency_key: None,
            },
            engine.now(),
        );
        let id = request.id;

        let recorder = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.record(request).await })
        };
        let decider = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                loop {
                    if let Ok(mut entry) = engine.journal().lock(id).await {
                        let now = engine.now();
                        let decided =
                            entry.transition(TransactionStatus::Rejected, AccountId::new(), None, now);
                        engine.persist_transaction(&entry);
                        return decided;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        assert!(matches!(recorder.await, Ok(Ok(_))));
        assert!(matches!(decider.await, Ok(Ok(()))));

        let Some(PersistCommand::Transaction(first)) = rx.recv().await else {
            panic!("expected transaction write");
        };
        let Some(PersistCommand::Transaction(second)) = rx.recv().await else {
            panic!("expected transaction write");
        };
        assert_eq!(first.status, TransactionStatus::Pending);
        assert_eq!(second.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn journaled_transfer_appends_entry_and_queues_writes() {
        let store = Arc::new(AccountStore::default());
        let a = Account::new(AccountId::new(), "a".into(), "a@x.test".into(), Role::Player);
        let id = a.id;
        let _ = store.insert(a).await;
        let (handle, mut rx) = PersistenceHandle::channel();
        let engine = LedgerEngine::new(
            store,
            Arc::new(TransactionJournal::default()),
            Arc::new(ManualClock::default()),
            Some(handle),
        );
        let admin = AccountId::new();
        let result = engine
            .apply_transfer_journaled(
                None,
                id,
                10,
                NewTransaction {
                    from: None,
                    to: Some(id),
                    amount: 10,
                    kind: TransactionType::Manual,
                    status: TransactionStatus::Approved,
                    reason: None,
                    created_by: admin,
                    related: None,
                    idempotency_key: None,
                },
            )
            .await;
        let Ok((_, tx)) = result else {
            panic!("journaled transfer failed");
        };
        assert_eq!(engine.journal().get(tx.id).await, Ok(tx.clone()));

        let Some(PersistCommand::Account(acc)) = rx.recv().await else {
            panic!("expected account write");
        };
        assert_eq!(acc.balance, 10);
        assert_eq!(
            rx.recv().await,
            Some(PersistCommand::Transaction(Box::new(tx)))
        );
    }

    #[tokio::test]
    async fn concurrent_opposite_transfers_conserve_total_and_never_go_negative() {
        let (engine, ids) = engine_with(&[1_000, 1_000, 1_000]).await;
        let engine = Arc::new(engine);
        let mut handles = Vec::new();
        for i in 0..300usize {
            let engine = Arc::clone(&engine);
            let from = ids[i % 3];
            let to = ids[(i + 1 + i / 3 % 2) % 3];
            handles.push(tokio::spawn(async move {
                let _ = engine.apply_transfer(Some(from), to, 37).await;
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        assert_eq!(engine.accounts().total_balance().await, Ok(3_000));
    }
}
