//! Concurrent account storage with per-account fine-grained locking.
//!
//! [`AccountStore`] keeps every account in a `HashMap` where each entry is
//! individually protected by a [`tokio::sync::RwLock`]. Mutations that span
//! several accounts take all of their write locks in ascending
//! [`AccountId`] order through [`AccountStore::lock`], so two transfers in
//! opposite directions can never deadlock.
//!
//! The outer map lock is never held while waiting on an entry lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use chrono::{DateTime, Utc};

use super::{Account, AccountId, AccountSeed};
use crate::error::LedgerError;

/// Central store for all accounts.
///
/// # Concurrency
///
/// - Reads of one account run concurrently.
/// - Writes to disjoint accounts run concurrently.
/// - Writes touching the same account are serialized.
#[derive(Debug)]
pub struct AccountStore {
    accounts: RwLock<HashMap<AccountId, Arc<RwLock<Account>>>>,
    lock_timeout: Duration,
}

/// Write guards over a set of accounts, held for one atomic mutation.
///
/// Dropping the value releases every lock at once.
#[derive(Debug)]
pub struct LockedAccounts {
    guards: Vec<OwnedRwLockWriteGuard<Account>>,
}

impl LockedAccounts {
    /// Returns the locked account with the given ID.
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.guards.iter().find(|g| g.id == id).map(|g| &**g)
    }

    /// Returns the locked account with the given ID, mutably.
    pub fn get_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.guards
            .iter_mut()
            .find(|g| g.id == id)
            .map(|g| &mut **g)
    }

    /// Returns the locked account or [`LedgerError::AccountNotFound`].
    ///
    /// # Errors
    ///
    /// Fails if `id` was not part of the locked set.
    pub fn require(&self, id: AccountId) -> Result<&Account, LedgerError> {
        self.get(id).ok_or(LedgerError::AccountNotFound(id))
    }

    /// Mutable variant of [`Self::require`].
    ///
    /// # Errors
    ///
    /// Fails if `id` was not part of the locked set.
    pub fn require_mut(&mut self, id: AccountId) -> Result<&mut Account, LedgerError> {
        self.get_mut(id).ok_or(LedgerError::AccountNotFound(id))
    }

    /// Iterates over the locked accounts in lock order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.guards.iter().map(|g| &**g)
    }
}

impl AccountStore {
    /// Creates an empty store whose lock acquisitions give up after
    /// `lock_timeout`.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Inserts a freshly provisioned account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if an account with the same ID
    /// already exists.
    pub async fn insert(&self, account: Account) -> Result<AccountId, LedgerError> {
        let id = account.id;
        let mut map = self.accounts.write().await;
        if map.contains_key(&id) {
            return Err(LedgerError::Validation(format!(
                "account {id} already exists"
            )));
        }
        map.insert(id, Arc::new(RwLock::new(account)));
        Ok(id)
    }

    /// Inserts every seed that is not provisioned yet and returns the new
    /// accounts.
    ///
    /// A seed is skipped when an account with its ID or (case-insensitively)
    /// its e-mail already exists, so re-applying a seed file on top of
    /// restored state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if an existing account stays locked
    /// too long.
    pub async fn provision(
        &self,
        seeds: Vec<AccountSeed>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Account>, LedgerError> {
        let mut emails: Vec<String> = self
            .list()
            .await?
            .into_iter()
            .map(|a| a.email.to_lowercase())
            .collect();
        let mut created = Vec::new();
        for seed in seeds {
            let email = seed.email.to_lowercase();
            let known_id = match seed.id {
                Some(id) => self.contains(id).await,
                None => false,
            };
            if known_id || emails.contains(&email) {
                tracing::debug!(email = %seed.email, "seed already provisioned");
                continue;
            }
            let account = seed.into_account(now);
            self.insert(account.clone()).await?;
            emails.push(email);
            created.push(account);
        }
        Ok(created)
    }

    /// Returns the shared handle to an account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] if no such account exists.
    pub async fn get(&self, id: AccountId) -> Result<Arc<RwLock<Account>>, LedgerError> {
        let map = self.accounts.read().await;
        map.get(&id).cloned().ok_or(LedgerError::AccountNotFound(id))
    }

    /// Returns a copy of one account's current state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] if no such account exists,
    /// or [`LedgerError::Conflict`] if its lock cannot be taken in time.
    pub async fn snapshot(&self, id: AccountId) -> Result<Account, LedgerError> {
        let entry = self.get(id).await?;
        let guard = self.read_entry(entry).await?;
        Ok(guard.clone())
    }

    /// Returns `true` if the account exists.
    pub async fn contains(&self, id: AccountId) -> bool {
        self.accounts.read().await.contains_key(&id)
    }

    /// Returns every account ID in ascending order.
    pub async fn ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Takes write locks on all `ids` in ascending order.
    ///
    /// Duplicates are ignored. The returned guards stay valid until dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] for the first unknown ID, or
    /// [`LedgerError::Conflict`] if a lock cannot be taken within the
    /// configured timeout. No lock is held when an error is returned.
    pub async fn lock(&self, ids: &[AccountId]) -> Result<LockedAccounts, LedgerError> {
        let mut ordered = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let entries = {
            let map = self.accounts.read().await;
            ordered
                .iter()
                .map(|id| map.get(id).cloned().ok_or(LedgerError::AccountNotFound(*id)))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut guards = Vec::with_capacity(entries.len());
        for entry in entries {
            let guard = tokio::time::timeout(self.lock_timeout, entry.write_owned())
                .await
                .map_err(|_| LedgerError::Conflict("timed out waiting for account lock".to_string()))?;
            guards.push(guard);
        }
        Ok(LockedAccounts { guards })
    }

    /// Returns a consistent copy of every account, ordered by ID.
    ///
    /// All read locks are held together before anything is copied, so the
    /// result never shows one half of a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if a lock cannot be taken in time.
    pub async fn list(&self) -> Result<Vec<Account>, LedgerError> {
        let entries = {
            let map = self.accounts.read().await;
            let mut entries: Vec<_> = map.iter().map(|(id, e)| (*id, Arc::clone(e))).collect();
            entries.sort_by_key(|(id, _)| *id);
            entries
        };

        let mut guards = Vec::with_capacity(entries.len());
        for (_, entry) in entries {
            guards.push(self.read_entry(entry).await?);
        }
        Ok(guards.iter().map(|g| (**g).clone()).collect())
    }

    /// Sum of all balances, taken from a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if a lock cannot be taken in time.
    pub async fn total_balance(&self) -> Result<u128, LedgerError> {
        Ok(self
            .list()
            .await?
            .iter()
            .map(|a| u128::from(a.balance))
            .sum())
    }

    /// Returns the number of accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Returns `true` if the store holds no accounts.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    async fn read_entry(
        &self,
        entry: Arc<RwLock<Account>>,
    ) -> Result<OwnedRwLockReadGuard<Account>, LedgerError> {
        tokio::time::timeout(self.lock_timeout, entry.read_owned())
            .await
            .map_err(|_| LedgerError::Conflict("timed out waiting for account lock".to_string()))
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
