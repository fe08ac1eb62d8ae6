//! Append-only transaction journal.
//!
//! Entries are never removed. Each entry sits behind its own lock so a
//! workflow can hold one transaction (for example a pending request being
//! approved) while others are read or appended. Insertion order is kept so
//! history views can page newest-first without sorting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::{Transaction, TransactionFilter, TransactionId};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct JournalInner {
    by_id: HashMap<TransactionId, Arc<RwLock<Transaction>>>,
    by_key: HashMap<String, Arc<RwLock<Transaction>>>,
    order: Vec<Arc<RwLock<Transaction>>>,
}

/// Source of truth for transaction history.
#[derive(Debug)]
pub struct TransactionJournal {
    inner: RwLock<JournalInner>,
    lock_timeout: Duration,
}

impl TransactionJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(JournalInner::default()),
            lock_timeout,
        }
    }

    /// Appends a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if an entry with the same ID is
    /// already journaled.
    pub async fn append(&self, tx: Transaction) -> Result<TransactionId, LedgerError> {
        let guard = self.append_locked(tx).await?;
        Ok(guard.id)
    }

    /// Appends a new entry and returns it still write-locked.
    ///
    /// The entry is visible to lookups at once, but nobody can transition
    /// it until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if an entry with the same ID is
    /// already journaled.
    pub async fn append_locked(
        &self,
        tx: Transaction,
    ) -> Result<OwnedRwLockWriteGuard<Transaction>, LedgerError> {
        let id = tx.id;
        let key = tx.idempotency_key.clone();
        let entry = Arc::new(RwLock::new(tx));
        let guard = Arc::clone(&entry)
            .try_write_owned()
            .map_err(|_| LedgerError::Internal(format!("transaction {id} locked before append")))?;

        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&id) {
            return Err(LedgerError::Internal(format!(
                "transaction {id} already journaled"
            )));
        }
        inner.by_id.insert(id, Arc::clone(&entry));
        if let Some(key) = key {
            inner.by_key.insert(key, Arc::clone(&entry));
        }
        inner.order.push(entry);
        Ok(guard)
    }

    /// Returns a copy of one entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionNotFound`] for unknown IDs, or
    /// [`LedgerError::Conflict`] if the entry stays locked too long.
    pub async fn get(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let entry = self.entry(id).await?;
        let guard = tokio::time::timeout(self.lock_timeout, entry.read())
            .await
            .map_err(|_| lock_conflict())?;
        Ok(guard.clone())
    }

    /// Locks one entry for a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionNotFound`] for unknown IDs, or
    /// [`LedgerError::Conflict`] if the lock cannot be taken in time.
    pub async fn lock(
        &self,
        id: TransactionId,
    ) -> Result<OwnedRwLockWriteGuard<Transaction>, LedgerError> {
        let entry = self.entry(id).await?;
        tokio::time::timeout(self.lock_timeout, entry.write_owned())
            .await
            .map_err(|_| lock_conflict())
    }

    /// Returns copies of all entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if an entry stays locked too long.
    pub async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, LedgerError> {
        let entries: Vec<_> = {
            let inner = self.inner.read().await;
            inner.order.iter().rev().map(Arc::clone).collect()
        };

        let mut out = Vec::new();
        for entry in entries {
            let tx = tokio::time::timeout(self.lock_timeout, entry.read())
                .await
                .map_err(|_| lock_conflict())?;
            if filter.matches(&tx) {
                out.push(tx.clone());
            }
        }
        Ok(out)
    }

    /// Finds the entry created under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if the entry stays locked too long.
    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let entry = self.inner.read().await.by_key.get(key).cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };
        let tx = tokio::time::timeout(self.lock_timeout, entry.read())
            .await
            .map_err(|_| lock_conflict())?;
        Ok(Some(tx.clone()))
    }

    /// Returns the number of journaled entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Returns `true` if nothing has been journaled.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.order.is_empty()
    }

    async fn entry(&self, id: TransactionId) -> Result<Arc<RwLock<Transaction>>, LedgerError> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(id))
    }
}

impl Default for TransactionJournal {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn lock_conflict() -> LedgerError {
    LedgerError::Conflict("timed out waiting for transaction lock".to_string())
}
