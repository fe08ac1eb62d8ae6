//! Ordered write-behind channel from the ledger to PostgreSQL.
//!
//! The ledger enqueues a snapshot of every account and transaction it
//! changes while it still holds the corresponding locks, so the queue order
//! matches commit order. A single background task drains the queue.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::postgres::PostgresPersistence;
use crate::domain::{Account, Transaction};

/// One pending write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCommand {
    /// Upsert this account state.
    Account(Box<Account>),
    /// Upsert this transaction state.
    Transaction(Box<Transaction>),
}

/// Sending side of the write-behind queue.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    sender: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceHandle {
    /// Creates a handle together with the receiving end of its queue.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PersistCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueues the current state of `account`.
    pub fn record_account(&self, account: &Account) {
        self.send(PersistCommand::Account(Box::new(account.clone())));
    }

    /// Enqueues the current state of `tx`.
    pub fn record_transaction(&self, tx: &Transaction) {
        self.send(PersistCommand::Transaction(Box::new(tx.clone())));
    }

    fn send(&self, command: PersistCommand) {
        if self.sender.send(command).is_err() {
            tracing::warn!("persistence writer stopped; dropping write");
        }
    }
}

/// Starts the background writer and returns its handle.
#[must_use]
pub fn spawn_writer(store: PostgresPersistence) -> (PersistenceHandle, JoinHandle<()>) {
    let (handle, receiver) = PersistenceHandle::channel();
    let task = tokio::spawn(run_writer(store, receiver));
    (handle, task)
}

async fn run_writer(store: PostgresPersistence, mut receiver: mpsc::UnboundedReceiver<PersistCommand>) {
    while let Some(command) = receiver.recv().await {
        let result = match &command {
            PersistCommand::Account(account) => store.upsert_account(account).await,
            PersistCommand::Transaction(tx) => store.upsert_transaction(tx).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, ?command, "failed to persist ledger change");
        }
    }
    tracing::debug!("persistence writer finished");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, Role};

    #[tokio::test]
    async fn commands_arrive_in_send_order() {
        let (handle, mut rx) = PersistenceHandle::channel();
        let a = Account::new(
            AccountId::new(),
            "A".to_string(),
            "a@x.test".to_string(),
            Role::Player,
        );
        let mut b = a.clone();
        b.balance = 9;

        handle.record_account(&a);
        handle.record_account(&b);

        let Some(PersistCommand::Account(first)) = rx.recv().await else {
            panic!("expected first account write");
        };
        let Some(PersistCommand::Account(second)) = rx.recv().await else {
            panic!("expected second account write");
        };
        assert_eq!(first.balance, 0);
        assert_eq!(second.balance, 9);
    }

    #[test]
    fn send_after_writer_stopped_does_not_panic() {
        let (handle, rx) = PersistenceHandle::channel();
        drop(rx);
        handle.record_account(&Account::new(
            AccountId::new(),
            "A".to_string(),
            "a@x.test".to_string(),
            Role::Admin,
        ));
    }
}
