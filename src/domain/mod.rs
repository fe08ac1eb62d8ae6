//! Domain layer: identifiers, accounts, transactions, and the shared stores.
//!
//! This module contains the authoritative in-memory state of the ledger:
//! the [`AccountStore`] with per-account locking, the append-only
//! [`TransactionJournal`], and the [`IdempotencyCache`] that deduplicates
//! retried mutating requests.

pub mod account;
pub mod account_store;
pub mod clock;
pub mod idempotency;
pub mod ids;
pub mod journal;
pub mod transaction;

pub use account::{Account, AccountSeed, AccountStatus, Actor, DailyMintWindow, Role};
pub use account_store::{AccountStore, LockedAccounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use idempotency::{Begin, IdempotencyCache, Outcome, Reservation};
pub use ids::{AccountId, TransactionId};
pub use journal::TransactionJournal;
pub use transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionStatus, TransactionType,
};
