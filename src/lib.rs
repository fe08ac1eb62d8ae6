//! # chip-ledger
//!
//! Ledger and transfer-workflow engine for a virtual chip economy, served
//! over a REST API.
//!
//! Every account balance lives in memory behind a per-account lock; every
//! balance change is journaled as a [`domain::Transaction`] in the same
//! critical section that applies it. Admins move chips directly, players
//! file transfer requests for approval, anyone can claim a daily mint once
//! per window, and chips stranded in banned accounts can be recovered.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers + identity extractors (api/)
//!     │
//!     ├── TransferService / RecoveryService / MintService / QueryService (service/)
//!     ├── LedgerEngine (service/)
//!     │
//!     ├── AccountStore, TransactionJournal, IdempotencyCache (domain/)
//!     │
//!     └── PostgreSQL write-behind (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
