//! Persistence layer: PostgreSQL account and journal storage.
//!
//! The in-memory ledger is authoritative while the process runs. When
//! persistence is enabled, every committed change is queued on an ordered
//! write-behind channel ([`writer`]) and upserted by [`postgres`]; on
//! startup the stored accounts and journal are reloaded.

pub mod models;
pub mod postgres;
pub mod writer;

pub use postgres::PostgresPersistence;
pub use writer::{PersistCommand, PersistenceHandle, spawn_writer};
