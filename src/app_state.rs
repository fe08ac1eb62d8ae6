//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::service::{LedgerEngine, MintService, QueryService, RecoveryService, TransferService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Balance mutation core, shared by every service.
    pub engine: Arc<LedgerEngine>,
    /// Manual, bulk and requested transfers; approvals and reversals.
    pub transfers: Arc<TransferService>,
    /// Bans, verification and chip recovery.
    pub recovery: Arc<RecoveryService>,
    /// Daily mint.
    pub mint: Arc<MintService>,
    /// Read-only views.
    pub queries: Arc<QueryService>,
}

impl AppState {
    /// Wires every service around `engine` using the configured limits.
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>, config: &LedgerConfig) -> Self {
        let retention = config.idempotency_retention();
        Self {
            transfers: Arc::new(TransferService::new(Arc::clone(&engine), retention)),
            recovery: Arc::new(RecoveryService::new(Arc::clone(&engine), retention)),
            mint: Arc::new(MintService::new(
                Arc::clone(&engine),
                config.daily_mint_amount,
                config.daily_mint_window(),
                retention,
            )),
            queries: Arc::new(QueryService::new(Arc::clone(&engine))),
            engine,
        }
    }

    /// Drops expired idempotency records from every service; returns how
    /// many were removed.
    pub fn evict_expired_idempotency(&self) -> usize {
        self.transfers.evict_expired() + self.recovery.evict_expired() + self.mint.evict_expired()
    }
}
