//! chip-ledger server entry point.
//!
//! Loads configuration, restores or seeds the ledger, and starts the Axum
//! HTTP server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use chip_ledger::api;
use chip_ledger::app_state::AppState;
use chip_ledger::config::{LedgerConfig, LogFormat};
use chip_ledger::domain::{AccountSeed, AccountStore, Clock, SystemClock, TransactionJournal};
use chip_ledger::persistence::{PersistenceHandle, PostgresPersistence, spawn_writer};
use chip_ledger::service::LedgerEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting chip-ledger");

    // Build domain layer
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let accounts = Arc::new(AccountStore::new(config.lock_timeout()));
    let journal = Arc::new(TransactionJournal::new(config.lock_timeout()));

    let persistence = if config.persistence_enabled {
        Some(restore(&config, &accounts, &journal).await?)
    } else {
        None
    };
    if let Some(path) = &config.accounts_seed_path {
        seed(path, &accounts, clock.as_ref(), persistence.as_ref()).await?;
    }

    // Build service layer
    let engine = Arc::new(LedgerEngine::new(accounts, journal, clock, persistence));
    let state = AppState::new(engine, &config);
    spawn_idempotency_sweeper(state.clone(), config.idempotency_sweep_interval_secs);

    let app = api::build_app(state, &config);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Loads the last persisted state and starts the write-behind task.
async fn restore(
    config: &LedgerConfig,
    accounts: &AccountStore,
    journal: &TransactionJournal,
) -> anyhow::Result<PersistenceHandle> {
    let store = PostgresPersistence::connect(config).await?;
    store.migrate().await?;

    let loaded = store.load_accounts().await?;
    let account_count = loaded.len();
    for account in loaded {
        accounts.insert(account).await?;
    }
    let loaded = store.load_transactions().await?;
    let tx_count = loaded.len();
    for tx in loaded {
        journal.append(tx).await?;
    }
    tracing::info!(
        accounts = account_count,
        transactions = tx_count,
        "ledger restored from database"
    );

    let (handle, _writer) = spawn_writer(store);
    Ok(handle)
}

/// Provisions accounts from a JSON seed file.
///
/// Accounts already present (restored from the database) are left alone;
/// new ones are queued for persistence when it is enabled.
async fn seed(
    path: &Path,
    accounts: &AccountStore,
    clock: &dyn Clock,
    persistence: Option<&PersistenceHandle>,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let seeds: Vec<AccountSeed> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    let created = accounts.provision(seeds, clock.now()).await?;
    if let Some(p) = persistence {
        for account in &created {
            p.record_account(account);
        }
    }
    tracing::info!(accounts = created.len(), path = %path.display(), "accounts seeded");
    Ok(())
}

fn spawn_idempotency_sweeper(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = state.evict_expired_idempotency();
            if evicted > 0 {
                tracing::debug!(evicted, "expired idempotency records dropped");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
