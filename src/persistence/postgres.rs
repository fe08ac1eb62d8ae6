//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{AccountRow, TransactionRow};
use crate::config::LedgerConfig;
use crate::domain::{Account, Transaction};
use crate::error::LedgerError;

fn db_error(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Persistence(e.to_string())
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(db_error)?;
        Ok(Self::new(pool))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(db_error)
    }

    /// Inserts or replaces an account row.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] on database failure.
    pub async fn upsert_account(&self, account: &Account) -> Result<(), LedgerError> {
        let row = AccountRow::try_from(account)?;
        sqlx::query(
            "INSERT INTO accounts (id, display_name, email, role, balance, status, verified, \
             verified_at, ban_reason, banned_at, last_mint_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name, \
             email = EXCLUDED.email, role = EXCLUDED.role, balance = EXCLUDED.balance, \
             status = EXCLUDED.status, verified = EXCLUDED.verified, \
             verified_at = EXCLUDED.verified_at, ban_reason = EXCLUDED.ban_reason, \
             banned_at = EXCLUDED.banned_at, last_mint_at = EXCLUDED.last_mint_at",
        )
        .bind(row.id)
        .bind(row.display_name)
        .bind(row.email)
        .bind(row.role)
        .bind(row.balance)
        .bind(row.status)
        .bind(row.verified)
        .bind(row.verified_at)
        .bind(row.ban_reason)
        .bind(row.banned_at)
        .bind(row.last_mint_at)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Inserts a transaction row, or updates its mutable columns if it is
    /// already stored.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] on database failure.
    pub async fn upsert_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let row = TransactionRow::try_from(tx)?;
        sqlx::query(
            "INSERT INTO transactions (id, from_account_id, to_account_id, amount, kind, status, \
             reason, created_at, created_by, decided_by, decided_at, decision_reason, \
             related_transaction_id, reversed_by, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, \
             decided_by = EXCLUDED.decided_by, decided_at = EXCLUDED.decided_at, \
             decision_reason = EXCLUDED.decision_reason, reversed_by = EXCLUDED.reversed_by",
        )
        .bind(row.id)
        .bind(row.from_account_id)
        .bind(row.to_account_id)
        .bind(row.amount)
        .bind(row.kind)
        .bind(row.status)
        .bind(row.reason)
        .bind(row.created_at)
        .bind(row.created_by)
        .bind(row.decided_by)
        .bind(row.decided_at)
        .bind(row.decision_reason)
        .bind(row.related_transaction_id)
        .bind(row.reversed_by)
        .bind(row.idempotency_key)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Loads every stored account.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] on database failure or if a
    /// row holds a value the domain cannot represent.
    pub async fn load_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, display_name, email, role, balance, status, verified, verified_at, \
             ban_reason, banned_at, last_mint_at, created_at FROM accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Account::try_from).collect()
    }

    /// Loads every stored transaction in journal order.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Persistence`] on database failure or if a
    /// row holds a value the domain cannot represent.
    pub async fn load_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, from_account_id, to_account_id, amount, kind, status, reason, created_at, \
             created_by, decided_by, decided_at, decision_reason, related_transaction_id, \
             reversed_by, idempotency_key FROM transactions ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}
