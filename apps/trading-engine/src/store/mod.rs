//! SQLite persistence for quotes, wallets, trades and users.
//!
//! The store owns the connection pool and exposes one query surface per
//! table family. Monetary values are stored as TEXT and parsed back into
//! [`rust_decimal::Decimal`]; the SQLite driver has no native decimal type
//! and floats are not acceptable for ledger math.
//!
//! Concurrency model: wallet rows carry a `version` column updated via
//! compare-and-swap (`UPDATE ... WHERE id = ? AND version = ?`); a CAS that
//! affects zero rows reports [`StoreError::VersionConflict`] and the caller
//! retries the whole settlement. Aggregated quotes are append-only and read
//! without locking.

mod quotes;
mod trades;
mod users;
mod wallets;

pub use trades::TradePage;

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use thiserror::Error;
use tracing::info;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or query failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A wallet CAS update observed a stale version.
    #[error("version conflict updating wallet {wallet_id}")]
    VersionConflict {
        /// The wallet row that lost the compare-and-swap.
        wallet_id: i64,
    },

    /// A trade insert hit the unique client-order-id constraint.
    #[error("duplicate client order id: {0}")]
    DuplicateClientOrderId(String),

    /// A stored value could not be decoded.
    #[error("corrupt {column} value: {value}")]
    Corrupt {
        /// Column the value came from.
        column: &'static str,
        /// The undecodable raw text.
        value: String,
    },
}

/// Handle to the SQLite database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file and initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database cannot be opened or the
    /// schema statements fail.
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(db_path, "sqlite store opened");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database (tests).
    ///
    /// A single connection is used so that every query sees the same
    /// in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the connection or schema setup fails.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS wallet_balances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                currency TEXT NOT NULL,
                balance TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, currency)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS aggregated_quotes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                best_bid TEXT NOT NULL,
                best_ask TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_aggregated_quotes_symbol_ts
            ON aggregated_quotes (symbol, timestamp DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                created_at TEXT NOT NULL,
                client_order_id TEXT UNIQUE
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_trades_user_created
            ON trades (user_id, created_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Decode a decimal stored as TEXT.
fn decimal_column(row: &SqliteRow, column: &'static str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse::<Decimal>().map_err(|_| StoreError::Corrupt {
        column,
        value: raw,
    })
}
