//! Wallet ledger queries: balance reads and compare-and-swap updates.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};

use super::{Store, StoreError, decimal_column};
use crate::models::WalletBalance;

impl Store {
    /// All balances for a user, ordered by currency.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn wallets_for_user(&self, user_id: i64) -> Result<Vec<WalletBalance>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, currency, balance, version, updated_at
            FROM wallet_balances
            WHERE user_id = ?
            ORDER BY currency
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_wallet).collect()
    }

    /// One (user, currency) balance row, if provisioned.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn wallet(
        &self,
        user_id: i64,
        currency: &str,
    ) -> Result<Option<WalletBalance>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, currency, balance, version, updated_at
            FROM wallet_balances
            WHERE user_id = ? AND currency = ?
            ",
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_wallet(&r)).transpose()
    }

    /// Provision a wallet row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn create_wallet(
        &self,
        user_id: i64,
        currency: &str,
        balance: Decimal,
    ) -> Result<WalletBalance, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO wallet_balances (user_id, currency, balance, version, updated_at)
            VALUES (?, ?, ?, 0, ?)
            ",
        )
        .bind(user_id)
        .bind(currency)
        .bind(balance.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(WalletBalance {
            id: result.last_insert_rowid(),
            user_id,
            currency: currency.to_string(),
            balance,
            version: 0,
            updated_at: now,
        })
    }

    /// Compare-and-swap update of one wallet balance inside a transaction.
    ///
    /// The update only applies if the row still carries the version the
    /// caller read; otherwise another settlement committed in between and
    /// [`StoreError::VersionConflict`] is returned so the caller can retry
    /// from the top.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] on a lost update, or a
    /// [`StoreError`] on query failure.
    pub async fn update_wallet_balance(
        tx: &mut Transaction<'static, Sqlite>,
        wallet: &WalletBalance,
        new_balance: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE wallet_balances
            SET balance = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            ",
        )
        .bind(new_balance.to_string())
        .bind(Utc::now())
        .bind(wallet.id)
        .bind(wallet.version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                wallet_id: wallet.id,
            });
        }

        Ok(())
    }
}

fn row_to_wallet(row: &SqliteRow) -> Result<WalletBalance, StoreError> {
    Ok(WalletBalance {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        currency: row.try_get("currency")?,
        balance: decimal_column(row, "balance")?,
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}
