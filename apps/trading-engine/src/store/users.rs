//! User queries and first-run seed data.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::info;

use super::{Store, StoreError};
use crate::models::User;

impl Store {
    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn user_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, email, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, email, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn create_user(&self, username: &str, email: &str) -> Result<User, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, email, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            created_at: now,
        })
    }

    /// Create the default user and wallets on first run. Idempotent: does
    /// nothing when the username already exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn ensure_seed_data(
        &self,
        username: &str,
        email: &str,
        balances: &[(String, Decimal)],
    ) -> Result<(), StoreError> {
        if self.user_by_username(username).await?.is_some() {
            info!(username, "seed user already exists, skipping initialization");
            return Ok(());
        }

        let user = self.create_user(username, email).await?;
        info!(user_id = user.id, username, "created seed user");

        for (currency, balance) in balances {
            self.create_wallet(user.id, currency, *balance).await?;
            info!(user_id = user.id, currency = %currency, balance = %balance, "created seed wallet");
        }

        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}
