//! Trade record queries: insert, idempotency lookup, paginated history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};

use super::{Store, StoreError, decimal_column};
use crate::models::{Trade, TradeSide};

/// One page of a user's trade history, newest first.
#[derive(Debug, Clone)]
pub struct TradePage {
    /// Trades in this page.
    pub trades: Vec<Trade>,
    /// Zero-based page index.
    pub page: u32,
    /// Page size requested.
    pub page_size: u32,
    /// Total matching trades across all pages.
    pub total: u64,
}

impl TradePage {
    /// Number of pages at the requested page size.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

impl Store {
    /// Insert the immutable trade row inside the settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateClientOrderId`] when the unique
    /// constraint on `client_order_id` fires (a concurrent replay won the
    /// race), or a [`StoreError`] on other query failures.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_trade(
        tx: &mut Transaction<'static, Sqlite>,
        user_id: i64,
        symbol: &str,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
        total_amount: Decimal,
        created_at: DateTime<Utc>,
        client_order_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO trades (user_id, symbol, side, price, quantity, total_amount, created_at, client_order_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(side.to_string())
        .bind(price.to_string())
        .bind(quantity.to_string())
        .bind(total_amount.to_string())
        .bind(created_at)
        .bind(client_order_id)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) => {
                let unique_violation = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if unique_violation && let Some(id) = client_order_id {
                    return Err(StoreError::DuplicateClientOrderId(id.to_string()));
                }
                Err(e.into())
            }
        }
    }

    /// Look up a trade by its idempotency key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn trade_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, symbol, side, price, quantity, total_amount, created_at, client_order_id
            FROM trades
            WHERE client_order_id = ?
            ",
        )
        .bind(client_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_trade(&r)).transpose()
    }

    /// Paginated trade history for a user, newest first, optionally
    /// filtered by symbol.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn trades_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
        symbol: Option<&str>,
    ) -> Result<TradePage, StoreError> {
        let (count_sql, list_sql) = if symbol.is_some() {
            (
                "SELECT COUNT(*) AS n FROM trades WHERE user_id = ? AND symbol = ?",
                r"
                SELECT id, user_id, symbol, side, price, quantity, total_amount, created_at, client_order_id
                FROM trades
                WHERE user_id = ? AND symbol = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                ",
            )
        } else {
            (
                "SELECT COUNT(*) AS n FROM trades WHERE user_id = ?",
                r"
                SELECT id, user_id, symbol, side, price, quantity, total_amount, created_at, client_order_id
                FROM trades
                WHERE user_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                ",
            )
        };

        let mut count_query = sqlx::query(count_sql).bind(user_id);
        let mut list_query = sqlx::query(list_sql).bind(user_id);
        if let Some(symbol) = symbol {
            count_query = count_query.bind(symbol);
            list_query = list_query.bind(symbol);
        }

        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("n")?;

        let offset = i64::from(page) * i64::from(page_size);
        let rows = list_query
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let trades = rows
            .iter()
            .map(row_to_trade)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TradePage {
            trades,
            page,
            page_size,
            total: total.max(0) as u64,
        })
    }
}

fn row_to_trade(row: &SqliteRow) -> Result<Trade, StoreError> {
    let side_raw: String = row.try_get("side")?;
    let side = match side_raw.as_str() {
        "BUY" => TradeSide::Buy,
        "SELL" => TradeSide::Sell,
        _ => {
            return Err(StoreError::Corrupt {
                column: "side",
                value: side_raw,
            });
        }
    };

    Ok(Trade {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        symbol: row.try_get("symbol")?,
        side,
        price: decimal_column(row, "price")?,
        quantity: decimal_column(row, "quantity")?,
        total_amount: decimal_column(row, "total_amount")?,
        created_at: row.try_get("created_at")?,
        client_order_id: row.try_get("client_order_id")?,
    })
}
