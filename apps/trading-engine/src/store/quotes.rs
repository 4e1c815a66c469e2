//! Aggregated quote queries: append-only history, latest-by-symbol reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{Store, StoreError, decimal_column};
use crate::models::AggregatedQuote;

impl Store {
    /// Append one aggregated quote row. Rows are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn insert_aggregated_quote(
        &self,
        symbol: &str,
        best_bid: Decimal,
        best_ask: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<AggregatedQuote, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO aggregated_quotes (symbol, best_bid, best_ask, timestamp)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(symbol)
        .bind(best_bid.to_string())
        .bind(best_ask.to_string())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(AggregatedQuote {
            id: result.last_insert_rowid(),
            symbol: symbol.to_string(),
            best_bid,
            best_ask,
            timestamp,
        })
    }

    /// Most recent aggregated quote for a symbol, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn latest_quote(&self, symbol: &str) -> Result<Option<AggregatedQuote>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, symbol, best_bid, best_ask, timestamp
            FROM aggregated_quotes
            WHERE symbol = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_quote(&r)).transpose()
    }

    /// Most recent aggregated quote per requested symbol.
    ///
    /// Returns at most one row per symbol; symbols with no history are
    /// simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure or corrupt stored values.
    pub async fn latest_quotes(
        &self,
        symbols: &[String],
    ) -> Result<Vec<AggregatedQuote>, StoreError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        // Rows are append-only, so the max id per symbol is the newest row.
        let placeholders = vec!["?"; symbols.len()].join(", ");
        let sql = format!(
            r"
            SELECT q.id, q.symbol, q.best_bid, q.best_ask, q.timestamp
            FROM aggregated_quotes q
            JOIN (
                SELECT symbol, MAX(id) AS latest_id
                FROM aggregated_quotes
                WHERE symbol IN ({placeholders})
                GROUP BY symbol
            ) latest ON q.id = latest.latest_id
            ORDER BY q.symbol
            "
        );

        let mut query = sqlx::query(&sql);
        for symbol in symbols {
            query = query.bind(symbol);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_quote).collect()
    }
}

fn row_to_quote(row: &SqliteRow) -> Result<AggregatedQuote, StoreError> {
    Ok(AggregatedQuote {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        best_bid: decimal_column(row, "best_bid")?,
        best_ask: decimal_column(row, "best_ask")?,
        timestamp: row.try_get("timestamp")?,
    })
}
