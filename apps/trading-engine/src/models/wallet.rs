//! Wallet ledger and user types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One (user, currency) balance row of the wallet ledger.
///
/// Mutated exclusively by the settlement engine under lock. `version` is the
/// optimistic concurrency token: every committed update increments it, and a
/// writer that observes a stale version loses the compare-and-swap.
/// `balance` never goes below zero after a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Row id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Currency code, upper case (e.g. `USDT`, `BTC`).
    pub currency: String,
    /// Current balance.
    pub balance: Decimal,
    /// Optimistic concurrency token.
    pub version: i64,
    /// Last committed update.
    pub updated_at: DateTime<Utc>,
}

/// Account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Unique username.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
}
