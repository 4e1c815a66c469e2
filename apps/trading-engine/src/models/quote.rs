//! Quote types: per-source quotes and the aggregated best price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of an external quote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSourceId {
    /// Binance book-ticker API.
    Binance,
    /// Huobi market-tickers API.
    Huobi,
}

impl QuoteSourceId {
    /// Stable lowercase name, used in logs and breaker identification.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Huobi => "huobi",
        }
    }
}

impl std::fmt::Display for QuoteSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One source's view of a symbol at fetch time.
///
/// Ephemeral: produced per fetch cycle, never persisted individually.
/// Either side may be missing when the upstream omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuote {
    /// Trading pair, upper case (e.g. `BTCUSDT`).
    pub symbol: String,
    /// Bid price, if the source reported one.
    pub bid: Option<Decimal>,
    /// Ask price, if the source reported one.
    pub ask: Option<Decimal>,
    /// Which upstream produced this quote.
    pub source: QuoteSourceId,
}

/// The system's authoritative price for a symbol at a point in time.
///
/// `best_bid` is the maximum bid and `best_ask` the minimum ask across all
/// sources with valid data for the cycle. Rows are append-only: written once
/// per aggregation cycle, never updated or deleted. A crossed market
/// (`best_bid > best_ask`) is persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedQuote {
    /// Row id.
    pub id: i64,
    /// Trading pair.
    pub symbol: String,
    /// Best (maximum) bid across sources.
    pub best_bid: Decimal,
    /// Best (minimum) ask across sources.
    pub best_ask: Decimal,
    /// When the aggregation was computed.
    pub timestamp: DateTime<Utc>,
}
