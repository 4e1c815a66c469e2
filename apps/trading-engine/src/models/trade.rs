//! Trade types: settlement requests, executed trades, and trade economics.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::AggregatedQuote;

/// Number of fractional digits carried by monetary amounts.
pub const AMOUNT_SCALE: u32 = 8;

/// Maximum order quantity.
const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Maximum integer digits in a quantity.
const MAX_INTEGER_DIGITS: usize = 10;

/// Maximum length of a client-supplied order id.
const MAX_CLIENT_ORDER_ID_LEN: usize = 50;

/// Side of a trade from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    /// Buy the base currency, pay in the quote currency.
    Buy,
    /// Sell the base currency, receive the quote currency.
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Inbound settlement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// User placing the order.
    pub user_id: i64,
    /// Trading pair, upper case.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Quantity of base currency.
    pub quantity: Decimal,
    /// Optional idempotency key. Replaying a request with the same id
    /// returns the original result without further economic effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl TradeRequest {
    /// Validate the request against the configured quote currency.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violated rule.
    pub fn validate(&self, quote_currency: &str) -> Result<(), String> {
        if self.user_id <= 0 {
            return Err("user_id must be positive".to_string());
        }
        if self.symbol.trim().is_empty() {
            return Err("symbol is required".to_string());
        }
        base_currency_of(&self.symbol, quote_currency)?;
        if self.quantity <= Decimal::ZERO {
            return Err("quantity must be greater than zero".to_string());
        }
        if self.quantity > MAX_QUANTITY {
            return Err("quantity cannot exceed 1,000,000".to_string());
        }
        if self.quantity.normalize().scale() > AMOUNT_SCALE {
            return Err(format!(
                "quantity can have at most {AMOUNT_SCALE} decimal places"
            ));
        }
        if self.quantity.trunc().to_string().len() > MAX_INTEGER_DIGITS {
            return Err(format!(
                "quantity can have at most {MAX_INTEGER_DIGITS} integer digits"
            ));
        }
        if let Some(id) = &self.client_order_id {
            if id.len() > MAX_CLIENT_ORDER_ID_LEN {
                return Err(format!(
                    "client_order_id cannot exceed {MAX_CLIENT_ORDER_ID_LEN} characters"
                ));
            }
        }
        Ok(())
    }
}

/// Derive the base currency from a symbol by stripping the quote-currency
/// suffix (`BTCUSDT` with quote currency `USDT` yields `BTC`).
///
/// All supported symbols share the one configured quote currency.
///
/// # Errors
///
/// Returns an error when the symbol does not end with the quote currency,
/// strips to nothing, or strips to the quote currency itself.
pub fn base_currency_of(symbol: &str, quote_currency: &str) -> Result<String, String> {
    let base = symbol.strip_suffix(quote_currency).ok_or_else(|| {
        format!("symbol {symbol} is not quoted in {quote_currency}")
    })?;
    if base.is_empty() || base == quote_currency {
        return Err(format!("symbol {symbol} has no valid base currency"));
    }
    Ok(base.to_string())
}

/// Price and total amount computed for a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeEconomics {
    /// Executed price: best ask for buys, best bid for sells.
    pub price: Decimal,
    /// `price * quantity`, rounded half-up to [`AMOUNT_SCALE`] digits.
    pub total_amount: Decimal,
}

impl TradeEconomics {
    /// Price a trade against the latest aggregated quote.
    #[must_use]
    pub fn from_quote(side: TradeSide, quantity: Decimal, quote: &AggregatedQuote) -> Self {
        let price = match side {
            TradeSide::Buy => quote.best_ask,
            TradeSide::Sell => quote.best_bid,
        };
        let total_amount = (price * quantity)
            .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        Self {
            price,
            total_amount,
        }
    }
}

/// Immutable record of one executed settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Row id.
    pub id: i64,
    /// User the trade belongs to.
    pub user_id: i64,
    /// Trading pair.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Executed price.
    pub price: Decimal,
    /// Quantity of base currency.
    pub quantity: Decimal,
    /// `price * quantity`, rounded half-up to 8 decimals.
    pub total_amount: Decimal,
    /// When the settlement committed.
    pub created_at: DateTime<Utc>,
    /// Idempotency key, unique across all trades when present.
    pub client_order_id: Option<String>,
}

/// Outcome of a successful (or idempotently replayed) settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    /// Persisted trade id.
    pub trade_id: i64,
    /// User the trade belongs to.
    pub user_id: i64,
    /// Trading pair.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Executed price.
    pub price: Decimal,
    /// Quantity of base currency.
    pub quantity: Decimal,
    /// Total quote-currency amount moved.
    pub total_amount: Decimal,
    /// When the settlement committed.
    pub created_at: DateTime<Utc>,
    /// Echoed idempotency key.
    pub client_order_id: Option<String>,
    /// Quote-currency balance after settlement.
    pub quote_balance: Decimal,
    /// Base-currency balance after settlement.
    pub base_balance: Decimal,
    /// Base currency the balances above refer to.
    pub base_currency: String,
}
