//! Core data types shared across the engine.

mod quote;
mod trade;
mod wallet;

pub use quote::{AggregatedQuote, QuoteSourceId, SourceQuote};
pub use trade::{
    Trade, TradeEconomics, TradeRequest, TradeResult, TradeSide, base_currency_of,
};
pub use wallet::{User, WalletBalance};
