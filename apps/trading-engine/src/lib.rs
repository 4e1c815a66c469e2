// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Trading Engine - Core Library
//!
//! Price aggregation and trade settlement engine:
//!
//! - **Sources** fetch bid/ask quotes from external exchanges and map them
//!   into a canonical shape.
//! - The **gateway** wraps each source with bounded retry, a circuit
//!   breaker and a stored-quote fallback, so unreliable upstreams never
//!   abort an aggregation cycle.
//! - The **aggregator** merges per-source quotes into one best price per
//!   symbol (max bid / min ask) on a fixed schedule and appends it to the
//!   quote history.
//! - The **settlement engine** converts a trade request into a priced,
//!   balance-checked, atomically-applied ledger mutation with exactly-once
//!   economic effect per logical order (idempotency keys, ordered wallet
//!   locks, compare-and-swap version checks with bounded retry).
//! - The **store** persists quote history, the wallet ledger and immutable
//!   trade records in SQLite.
//! - The **server** exposes the thin REST surface over it all.

#![warn(missing_docs)]

/// Price aggregation and its scheduler.
pub mod aggregator;

/// Configuration loading and validation.
pub mod config;

/// Resilient fetch gateway around each quote source.
pub mod gateway;

/// Core data types.
pub mod models;

/// Retry and circuit breaker primitives.
pub mod resilience;

/// Inbound REST surface.
pub mod server;

/// Trade settlement engine.
pub mod settlement;

/// External quote source adapters.
pub mod sources;

/// SQLite persistence.
pub mod store;

pub use aggregator::{AggregationScheduler, PriceAggregator};
pub use gateway::QuoteGateway;
pub use models::{
    AggregatedQuote, QuoteSourceId, SourceQuote, Trade, TradeRequest, TradeResult, TradeSide,
    User, WalletBalance,
};
pub use settlement::{SettlementEngine, SettlementError};
pub use store::{Store, StoreError};
