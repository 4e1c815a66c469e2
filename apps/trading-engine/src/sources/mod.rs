//! External quote source adapters.
//!
//! One adapter per upstream exchange. Each adapter issues a single
//! read-only HTTP call for the full ticker list, decodes the exchange's
//! wire format, filters to the supported symbol set, and maps into the
//! canonical [`SourceQuote`] shape. Resilience (retry, circuit breaking,
//! fallback) lives one layer up in the fetch gateway.

mod binance;
mod huobi;
mod mock;

pub use binance::BinanceSource;
pub use huobi::HuobiSource;
pub use mock::MockQuoteSource;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{QuoteSourceId, SourceQuote};

/// Failure fetching from one upstream source.
///
/// All variants are transient from the gateway's point of view: an empty or
/// malformed payload is retried and then falls back exactly like a network
/// error, never treated as "no data".
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level failure (connect, reset, timeout, HTTP error status).
    #[error("transport error: {0}")]
    Transport(String),
    /// Payload decoded but did not match the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// Upstream answered with a null or empty payload.
    #[error("empty payload")]
    EmptyPayload,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A single external price source.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable identifier for logging, breaker naming and fallback tagging.
    fn id(&self) -> QuoteSourceId;

    /// Fetch current quotes for the given symbols.
    ///
    /// The upstream call is a stateless, idempotent read; callers may retry
    /// it verbatim. Symbols the upstream does not know are simply absent
    /// from the result.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] on transport failures or undecodable /
    /// empty payloads.
    async fn fetch(&self, symbols: &[String]) -> Result<Vec<SourceQuote>, SourceError>;
}
