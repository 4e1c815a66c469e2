//! Resilient fetch gateway around one quote source.
//!
//! Wraps every upstream call with bounded retry and a circuit breaker.
//! When the source stays down (retries exhausted or breaker open), the
//! gateway serves the most recently persisted aggregated quotes re-shaped
//! into per-source quotes: degraded service returns a stale but
//! internally consistent price instead of failing the aggregation cycle.
//!
//! `fetch` never returns an error: transient upstream failures are fully
//! absorbed here and never reach the aggregator.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::models::{QuoteSourceId, SourceQuote};
use crate::resilience::{CircuitBreaker, ExponentialBackoff, RetryPolicy};
use crate::sources::QuoteSource;
use crate::store::Store;

/// Retry + circuit breaker + fallback around one [`QuoteSource`].
pub struct QuoteGateway {
    source: Arc<dyn QuoteSource>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    store: Store,
}

impl QuoteGateway {
    /// Create a gateway for one source.
    #[must_use]
    pub fn new(
        source: Arc<dyn QuoteSource>,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
        store: Store,
    ) -> Self {
        Self {
            source,
            breaker,
            retry,
            store,
        }
    }

    /// Which source this gateway fronts.
    #[must_use]
    pub fn source_id(&self) -> QuoteSourceId {
        self.source.id()
    }

    /// The breaker guarding this source.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch quotes for the given symbols, absorbing all failures.
    ///
    /// The happy path hits the upstream once. Transient failures are
    /// retried per policy, with each attempt recorded on the breaker; if
    /// the breaker opens mid-retry the loop stops early. Exhaustion and an
    /// open breaker both resolve to the stored-quote fallback.
    pub async fn fetch(&self, symbols: &[String]) -> Vec<SourceQuote> {
        let source_id = self.source.id();

        if !self.breaker.is_call_permitted() {
            warn!(
                source = %source_id,
                state = %self.breaker.state(),
                "circuit open, serving stored quotes"
            );
            return self.fallback(symbols).await;
        }

        let mut backoff = ExponentialBackoff::new(&self.retry);
        loop {
            match self.source.fetch(symbols).await {
                Ok(quotes) => {
                    self.breaker.record_success();
                    debug!(source = %source_id, count = quotes.len(), "fetched quotes");
                    return quotes;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    match backoff.next_backoff() {
                        Some(delay) if self.breaker.is_call_permitted() => {
                            warn!(
                                source = %source_id,
                                error = %e,
                                delay_ms = delay.as_millis(),
                                attempt = backoff.attempts(),
                                "source fetch failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        _ => {
                            error!(
                                source = %source_id,
                                error = %e,
                                attempts = backoff.attempts() + 1,
                                "source fetch failed, serving stored quotes"
                            );
                            return self.fallback(symbols).await;
                        }
                    }
                }
            }
        }
    }

    /// Re-shape the latest persisted aggregated quotes into source-tagged
    /// quotes for the requested symbols.
    async fn fallback(&self, symbols: &[String]) -> Vec<SourceQuote> {
        let source_id = self.source.id();
        match self.store.latest_quotes(symbols).await {
            Ok(stored) => {
                if stored.is_empty() {
                    warn!(source = %source_id, "no stored quotes available for fallback");
                }
                stored
                    .into_iter()
                    .map(|quote| SourceQuote {
                        symbol: quote.symbol,
                        bid: Some(quote.best_bid),
                        ask: Some(quote.best_ask),
                        source: source_id,
                    })
                    .collect()
            }
            Err(e) => {
                error!(source = %source_id, error = %e, "fallback read failed");
                Vec::new()
            }
        }
    }
}
