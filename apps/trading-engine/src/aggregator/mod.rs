//! Price aggregation: merge per-source quotes into one best price per
//! symbol and append it to the quote history.

mod scheduler;

pub use scheduler::AggregationScheduler;

use std::collections::HashMap;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::gateway::QuoteGateway;
use crate::models::{AggregatedQuote, SourceQuote};
use crate::store::{Store, StoreError};

/// Per-symbol aggregation failure. Absorbed by the cycle, never propagated.
#[derive(Debug, Error)]
enum AggregationError {
    #[error("no valid bid prices for {0}")]
    NoBids(String),
    #[error("no valid ask prices for {0}")]
    NoAsks(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Merges quotes from all gateways and persists the best price per symbol.
pub struct PriceAggregator {
    gateways: Vec<QuoteGateway>,
    store: Store,
    symbols: Vec<String>,
}

impl PriceAggregator {
    /// Create an aggregator over the configured gateways and symbols.
    #[must_use]
    pub fn new(gateways: Vec<QuoteGateway>, store: Store, symbols: Vec<String>) -> Self {
        Self {
            gateways,
            store,
            symbols,
        }
    }

    /// Symbols this aggregator produces prices for.
    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Run one aggregation cycle.
    ///
    /// Each source is fetched through its gateway, so a failing source
    /// degrades to stored quotes (or nothing) without affecting the others.
    /// Per-symbol failures are logged and skipped; this function never
    /// returns an error to the scheduler.
    pub async fn aggregate_and_store(&self) {
        info!("starting price aggregation cycle");

        let fetches = self
            .gateways
            .iter()
            .map(|gateway| gateway.fetch(&self.symbols));
        let all_quotes: Vec<SourceQuote> = join_all(fetches).await.into_iter().flatten().collect();

        if all_quotes.is_empty() {
            warn!("no quotes received from any source");
            return;
        }

        let mut by_symbol: HashMap<&str, Vec<&SourceQuote>> = HashMap::new();
        for quote in &all_quotes {
            by_symbol.entry(quote.symbol.as_str()).or_default().push(quote);
        }

        for symbol in &self.symbols {
            let Some(quotes) = by_symbol.get(symbol.as_str()) else {
                warn!(symbol = %symbol, "no quotes for symbol, skipping");
                continue;
            };

            match self.aggregate_symbol(symbol, quotes).await {
                Ok(aggregated) => {
                    info!(
                        symbol = %symbol,
                        best_bid = %aggregated.best_bid,
                        best_ask = %aggregated.best_ask,
                        sources = quotes.len(),
                        "saved aggregated quote"
                    );
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "failed to aggregate symbol");
                }
            }
        }

        info!("price aggregation cycle completed");
    }

    /// Latest aggregated quote for one symbol.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn latest(&self, symbol: &str) -> Result<Option<AggregatedQuote>, StoreError> {
        self.store.latest_quote(symbol).await
    }

    /// Latest aggregated quote per symbol for a batch.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on query failure.
    pub async fn latest_batch(
        &self,
        symbols: &[String],
    ) -> Result<Vec<AggregatedQuote>, StoreError> {
        self.store.latest_quotes(symbols).await
    }

    async fn aggregate_symbol(
        &self,
        symbol: &str,
        quotes: &[&SourceQuote],
    ) -> Result<AggregatedQuote, AggregationError> {
        let (best_bid, best_ask) = best_prices(symbol, quotes)?;

        if best_bid > best_ask {
            warn!(
                symbol = %symbol,
                best_bid = %best_bid,
                best_ask = %best_ask,
                "crossed market, persisting anyway"
            );
        }

        let quote = self
            .store
            .insert_aggregated_quote(symbol, best_bid, best_ask, Utc::now())
            .await?;
        Ok(quote)
    }
}

/// Best bid is the maximum bid, best ask the minimum ask, each over the
/// quotes that actually carry that side.
fn best_prices(
    symbol: &str,
    quotes: &[&SourceQuote],
) -> Result<(Decimal, Decimal), AggregationError> {
    let best_bid = quotes
        .iter()
        .filter_map(|quote| quote.bid)
        .max()
        .ok_or_else(|| AggregationError::NoBids(symbol.to_string()))?;

    let best_ask = quotes
        .iter()
        .filter_map(|quote| quote.ask)
        .min()
        .ok_or_else(|| AggregationError::NoAsks(symbol.to_string()))?;

    Ok((best_bid, best_ask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuoteSourceId;
    use crate::resilience::{BreakerConfig, CircuitBreaker, RetryPolicy};
    use crate::sources::{MockQuoteSource, QuoteSource, SourceError};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn quote(
        symbol: &str,
        bid: Option<Decimal>,
        ask: Option<Decimal>,
        source: QuoteSourceId,
    ) -> SourceQuote {
        SourceQuote {
            symbol: symbol.to_string(),
            bid,
            ask,
            source,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn gateway(source: Arc<MockQuoteSource>, store: Store, name: &'static str) -> QuoteGateway {
        QuoteGateway::new(
            source,
            CircuitBreaker::new(name, BreakerConfig::default()),
            fast_retry(),
            store,
        )
    }

    fn aggregator_with(
        store: &Store,
        sources: Vec<Arc<MockQuoteSource>>,
        symbols: Vec<String>,
    ) -> PriceAggregator {
        let gateways = sources
            .into_iter()
            .map(|source| {
                let name = source.id().as_str();
                gateway(source, store.clone(), name)
            })
            .collect();
        PriceAggregator::new(gateways, store.clone(), symbols)
    }

    #[test]
    fn best_prices_take_max_bid_and_min_ask() {
        let a = quote(
            "BTCUSDT",
            Some(dec!(50000.00)),
            Some(dec!(50001.00)),
            QuoteSourceId::Binance,
        );
        let b = quote(
            "BTCUSDT",
            Some(dec!(49999.00)),
            Some(dec!(50000.50)),
            QuoteSourceId::Huobi,
        );

        let (bid, ask) = best_prices("BTCUSDT", &[&a, &b]).unwrap();
        assert_eq!(bid, dec!(50000.00));
        assert_eq!(ask, dec!(50000.50));
    }

    #[test]
    fn best_prices_ignore_missing_sides() {
        let a = quote("BTCUSDT", None, Some(dec!(50001)), QuoteSourceId::Binance);
        let b = quote(
            "BTCUSDT",
            Some(dec!(49999)),
            Some(dec!(50002)),
            QuoteSourceId::Huobi,
        );

        let (bid, ask) = best_prices("BTCUSDT", &[&a, &b]).unwrap();
        assert_eq!(bid, dec!(49999));
        assert_eq!(ask, dec!(50001));
    }

    #[test]
    fn best_prices_require_at_least_one_of_each_side() {
        let bid_only = quote("BTCUSDT", Some(dec!(49999)), None, QuoteSourceId::Binance);
        let err = best_prices("BTCUSDT", &[&bid_only]).unwrap_err();
        assert!(matches!(err, AggregationError::NoAsks(_)));

        let ask_only = quote("BTCUSDT", None, Some(dec!(50001)), QuoteSourceId::Binance);
        let err = best_prices("BTCUSDT", &[&ask_only]).unwrap_err();
        assert!(matches!(err, AggregationError::NoBids(_)));
    }

    #[tokio::test]
    async fn cycle_persists_best_prices_across_sources() {
        let store = Store::open_in_memory().await.unwrap();
        let binance = Arc::new(MockQuoteSource::new(QuoteSourceId::Binance));
        binance.push_quotes(vec![quote(
            "BTCUSDT",
            Some(dec!(50000.00)),
            Some(dec!(50001.00)),
            QuoteSourceId::Binance,
        )]);
        let huobi = Arc::new(MockQuoteSource::new(QuoteSourceId::Huobi));
        huobi.push_quotes(vec![quote(
            "BTCUSDT",
            Some(dec!(49999.00)),
            Some(dec!(50000.50)),
            QuoteSourceId::Huobi,
        )]);

        let aggregator = aggregator_with(
            &store,
            vec![binance, huobi],
            vec!["BTCUSDT".to_string()],
        );
        aggregator.aggregate_and_store().await;

        let latest = aggregator.latest("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.best_bid, dec!(50000.00));
        assert_eq!(latest.best_ask, dec!(50000.50));
    }

    #[tokio::test]
    async fn one_failing_source_does_not_abort_the_other() {
        let store = Store::open_in_memory().await.unwrap();
        let binance = Arc::new(MockQuoteSource::new(QuoteSourceId::Binance));
        binance.push_error(SourceError::Transport("down".to_string()));
        binance.push_error(SourceError::Transport("down".to_string()));
        let huobi = Arc::new(MockQuoteSource::new(QuoteSourceId::Huobi));
        huobi.push_quotes(vec![quote(
            "ETHUSDT",
            Some(dec!(3000)),
            Some(dec!(3001)),
            QuoteSourceId::Huobi,
        )]);

        let aggregator = aggregator_with(
            &store,
            vec![binance, huobi],
            vec!["ETHUSDT".to_string()],
        );
        aggregator.aggregate_and_store().await;

        let latest = aggregator.latest("ETHUSDT").await.unwrap().unwrap();
        assert_eq!(latest.best_bid, dec!(3000));
    }

    #[tokio::test]
    async fn crossed_market_is_persisted() {
        let store = Store::open_in_memory().await.unwrap();
        let binance = Arc::new(MockQuoteSource::new(QuoteSourceId::Binance));
        binance.push_quotes(vec![quote(
            "BTCUSDT",
            Some(dec!(50002)),
            Some(dec!(50001)),
            QuoteSourceId::Binance,
        )]);

        let aggregator =
            aggregator_with(&store, vec![binance], vec!["BTCUSDT".to_string()]);
        aggregator.aggregate_and_store().await;

        let latest = aggregator.latest("BTCUSDT").await.unwrap().unwrap();
        assert!(latest.best_bid > latest.best_ask);
    }

    #[tokio::test]
    async fn symbol_without_quotes_is_skipped_not_written() {
        let store = Store::open_in_memory().await.unwrap();
        let binance = Arc::new(MockQuoteSource::new(QuoteSourceId::Binance));
        binance.push_quotes(vec![quote(
            "BTCUSDT",
            Some(dec!(50000)),
            Some(dec!(50001)),
            QuoteSourceId::Binance,
        )]);

        let aggregator = aggregator_with(
            &store,
            vec![binance],
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        );
        aggregator.aggregate_and_store().await;

        assert!(aggregator.latest("BTCUSDT").await.unwrap().is_some());
        assert!(aggregator.latest("ETHUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cycle_aggregates_each_symbol_independently() {
        let store = Store::open_in_memory().await.unwrap();
        let binance = Arc::new(MockQuoteSource::new(QuoteSourceId::Binance));
        binance.push_quotes(vec![
            // BTC has only a bid -> per-symbol failure, logged and skipped.
            quote("BTCUSDT", Some(dec!(50000)), None, QuoteSourceId::Binance),
            quote(
                "ETHUSDT",
                Some(dec!(3000)),
                Some(dec!(3001)),
                QuoteSourceId::Binance,
            ),
        ]);

        let aggregator = aggregator_with(
            &store,
            vec![binance],
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        );
        aggregator.aggregate_and_store().await;

        assert!(aggregator.latest("BTCUSDT").await.unwrap().is_none());
        assert!(aggregator.latest("ETHUSDT").await.unwrap().is_some());
    }
}
