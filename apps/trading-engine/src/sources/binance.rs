//! Binance book-ticker adapter.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{QuoteSource, SourceError};
use crate::models::{QuoteSourceId, SourceQuote};

/// One entry of the Binance `bookTicker` array. Prices arrive as JSON
/// strings; extra fields (`bidQty`, `askQty`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct BookTicker {
    symbol: String,
    #[serde(default, rename = "bidPrice")]
    bid_price: Option<Decimal>,
    #[serde(default, rename = "askPrice")]
    ask_price: Option<Decimal>,
}

/// Quote source adapter for the Binance book-ticker API.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: Client,
    url: String,
}

impl BinanceSource {
    /// Create an adapter for the given endpoint with a bounded request
    /// timeout. A timeout counts as a retryable transport failure upstream.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn parse_payload(body: &str, symbols: &[String]) -> Result<Vec<SourceQuote>, SourceError> {
        let tickers: Vec<BookTicker> =
            serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

        if tickers.is_empty() {
            return Err(SourceError::EmptyPayload);
        }

        Ok(tickers
            .into_iter()
            .filter(|ticker| symbols.contains(&ticker.symbol))
            .map(|ticker| SourceQuote {
                symbol: ticker.symbol,
                bid: ticker.bid_price,
                ask: ticker.ask_price,
                source: QuoteSourceId::Binance,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl QuoteSource for BinanceSource {
    fn id(&self) -> QuoteSourceId {
        QuoteSourceId::Binance
    }

    async fn fetch(&self, symbols: &[String]) -> Result<Vec<SourceQuote>, SourceError> {
        tracing::debug!(url = %self.url, "fetching Binance book tickers");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "Binance returned HTTP {status}"
            )));
        }

        let body = response.text().await?;
        Self::parse_payload(&body, symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
    }

    #[test]
    fn parses_and_filters_supported_symbols() {
        let body = r#"[
            {"symbol":"BTCUSDT","bidPrice":"50000.00","bidQty":"1.2","askPrice":"50001.00","askQty":"0.8"},
            {"symbol":"DOGEUSDT","bidPrice":"0.1","askPrice":"0.2"},
            {"symbol":"ETHUSDT","bidPrice":"3000.50","askPrice":"3001.00"}
        ]"#;

        let quotes = BinanceSource::parse_payload(body, &symbols()).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol, "BTCUSDT");
        assert_eq!(quotes[0].bid, Some(dec!(50000.00)));
        assert_eq!(quotes[0].ask, Some(dec!(50001.00)));
        assert_eq!(quotes[0].source, QuoteSourceId::Binance);
        assert_eq!(quotes[1].symbol, "ETHUSDT");
    }

    #[test]
    fn missing_sides_map_to_none() {
        let body = r#"[{"symbol":"BTCUSDT","askPrice":"50001.00"}]"#;
        let quotes = BinanceSource::parse_payload(body, &symbols()).unwrap();
        assert_eq!(quotes[0].bid, None);
        assert_eq!(quotes[0].ask, Some(dec!(50001.00)));
    }

    #[test]
    fn empty_array_is_a_failure() {
        let err = BinanceSource::parse_payload("[]", &symbols()).unwrap_err();
        assert!(matches!(err, SourceError::EmptyPayload));
    }

    #[test]
    fn null_payload_is_a_failure() {
        let err = BinanceSource::parse_payload("null", &symbols()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn unsupported_symbols_filter_to_empty_not_error() {
        let body = r#"[{"symbol":"DOGEUSDT","bidPrice":"0.1","askPrice":"0.2"}]"#;
        let quotes = BinanceSource::parse_payload(body, &symbols()).unwrap();
        assert!(quotes.is_empty());
    }
}
