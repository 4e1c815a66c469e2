//! Huobi market-tickers adapter.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{QuoteSource, SourceError};
use crate::models::{QuoteSourceId, SourceQuote};

/// Envelope of the Huobi `market/tickers` endpoint.
#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<Vec<Ticker>>,
}

/// One ticker entry. Symbols arrive lower case (`btcusdt`); extra fields
/// (`open`, `high`, `vol`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct Ticker {
    symbol: String,
    #[serde(default)]
    bid: Option<Decimal>,
    #[serde(default)]
    ask: Option<Decimal>,
}

/// Quote source adapter for the Huobi market-tickers API.
#[derive(Debug, Clone)]
pub struct HuobiSource {
    client: Client,
    url: String,
}

impl HuobiSource {
    /// Create an adapter for the given endpoint with a bounded request
    /// timeout.
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
        let response: TickersResponse =
            serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

        if let Some(status) = &response.status
            && status.as_str() != "ok"
        {
            return Err(SourceError::Malformed(format!(
                "Huobi status was {status}"
            )));
        }

        let data = response.data.ok_or(SourceError::EmptyPayload)?;
        if data.is_empty() {
            return Err(SourceError::EmptyPayload);
        }

        Ok(data
            .into_iter()
            .filter_map(|ticker| {
                let symbol = ticker.symbol.to_uppercase();
                symbols.contains(&symbol).then_some(SourceQuote {
                    symbol,
                    bid: ticker.bid,
                    ask: ticker.ask,
                    source: QuoteSourceId::Huobi,
                })
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl QuoteSource for HuobiSource {
    fn id(&self) -> QuoteSourceId {
        QuoteSourceId::Huobi
    }

    async fn fetch(&self, symbols: &[String]) -> Result<Vec<SourceQuote>, SourceError> {
        tracing::debug!(url = %self.url, "fetching Huobi market tickers");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "Huobi returned HTTP {status}"
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
    fn parses_lowercase_symbols_and_filters() {
        let body = r#"{
            "status": "ok",
            "data": [
                {"symbol":"btcusdt","bid":49999.0,"ask":50000.5,"open":1,"vol":2,"count":3},
                {"symbol":"xrpusdt","bid":0.5,"ask":0.6}
            ]
        }"#;

        let quotes = HuobiSource::parse_payload(body, &symbols()).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "BTCUSDT");
        assert_eq!(quotes[0].bid, Some(dec!(49999.0)));
        assert_eq!(quotes[0].ask, Some(dec!(50000.5)));
        assert_eq!(quotes[0].source, QuoteSourceId::Huobi);
    }

    #[test]
    fn missing_data_is_a_failure() {
        let err = HuobiSource::parse_payload(r#"{"status":"ok"}"#, &symbols()).unwrap_err();
        assert!(matches!(err, SourceError::EmptyPayload));
    }

    #[test]
    fn empty_data_is_a_failure() {
        let err =
            HuobiSource::parse_payload(r#"{"status":"ok","data":[]}"#, &symbols()).unwrap_err();
        assert!(matches!(err, SourceError::EmptyPayload));
    }

    #[test]
    fn error_status_is_a_failure() {
        let body = r#"{"status":"error","data":[{"symbol":"btcusdt","bid":1,"ask":2}]}"#;
        let err = HuobiSource::parse_payload(body, &symbols()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }
}
