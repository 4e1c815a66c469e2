//! Quote source endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One upstream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpointConfig {
    /// Whether this source participates in aggregation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Full URL of the ticker endpoint. Must be set for enabled sources.
    #[serde(default)]
    pub url: String,
    /// Request timeout in seconds. Expiry counts as a retryable failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SourceEndpointConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// All configured quote sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Binance book-ticker endpoint.
    #[serde(default = "default_binance")]
    pub binance: SourceEndpointConfig,
    /// Huobi market-tickers endpoint.
    #[serde(default = "default_huobi")]
    pub huobi: SourceEndpointConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            binance: default_binance(),
            huobi: default_huobi(),
        }
    }
}

fn default_binance() -> SourceEndpointConfig {
    SourceEndpointConfig {
        enabled: true,
        url: "https://api.binance.com/api/v3/ticker/bookTicker".to_string(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_huobi() -> SourceEndpointConfig {
    SourceEndpointConfig {
        enabled: true,
        url: "https://api.huobi.pro/market/tickers".to_string(),
        timeout_secs: default_timeout_secs(),
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    5
}
