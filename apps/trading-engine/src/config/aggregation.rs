//! Aggregation cycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregation cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Seconds between aggregation cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Settlement currency shared by every supported symbol.
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// Supported symbols. Quotes for anything else are filtered out before
    /// aggregation.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

impl AggregationConfig {
    /// Cycle period as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            quote_currency: default_quote_currency(),
            symbols: default_symbols(),
        }
    }
}

const fn default_interval_secs() -> u64 {
    10
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
