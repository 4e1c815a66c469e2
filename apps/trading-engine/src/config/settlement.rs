//! Settlement engine tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;

/// Settlement retry configuration for optimistic-lock conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Version-conflict retries before surfacing `ConcurrencyExhausted`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
}

impl SettlementConfig {
    /// Build the retry policy for version-conflict retries.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_initial_backoff_ms() -> u64 {
    50
}

const fn default_retry_max_backoff_ms() -> u64 {
    1000
}
