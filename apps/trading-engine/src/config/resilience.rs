//! Retry and circuit breaker tuning for source fetches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerConfig, RetryPolicy};

/// Retry settings (serde mirror of [`RetryPolicy`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retries after the initial attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter factor.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl RetrySettings {
    /// Build the runtime retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Circuit breaker settings (serde mirror of [`BreakerConfig`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Failure ratio that opens the circuit.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Number of recent calls tracked.
    #[serde(default = "default_sliding_window_size")]
    pub sliding_window_size: u32,
    /// Minimum recorded calls before evaluating the ratio.
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: u32,
    /// Open-state cooldown, in seconds.
    #[serde(default = "default_open_cooldown_secs")]
    pub open_cooldown_secs: u64,
    /// Probe calls permitted when half-open.
    #[serde(default = "default_half_open_probes")]
    pub half_open_probes: u32,
}

impl BreakerSettings {
    /// Build the runtime breaker configuration.
    #[must_use]
    pub const fn config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_calls: self.minimum_calls,
            open_cooldown: Duration::from_secs(self.open_cooldown_secs),
            half_open_probes: self.half_open_probes,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            sliding_window_size: default_sliding_window_size(),
            minimum_calls: default_minimum_calls(),
            open_cooldown_secs: default_open_cooldown_secs(),
            half_open_probes: default_half_open_probes(),
        }
    }
}

/// Resilience configuration for the fetch gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retry policy applied to each source fetch.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Circuit breaker applied per source.
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.2
}

const fn default_failure_rate_threshold() -> f64 {
    0.5
}

const fn default_sliding_window_size() -> u32 {
    20
}

const fn default_minimum_calls() -> u32 {
    5
}

const fn default_open_cooldown_secs() -> u64 {
    10
}

const fn default_half_open_probes() -> u32 {
    3
}
