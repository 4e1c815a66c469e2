//! Retry policy with jittered exponential backoff.
//!
//! Used in two places: around quote-source fetches (transient network
//! failures) and around settlement version conflicts (optimistic-lock
//! retries). The upstream calls are idempotent reads, so retrying them
//! verbatim is always safe.

use std::time::Duration;

use rand::Rng;

/// Bounded retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Cap applied to every backoff.
    pub max_backoff: Duration,
    /// Exponential growth factor.
    pub backoff_multiplier: f64,
    /// Jitter factor (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Stateful backoff calculator for one logical operation.
///
/// Create a fresh calculator per request; it tracks how many attempts have
/// been consumed and returns `None` once the policy is exhausted.
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Create a calculator from a policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.max_attempts,
            initial_ms: policy.initial_backoff.as_millis() as u64,
            max_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next backoff duration, or `None` when attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let multiplier = self.multiplier.powi(self.attempt as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let base_ms = ((self.initial_ms as f64 * multiplier) as u64).min(self.max_ms);
        let jittered_ms = self.apply_jitter(base_ms).min(self.max_ms);

        self.attempt += 1;
        Some(Duration::from_millis(jittered_ms))
    }

    /// Randomize within [base * (1 - jitter), base * (1 + jitter)].
    fn apply_jitter(&self, base_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return base_ms;
        }
        let mut rng = rand::rng();
        let spread = base_ms as f64 * self.jitter_factor;
        let min = (base_ms as f64 - spread).max(0.0);
        let max = base_ms as f64 + spread;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rng.random_range(min..=max) as u64;
        jittered
    }

    /// Attempts consumed so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}
