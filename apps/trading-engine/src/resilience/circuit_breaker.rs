//! Circuit breaker guarding calls to one external quote source.
//!
//! State machine:
//!
//! ```text
//! CLOSED -> OPEN       (failure ratio over the sliding window >= threshold)
//! OPEN -> HALF_OPEN    (cooldown elapsed)
//! HALF_OPEN -> CLOSED  (all probe calls succeed)
//! HALF_OPEN -> OPEN    (any probe call fails)
//! ```
//!
//! While the breaker is open, the fetch gateway skips the upstream entirely
//! and serves the last persisted aggregated quote instead.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls short-circuit to the fallback.
    Open,
    /// A limited number of probe calls is let through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure ratio that opens the circuit (0.0-1.0).
    pub failure_rate_threshold: f64,
    /// Number of recent calls tracked.
    pub sliding_window_size: u32,
    /// Minimum recorded calls before the ratio is evaluated.
    pub minimum_calls: u32,
    /// How long the circuit stays open before probing.
    pub open_cooldown: Duration,
    /// Probe calls permitted in the half-open state.
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 20,
            minimum_calls: 5,
            open_cooldown: Duration::from_secs(10),
            half_open_probes: 3,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    /// Recent call outcomes, `true` = failure.
    window: VecDeque<bool>,
    half_open_calls: u32,
    half_open_successes: u32,
}

/// Circuit breaker for one upstream source.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                window: VecDeque::new(),
                half_open_calls: 0,
                half_open_successes: 0,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Source name this breaker guards.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current state, applying the time-based OPEN -> HALF_OPEN transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_probe(&mut inner);
        inner.state
    }

    /// Whether a call may proceed right now.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.lock();
        self.maybe_probe(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => inner.half_open_calls < self.config.half_open_probes,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => self.push_outcome(&mut inner, false),
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_probes {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                self.push_outcome(&mut inner, true);
                if self.should_open(&inner) {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            // Any probe failure re-opens the circuit.
            CircuitState::HalfOpen => {
                inner.half_open_calls += 1;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the breaker open (tests and operational overrides).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        let state = self.state();
        let inner = self.lock();
        BreakerMetrics {
            name: self.name,
            state,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            failure_rate: Self::failure_rate(&inner.window),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push_outcome(&self, inner: &mut Inner, failed: bool) {
        inner.window.push_back(failed);
        while inner.window.len() > self.config.sliding_window_size as usize {
            inner.window.pop_front();
        }
    }

    fn should_open(&self, inner: &Inner) -> bool {
        inner.window.len() >= self.config.minimum_calls as usize
            && Self::failure_rate(&inner.window) >= self.config.failure_rate_threshold
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_rate(window: &VecDeque<bool>) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let failures = window.iter().filter(|failed| **failed).count();
        failures as f64 / window.len() as f64
    }

    /// OPEN -> HALF_OPEN once the cooldown has elapsed.
    fn maybe_probe(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && let Some(opened) = inner.opened_at
            && opened.elapsed() >= self.config.open_cooldown
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                tracing::warn!(source = %self.name, %from, to = %to, "circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
                tracing::info!(source = %self.name, %from, to = %to, "circuit breaker probing");
            }
            CircuitState::Closed => {
                inner.window.clear();
                inner.opened_at = None;
                tracing::info!(source = %self.name, %from, to = %to, "circuit breaker closed");
            }
        }
    }
}

/// Point-in-time breaker metrics.
#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    /// Source name.
    pub name: &'static str,
    /// Current state.
    pub state: CircuitState,
    /// Calls recorded over the breaker's lifetime.
    pub total_calls: u64,
    /// Failures recorded over the breaker's lifetime.
    pub total_failures: u64,
    /// Failure ratio over the current sliding window.
    pub failure_rate: f64,
}
