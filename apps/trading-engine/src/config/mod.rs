//! Configuration loading and validation.
//!
//! Configuration is a YAML file with `${VAR}` / `${VAR:-default}`
//! environment variable interpolation. Every section has serde defaults so
//! a minimal (or empty) file yields a runnable configuration.

mod aggregation;
mod persistence;
mod resilience;
mod seed;
mod server;
mod settlement;
mod sources;

pub use aggregation::AggregationConfig;
pub use persistence::PersistenceConfig;
pub use resilience::{BreakerSettings, ResilienceConfig, RetrySettings};
pub use seed::SeedConfig;
pub use server::ServerConfig;
pub use settlement::SettlementConfig;
pub use sources::{SourceEndpointConfig, SourcesConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::base_currency_of;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Quote source endpoints.
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Aggregation cycle configuration.
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Retry and circuit breaker tuning for source fetches.
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Settlement retry tuning.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// First-run seed data.
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Load configuration from a YAML file with environment variable
/// interpolation.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // the regex pattern is a compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    let mut result = input.to_string();
    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_match.as_str()) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match.as_str(), &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.aggregation.symbols.is_empty() {
        return Err(ConfigError::Validation(
            "aggregation.symbols must not be empty".to_string(),
        ));
    }

    for symbol in &config.aggregation.symbols {
        base_currency_of(symbol, &config.aggregation.quote_currency)
            .map_err(ConfigError::Validation)?;
    }

    if config.aggregation.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "aggregation.interval_secs must be positive".to_string(),
        ));
    }

    if !config.sources.binance.enabled && !config.sources.huobi.enabled {
        return Err(ConfigError::Validation(
            "at least one quote source must be enabled".to_string(),
        ));
    }

    for (name, endpoint) in [
        ("binance", &config.sources.binance),
        ("huobi", &config.sources.huobi),
    ] {
        if endpoint.enabled && endpoint.url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "sources.{name}.url must be set when the source is enabled"
            )));
        }
    }

    let threshold = config.resilience.circuit_breaker.failure_rate_threshold;
    if threshold <= 0.0 || threshold > 1.0 {
        return Err(ConfigError::Validation(
            "resilience.circuit_breaker.failure_rate_threshold must be in (0, 1]".to_string(),
        ));
    }

    Ok(())
}
