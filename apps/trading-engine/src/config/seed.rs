//! First-run seed data configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default user and wallets created on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Whether to create seed data at startup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seed username.
    #[serde(default = "default_username")]
    pub username: String,
    /// Seed email.
    #[serde(default = "default_email")]
    pub email: String,
    /// Initial quote-currency balance; base-currency wallets start at zero.
    #[serde(default = "default_quote_balance")]
    pub quote_balance: Decimal,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            username: default_username(),
            email: default_email(),
            quote_balance: default_quote_balance(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

fn default_username() -> String {
    "demo".to_string()
}

fn default_email() -> String {
    "demo@example.com".to_string()
}

fn default_quote_balance() -> Decimal {
    Decimal::new(50_000, 0)
}
