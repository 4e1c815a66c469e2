//! Trading Engine Binary
//!
//! Starts the price aggregation scheduler and the REST API server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-engine
//! ```
//!
//! # Environment Variables
//!
//! - `TRADING_ENGINE_CONFIG`: Config file path (default: config.yaml;
//!   built-in defaults are used when the file is absent)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trading_engine::aggregator::{AggregationScheduler, PriceAggregator};
use trading_engine::config::{Config, ConfigError, load_config};
use trading_engine::gateway::QuoteGateway;
use trading_engine::models::base_currency_of;
use trading_engine::resilience::CircuitBreaker;
use trading_engine::server::{ApiState, create_router};
use trading_engine::settlement::SettlementEngine;
use trading_engine::sources::{BinanceSource, HuobiSource, QuoteSource};
use trading_engine::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("starting trading engine");

    let config = load_engine_config()?;
    log_config(&config);

    let store = open_store(&config).await?;

    if config.seed.enabled {
        seed_store(&store, &config).await?;
    }

    let gateways = build_gateways(&config, &store)?;
    let aggregator = Arc::new(PriceAggregator::new(
        gateways,
        store.clone(),
        config.aggregation.symbols.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler =
        AggregationScheduler::new(Arc::clone(&aggregator), config.aggregation.interval());
    let scheduler_handle = scheduler.spawn(shutdown_rx);

    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        config.aggregation.quote_currency.clone(),
        config.settlement.retry_policy(),
    ));

    let state = ApiState {
        engine,
        aggregator,
        store,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // Stop the aggregation scheduler before the store goes away.
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    info!("trading engine stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load config from `TRADING_ENGINE_CONFIG`, falling back to `config.yaml`
/// and then to built-in defaults when no file exists.
fn load_engine_config() -> anyhow::Result<Config> {
    match std::env::var("TRADING_ENGINE_CONFIG") {
        Ok(path) => load_config(Some(&path))
            .with_context(|| format!("failed to load config from {path}")),
        Err(_) => match load_config(None) {
            Ok(config) => Ok(config),
            Err(ConfigError::Read { .. }) => {
                info!("config.yaml not found, using built-in defaults");
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        },
    }
}

fn log_config(config: &Config) {
    info!(
        bind_address = %config.server.bind_address,
        http_port = config.server.http_port,
        db_path = %config.persistence.db_path,
        interval_secs = config.aggregation.interval_secs,
        symbols = ?config.aggregation.symbols,
        quote_currency = %config.aggregation.quote_currency,
        binance_enabled = config.sources.binance.enabled,
        huobi_enabled = config.sources.huobi.enabled,
        "configuration loaded"
    );
}

async fn open_store(config: &Config) -> anyhow::Result<Store> {
    if let Some(parent) = std::path::Path::new(&config.persistence.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(Store::open(&config.persistence.db_path).await?)
}

/// Create the default user and wallets on first run: the full quote
/// currency balance plus a zero wallet per supported base currency.
async fn seed_store(store: &Store, config: &Config) -> anyhow::Result<()> {
    let mut balances = vec![(
        config.aggregation.quote_currency.clone(),
        config.seed.quote_balance,
    )];
    for symbol in &config.aggregation.symbols {
        let base = base_currency_of(symbol, &config.aggregation.quote_currency)
            .map_err(anyhow::Error::msg)?;
        balances.push((base, Decimal::ZERO));
    }

    store
        .ensure_seed_data(&config.seed.username, &config.seed.email, &balances)
        .await?;
    Ok(())
}

fn build_gateways(config: &Config, store: &Store) -> anyhow::Result<Vec<QuoteGateway>> {
    let retry = config.resilience.retry.policy();
    let breaker_config = config.resilience.circuit_breaker.config();
    let mut gateways = Vec::new();

    if config.sources.binance.enabled {
        let source: Arc<dyn QuoteSource> = Arc::new(BinanceSource::new(
            config.sources.binance.url.clone(),
            config.sources.binance.timeout(),
        )?);
        gateways.push(QuoteGateway::new(
            source,
            CircuitBreaker::new("binance", breaker_config.clone()),
            retry.clone(),
            store.clone(),
        ));
    }

    if config.sources.huobi.enabled {
        let source: Arc<dyn QuoteSource> = Arc::new(HuobiSource::new(
            config.sources.huobi.url.clone(),
            config.sources.huobi.timeout(),
        )?);
        gateways.push(QuoteGateway::new(
            source,
            CircuitBreaker::new("huobi", breaker_config),
            retry,
            store.clone(),
        ));
    }

    Ok(gateways)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
