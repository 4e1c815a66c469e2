//! HTTP/JSON API implementation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregator::PriceAggregator;
use crate::models::{Trade, TradeRequest, TradeResult};
use crate::settlement::{SettlementEngine, SettlementError};
use crate::store::{Store, StoreError};

/// Default trade-history page size.
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum trade-history page size.
const MAX_PAGE_SIZE: u32 = 100;

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct ApiState {
    /// Settlement engine.
    pub engine: Arc<SettlementEngine>,
    /// Price query surface.
    pub aggregator: Arc<PriceAggregator>,
    /// Wallet query reads.
    pub store: Store,
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/trades", post(execute_trade))
        .route("/api/v1/trades/history/user/{user_id}", get(trade_history))
        .route("/api/v1/prices/latest", get(latest_price))
        .route("/api/v1/wallets/user/{user_id}", get(user_wallets))
        .route(
            "/api/v1/wallets/user/{user_id}/currency/{currency}",
            get(user_wallet),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn execute_trade(
    State(state): State<ApiState>,
    Json(request): Json<TradeRequest>,
) -> Result<Json<TradeResult>, ApiError> {
    tracing::info!(
        user_id = request.user_id,
        symbol = %request.symbol,
        side = %request.side,
        quantity = %request.quantity,
        "received trade request"
    );

    let result = state.engine.settle(&request).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    symbol: String,
}

/// Latest aggregated price for one symbol.
#[derive(Debug, Serialize)]
struct PriceResponse {
    symbol: String,
    best_bid: Decimal,
    best_ask: Decimal,
    timestamp: DateTime<Utc>,
}

async fn latest_price(
    State(state): State<ApiState>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, ApiError> {
    let symbol = query.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::bad_request("symbol is required"));
    }

    let quote = state
        .aggregator
        .latest(&symbol)
        .await?
        .ok_or_else(|| ApiError::not_found("PRICE_UNAVAILABLE", format!("no price data for {symbol}")))?;

    Ok(Json(PriceResponse {
        symbol: quote.symbol,
        best_bid: quote.best_bid,
        best_ask: quote.best_ask,
        timestamp: quote.timestamp,
    }))
}

/// One wallet balance row in a query response.
#[derive(Debug, Serialize)]
struct WalletResponse {
    currency: String,
    balance: Decimal,
    last_updated: DateTime<Utc>,
}

async fn user_wallets(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<WalletResponse>>, ApiError> {
    let wallets = state.store.wallets_for_user(user_id).await?;
    if wallets.is_empty() {
        return Err(ApiError::not_found(
            "WALLET_NOT_FOUND",
            format!("no wallet balances for user {user_id}"),
        ));
    }

    Ok(Json(
        wallets
            .into_iter()
            .map(|wallet| WalletResponse {
                currency: wallet.currency,
                balance: wallet.balance,
                last_updated: wallet.updated_at,
            })
            .collect(),
    ))
}

async fn user_wallet(
    State(state): State<ApiState>,
    Path((user_id, currency)): Path<(i64, String)>,
) -> Result<Json<WalletResponse>, ApiError> {
    let currency = currency.trim().to_uppercase();
    let wallet = state
        .store
        .wallet(user_id, &currency)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(
                "WALLET_NOT_FOUND",
                format!("no {currency} wallet for user {user_id}"),
            )
        })?;

    Ok(Json(WalletResponse {
        currency: wallet.currency,
        balance: wallet.balance,
        last_updated: wallet.updated_at,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    page: u32,
    size: Option<u32>,
    symbol: Option<String>,
}

/// One page of trade history.
#[derive(Debug, Serialize)]
struct TradeHistoryResponse {
    trades: Vec<Trade>,
    page: u32,
    page_size: u32,
    total_pages: u64,
    total: u64,
}

async fn trade_history(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TradeHistoryResponse>, ApiError> {
    let page_size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ApiError::bad_request(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let symbol = query
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase);

    let history = state
        .engine
        .trade_history(user_id, query.page, page_size, symbol.as_deref())
        .await?;

    Ok(Json(TradeHistoryResponse {
        page: history.page,
        page_size: history.page_size,
        total_pages: history.total_pages(),
        total: history.total,
        trades: history.trades,
    }))
}

/// Error body returned to clients.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// API error with a distinguishable failure category.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
            }
            SettlementError::UserNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", message)
            }
            SettlementError::PriceUnavailable(_) => {
                Self::new(StatusCode::NOT_FOUND, "PRICE_UNAVAILABLE", message)
            }
            SettlementError::WalletNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "WALLET_NOT_FOUND", message)
            }
            SettlementError::InsufficientBalance { .. } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
                message,
            ),
            SettlementError::ConcurrencyExhausted { .. } => {
                Self::new(StatusCode::CONFLICT, "CONCURRENCY_EXHAUSTED", message)
            }
            SettlementError::Store(_) => {
                tracing::error!(error = %message, "settlement storage failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error",
                )
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
