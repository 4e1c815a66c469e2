//! End-to-end settlement properties: value conservation, idempotent
//! replay, and no lost updates under concurrent access.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trading_engine::models::{TradeRequest, TradeSide};
use trading_engine::resilience::RetryPolicy;
use trading_engine::settlement::{SettlementEngine, SettlementError};
use trading_engine::store::Store;

async fn file_backed_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trading-engine.db");
    let store = Store::open(path.to_str().unwrap()).await.unwrap();
    (store, dir)
}

async fn seed(store: &Store, usdt: Decimal, btc: Decimal) -> i64 {
    let user = store.create_user("trader", "trader@example.com").await.unwrap();
    store.create_wallet(user.id, "USDT", usdt).await.unwrap();
    store.create_wallet(user.id, "BTC", btc).await.unwrap();
    store
        .insert_aggregated_quote("BTCUSDT", dec!(50000.00), dec!(50001.00), chrono::Utc::now())
        .await
        .unwrap();
    user.id
}

fn request(user_id: i64, side: TradeSide, quantity: Decimal) -> TradeRequest {
    TradeRequest {
        user_id,
        symbol: "BTCUSDT".to_string(),
        side,
        quantity,
        client_order_id: None,
    }
}

#[tokio::test]
async fn settlement_conserves_value_at_trade_price() {
    let (store, _dir) = file_backed_store().await;
    let user_id = seed(&store, dec!(100000.00), dec!(2.0)).await;
    let engine = SettlementEngine::new(store.clone(), "USDT", RetryPolicy::default());

    for (side, quantity) in [
        (TradeSide::Buy, dec!(0.5)),
        (TradeSide::Sell, dec!(1.25)),
        (TradeSide::Buy, dec!(0.00000001)),
    ] {
        let usdt_before = store.wallet(user_id, "USDT").await.unwrap().unwrap().balance;
        let btc_before = store.wallet(user_id, "BTC").await.unwrap().unwrap().balance;

        let result = engine.settle(&request(user_id, side, quantity)).await.unwrap();

        let usdt_after = store.wallet(user_id, "USDT").await.unwrap().unwrap().balance;
        let btc_after = store.wallet(user_id, "BTC").await.unwrap().unwrap().balance;

        // Value at the trade price moves between wallets, never appears or
        // disappears.
        let before = usdt_before + btc_before * result.price;
        let after = usdt_after + btc_after * result.price;
        assert_eq!(before, after, "value not conserved for {side:?} {quantity}");

        // The quote-currency delta is exactly the rounded total amount.
        let delta = (usdt_after - usdt_before).abs();
        assert_eq!(delta, result.total_amount);
    }
}

#[tokio::test]
async fn buy_scenario_matches_expected_balances() {
    let (store, _dir) = file_backed_store().await;
    let user_id = seed(&store, dec!(100000.00), dec!(0)).await;
    let engine = SettlementEngine::new(store.clone(), "USDT", RetryPolicy::default());

    let result = engine
        .settle(&request(user_id, TradeSide::Buy, dec!(0.5)))
        .await
        .unwrap();

    assert_eq!(result.price, dec!(50001.00));
    assert_eq!(result.total_amount, dec!(25000.50));
    assert_eq!(result.quote_balance, dec!(74999.50));
    assert_eq!(result.base_balance, dec!(0.5));
}

#[tokio::test]
async fn concurrent_settlements_apply_exactly_once_each() {
    let (store, _dir) = file_backed_store().await;
    let user_id = seed(&store, dec!(100000.00), dec!(1.0)).await;
    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        "USDT",
        RetryPolicy::default(),
    ));

    let buy_engine = Arc::clone(&engine);
    let buy = tokio::spawn(async move {
        buy_engine
            .settle(&request(user_id, TradeSide::Buy, dec!(0.5)))
            .await
    });
    let sell_engine = Arc::clone(&engine);
    let sell = tokio::spawn(async move {
        sell_engine
            .settle(&request(user_id, TradeSide::Sell, dec!(0.25)))
            .await
    });

    buy.await.unwrap().unwrap();
    sell.await.unwrap().unwrap();

    // buy: -0.5 * 50001.00 = -25000.50; sell: +0.25 * 50000.00 = +12500.00
    let usdt = store.wallet(user_id, "USDT").await.unwrap().unwrap();
    assert_eq!(usdt.balance, dec!(100000.00) - dec!(25000.50) + dec!(12500.00));
    let btc = store.wallet(user_id, "BTC").await.unwrap().unwrap();
    assert_eq!(btc.balance, dec!(1.0) + dec!(0.5) - dec!(0.25));

    // Each settlement bumped both wallet versions exactly once.
    assert_eq!(usdt.version, 2);
    assert_eq!(btc.version, 2);

    let page = store.trades_for_user(user_id, 0, 10, None).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn many_concurrent_buys_never_lose_an_update() {
    let (store, _dir) = file_backed_store().await;
    let user_id = seed(&store, dec!(100000.00), dec!(0)).await;
    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        "USDT",
        RetryPolicy::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .settle(&request(user_id, TradeSide::Buy, dec!(0.1)))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 8 buys of 0.1 BTC at 50001.00 = 8 * 5000.10 debited.
    let usdt = store.wallet(user_id, "USDT").await.unwrap().unwrap();
    assert_eq!(usdt.balance, dec!(100000.00) - dec!(40000.80));
    let btc = store.wallet(user_id, "BTC").await.unwrap().unwrap();
    assert_eq!(btc.balance, dec!(0.8));
    assert_eq!(usdt.version, 8);
}

#[tokio::test]
async fn duplicate_client_order_ids_settle_once_under_concurrency() {
    let (store, _dir) = file_backed_store().await;
    let user_id = seed(&store, dec!(100000.00), dec!(0)).await;
    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        "USDT",
        RetryPolicy::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let request = TradeRequest {
                client_order_id: Some("dup-1".to_string()),
                ..request(user_id, TradeSide::Buy, dec!(0.5))
            };
            engine.settle(&request).await
        }));
    }

    let mut trade_ids = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        trade_ids.push(result.trade_id);
    }

    // Every replay answered with the same trade.
    trade_ids.dedup();
    assert_eq!(trade_ids.len(), 1);

    // One economic effect.
    let usdt = store.wallet(user_id, "USDT").await.unwrap().unwrap();
    assert_eq!(usdt.balance, dec!(74999.50));
    assert_eq!(usdt.version, 1);
    let page = store.trades_for_user(user_id, 0, 10, None).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn insufficient_funds_under_concurrency_never_overdraws() {
    let (store, _dir) = file_backed_store().await;
    // Enough USDT for exactly one 0.5 BTC buy.
    let user_id = seed(&store, dec!(25000.50), dec!(0)).await;
    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        "USDT",
        RetryPolicy::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .settle(&request(user_id, TradeSide::Buy, dec!(0.5)))
                .await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(SettlementError::InsufficientBalance { .. }) => insufficient += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(insufficient, 2);

    let usdt = store.wallet(user_id, "USDT").await.unwrap().unwrap();
    assert_eq!(usdt.balance, dec!(0.00));
    assert!(usdt.balance >= Decimal::ZERO);
}
