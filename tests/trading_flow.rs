//! End-to-end decision chain over the scripted services: score, review,
//! risk gate, bracket placement, and the audit trail that ties them
//! together under one decision_chain_id.

mod common;

use common::{approving_review_json, harness, healthy_snapshot, oversold_indicators, trading_time};
use tradepulse::domain::portfolio::MarketContext;
use tradepulse::domain::types::{OrderSide, SignalStatus, TradeAction, TradeStatus};
use tradepulse::infrastructure::persistence::repositories::{
    AuditRepository, SignalRepository, TradeRepository,
};

#[tokio::test]
async fn test_oversold_buy_reaches_broker_with_bracket_levels() {
    let h = harness().await;
    let mut conn = h.db.pool.acquire().await.unwrap();
    let now = trading_time();

    let indicators = oversold_indicators();
    let market = MarketContext::default();

    // Score
    let (mut signal, features) = h
        .signals
        .generate_signal(&mut conn, "AAPL", &indicators, &market, now)
        .await
        .unwrap()
        .expect("oversold setup should emit a signal");
    assert_eq!(signal.action, TradeAction::Buy);
    assert!((0.65..=0.85).contains(&signal.confidence));

    // Review
    h.chat.push_reply(&approving_review_json("normal"));
    let context = tradepulse::application::analyst::SymbolContext {
        price: 185.0,
        vix: market.vix,
        ..Default::default()
    };
    let review = h
        .analyst
        .review_signal(&mut conn, &signal, &context, now)
        .await
        .unwrap();
    assert!(review.approve);

    signal.analyst_approved = Some(review.approve);
    signal.analyst_adjusted_confidence = Some(review.adjusted_confidence);
    signal.status = SignalStatus::Approved;

    // Risk gate + execution
    let snapshot = healthy_snapshot(now);
    let trade = h
        .executor
        .execute(
            &mut conn, &h.risk, &mut signal, &review, &features, &snapshot, &market, 185.0, now,
        )
        .await
        .unwrap()
        .expect("trade should be placed");

    // Bracket levels: 2 ATR stop, 3 ATR target around the 185 entry.
    assert_eq!(trade.side, OrderSide::Buy);
    assert_eq!(trade.stop_price, 179.30);
    assert_eq!(trade.target_price, 193.55);
    assert!(trade.stop_price < trade.entry_price);
    assert!(trade.entry_price < trade.target_price);
    let rr = (trade.target_price - 185.0) / (185.0 - trade.stop_price);
    assert!((rr - 1.5).abs() < 0.01);
    assert!(trade.shares >= 1);
    assert!(trade.allocation_pct <= 10.0);
    assert!(trade.dollar_amount > 0.0);
    assert_eq!(trade.status, TradeStatus::Pending);
    assert_eq!(trade.decision_chain_id, signal.decision_chain_id);

    // The broker saw exactly one bracket order with matching levels.
    let orders = h.broker.placed_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].symbol, "AAPL");
    assert_eq!(orders[0].qty, trade.shares);
    assert_eq!(orders[0].stop_price, trade.stop_price);
    assert_eq!(orders[0].target_price, trade.target_price);

    // Signal row reflects the executed chain.
    signal.status = SignalStatus::Executed;
    SignalRepository::update_review(&mut conn, &signal).await.unwrap();
    let stored = SignalRepository::get(&mut conn, signal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SignalStatus::Executed);
    assert_eq!(stored.analyst_approved, Some(true));

    // Full provenance on one chain id.
    let chain = AuditRepository::by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    let types: Vec<&str> = chain.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"signal_generated"));
    assert!(types.contains(&"analyst_review"));
    assert!(types.contains(&"risk_check_passed"));
    assert!(types.contains(&"trade_placed"));

    let trades = TradeRepository::find_by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    assert_eq!(trades.len(), 1);
}

#[tokio::test]
async fn test_quiet_market_cycle_completes_without_signals() {
    let h = harness().await;
    let db = h.db.clone();
    let broker = h.broker.clone();

    broker.set_account(100_000.0, 100_000.0, 60_000.0, 40_000.0);
    broker.set_bars("AAPL", common::daily_bars("AAPL", 120));
    broker.set_bars("SPY", common::daily_bars("SPY", 120));

    let mut trading_loop = h.into_trading_loop(vec!["AAPL", "SPY"]);
    let results = trading_loop.run_cycle().await;

    assert!(results.errors.is_empty(), "errors: {:?}", results.errors);
    assert_eq!(results.symbols_processed, 2);
    // A steady drift upward scores as overbought-but-trending: HOLD.
    assert_eq!(results.signals_generated, 0);
    assert_eq!(results.trades_placed, 0);

    let mut conn = db.pool.acquire().await.unwrap();
    assert_eq!(
        tradepulse::infrastructure::persistence::repositories::BarRepository::count(
            &mut conn, "AAPL", "1Day"
        )
        .await
        .unwrap(),
        120
    );
    let indicators =
        tradepulse::infrastructure::persistence::repositories::IndicatorRepository::latest(
            &mut conn, "AAPL", "1Day",
        )
        .await
        .unwrap();
    assert!(indicators.is_some());

    let completed = AuditRepository::by_event_type(&mut conn, "cycle_completed")
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].details["symbols_processed"], 2);
}

#[tokio::test]
async fn test_vix_cutoff_rejects_trade_and_leaves_no_row() {
    let h = harness().await;
    let mut conn = h.db.pool.acquire().await.unwrap();
    let now = trading_time();

    let indicators = oversold_indicators();
    let market = MarketContext {
        vix: 36.0,
        ..Default::default()
    };

    let (mut signal, features) = h
        .signals
        .generate_signal(&mut conn, "AAPL", &indicators, &market, now)
        .await
        .unwrap()
        .expect("signal still emitted before the gate");

    h.chat.push_reply(&approving_review_json("normal"));
    let context = tradepulse::application::analyst::SymbolContext {
        price: 185.0,
        vix: 36.0,
        ..Default::default()
    };
    let review = h
        .analyst
        .review_signal(&mut conn, &signal, &context, now)
        .await
        .unwrap();

    let snapshot = healthy_snapshot(now);
    let trade = h
        .executor
        .execute(
            &mut conn, &h.risk, &mut signal, &review, &features, &snapshot, &market, 185.0, now,
        )
        .await
        .unwrap();

    assert!(trade.is_none());
    assert_eq!(signal.risk_approved, Some(false));
    assert_eq!(
        signal.risk_rejection_reason.as_deref(),
        Some("VIX (36.0) exceeds max threshold (35.0)")
    );
    assert!(h.broker.placed_orders().is_empty());

    signal.status = SignalStatus::Rejected;
    SignalRepository::update_review(&mut conn, &signal).await.unwrap();
    let stored = SignalRepository::get(&mut conn, signal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SignalStatus::Rejected);

    let trades = TradeRepository::find_by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    assert!(trades.is_empty());

    let chain = AuditRepository::by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    let types: Vec<&str> = chain.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"risk_check_failed"));
    assert!(types.contains(&"trade_rejected_risk"));
    assert!(!types.contains(&"trade_placed"));
}

#[tokio::test]
async fn test_confidence_floor_suppresses_weak_signals() {
    let h = harness().await;
    let mut conn = h.db.pool.acquire().await.unwrap();
    let now = trading_time();

    // score (2 + 1) / 7.5 = 0.4: still BUY direction, but 0.62 confidence
    // stays under the 0.65 floor, so nothing is persisted.
    let mut weak = oversold_indicators();
    weak.insert("sma20_sma50_cross".to_string(), Some(-1.0));
    weak.insert("volume_price_confirmation".to_string(), Some(0.0));
    weak.insert("bb_position".to_string(), Some(0.5));
    weak.insert("return_1d".to_string(), Some(-0.001));

    let result = h
        .signals
        .generate_signal(&mut conn, "AAPL", &weak, &MarketContext::default(), now)
        .await
        .unwrap();
    assert!(result.is_none());

    let placed = h.broker.placed_orders();
    assert!(placed.is_empty());
}

#[tokio::test]
async fn test_failed_placement_leaves_audit_but_no_trade_row() {
    let h = harness().await;
    let mut conn = h.db.pool.acquire().await.unwrap();
    let now = trading_time();

    h.broker.set_fail_orders(true);

    let (mut signal, features) = h
        .signals
        .generate_signal(
            &mut conn,
            "AAPL",
            &oversold_indicators(),
            &MarketContext::default(),
            now,
        )
        .await
        .unwrap()
        .unwrap();

    h.chat.push_reply(&approving_review_json("normal"));
    let review = h
        .analyst
        .review_signal(
            &mut conn,
            &signal,
            &tradepulse::application::analyst::SymbolContext::default(),
            now,
        )
        .await
        .unwrap();

    let snapshot = healthy_snapshot(now);
    let trade = h
        .executor
        .execute(
            &mut conn,
            &h.risk,
            &mut signal,
            &review,
            &features,
            &snapshot,
            &MarketContext::default(),
            185.0,
            now,
        )
        .await
        .unwrap();

    assert!(trade.is_none());
    // Risk passed; only placement failed.
    assert_eq!(signal.risk_approved, Some(true));

    let trades = TradeRepository::find_by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    assert!(trades.is_empty());

    let chain = AuditRepository::by_chain(&mut conn, signal.decision_chain_id)
        .await
        .unwrap();
    assert!(
        chain
            .iter()
            .any(|e| e.event_type == "trade_placement_failed")
    );
}
