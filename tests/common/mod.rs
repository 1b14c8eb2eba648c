//! Shared fixtures: an in-memory database wired to the scripted broker
//! and chat model, plus indicator and time helpers.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tradepulse::application::analyst::Analyst;
use tradepulse::application::coordinator::Coordinator;
use tradepulse::application::executor::TradeExecutor;
use tradepulse::application::indicators::IndicatorSet;
use tradepulse::application::orchestrator::{TradingLoop, TradingLoopConfig};
use tradepulse::application::portfolio_tracker::PortfolioTracker;
use tradepulse::application::risk_manager::{RiskLimits, RiskManager};
use tradepulse::application::signal_engine::SignalEngine;
use tradepulse::domain::portfolio::{PortfolioSnapshot, RealizedVolProxy};
use tradepulse::infrastructure::mock::{MockBrokerage, MockChatModel};
use tradepulse::infrastructure::persistence::database::Database;

pub fn test_limits() -> RiskLimits {
    RiskLimits {
        max_position_pct: 5.0,
        max_daily_loss_pct: 3.0,
        max_weekly_loss_pct: 5.0,
        max_monthly_loss_pct: 8.0,
        max_drawdown_pct: 12.0,
        max_open_positions: 8,
        max_trades_per_day: 10,
    }
}

pub struct Harness {
    pub db: Database,
    pub broker: Arc<MockBrokerage>,
    pub chat: Arc<MockChatModel>,
    pub coordinator: Arc<Coordinator>,
    pub signals: SignalEngine,
    pub analyst: Analyst,
    pub risk: RiskManager,
    pub executor: TradeExecutor,
    pub tracker: PortfolioTracker,
}

pub async fn harness() -> Harness {
    harness_with_reviews(50).await
}

pub async fn harness_with_reviews(max_reviews_per_day: u32) -> Harness {
    let db = Database::in_memory().await.expect("in-memory db");
    let broker = Arc::new(MockBrokerage::new());
    let chat = Arc::new(MockChatModel::new());
    let coordinator = Arc::new(Coordinator::new(max_reviews_per_day));

    Harness {
        db,
        broker: broker.clone(),
        chat: chat.clone(),
        coordinator: coordinator.clone(),
        signals: SignalEngine::heuristic_only(),
        analyst: Analyst::new(chat, coordinator),
        risk: RiskManager::new(test_limits()),
        executor: TradeExecutor::new(broker.clone()),
        tracker: PortfolioTracker::new(broker),
    }
}

impl Harness {
    pub fn into_trading_loop(self, watchlist: Vec<&str>) -> TradingLoop {
        TradingLoop::new(
            self.db,
            self.broker,
            None,
            self.signals,
            self.analyst,
            self.risk,
            self.executor,
            self.tracker,
            self.coordinator,
            Box::new(RealizedVolProxy),
            TradingLoopConfig {
                watchlist: watchlist.into_iter().map(String::from).collect(),
                timeframe: "1Day".to_string(),
                cycle_interval_minutes: 5,
                trading_start_hour: 9,
                trading_end_hour: 16,
            },
        )
    }
}

/// Tuesday 2025-06-10, 11:00 ET: an ordinary mid-session instant.
pub fn trading_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()
}

/// Indicator values that push the heuristic well into BUY territory:
/// score (2 + 1 + 1 + 1 + 1.5) / 7.5 yields 0.76 confidence.
pub fn oversold_indicators() -> IndicatorSet {
    let mut ind = IndicatorSet::new();
    let mut set = |k: &str, v: f64| {
        ind.insert(k.to_string(), Some(v));
    };
    set("close", 185.0);
    set("rsi_14", 25.0);
    set("macd_histogram", 0.1);
    set("ema12_ema26_cross", 1.0);
    set("sma20_sma50_cross", 1.0);
    set("parabolic_sar_signal", -1.0);
    set("volume_price_confirmation", 1.0);
    set("bb_position", 0.15);
    set("atr_14", 2.85);
    set("volume_vs_sma20", 1.6);
    set("return_1d", 0.012);
    set("sma_20", 188.0);
    set("sma_50", 192.0);
    ind
}

/// A gently trending daily series long enough for a full indicator pass.
pub fn daily_bars(symbol: &str, n: usize) -> Vec<tradepulse::domain::types::Bar> {
    (0..n)
        .map(|i| {
            let base = 100.0 + i as f64 * 0.4;
            tradepulse::domain::types::Bar {
                symbol: symbol.to_string(),
                timeframe: "1Day".to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
                open: base,
                high: base + 1.2,
                low: base - 1.2,
                close: base + 0.5,
                volume: 1_000_000,
                vwap: None,
                trade_count: None,
            }
        })
        .collect()
}

pub fn healthy_snapshot(now: DateTime<Utc>) -> PortfolioSnapshot {
    PortfolioSnapshot {
        timestamp: now,
        total_equity: 100_000.0,
        cash: 60_000.0,
        market_value: 40_000.0,
        daily_pnl: 0.0,
        daily_pnl_pct: 0.0,
        weekly_pnl: 0.0,
        weekly_pnl_pct: 0.0,
        monthly_pnl: 0.0,
        monthly_pnl_pct: 0.0,
        peak_equity: 100_000.0,
        current_drawdown_pct: 0.0,
        total_exposure_pct: 40.0,
        open_positions_count: 3,
        positions: Default::default(),
        sector_exposure: Default::default(),
        trades_today: 1,
    }
}

pub fn approving_review_json(sizing: &str) -> String {
    format!(
        r#"{{
            "adjusted_confidence": 0.78,
            "confidence_adjustment": 2,
            "position_sizing": "{sizing}",
            "reasoning": "Setup is clean and volume confirms.",
            "risk_flags": [],
            "approve": true
        }}"#
    )
}
