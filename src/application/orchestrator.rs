//! The trading loop: one periodic cycle wiring ingestion, indicators,
//! scoring, analyst review, the risk gate, and execution together, with a
//! cycle-scoped database transaction as the unit of consistency.

use crate::application::analyst::{Analyst, SymbolContext};
use crate::application::audit_journal::{AuditEvent, AuditJournal};
use crate::application::coordinator::Coordinator;
use crate::application::executor::TradeExecutor;
use crate::application::indicators::{HISTORY_BARS, IndicatorEngine, IndicatorSet, value};
use crate::application::portfolio_tracker::PortfolioTracker;
use crate::application::risk_manager::RiskManager;
use crate::application::sectors::sector_for;
use crate::application::signal_engine::SignalEngine;
use crate::domain::audit::Severity;
use crate::domain::portfolio::{MarketContext, PortfolioSnapshot, VolatilityIndex};
use crate::domain::ports::Brokerage;
use crate::domain::risk::CircuitBreakerLevel;
use crate::domain::types::SignalStatus;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{BarRepository, SignalRepository};
use crate::infrastructure::stooq::StooqClient;
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Broad-market index backing the market context.
const INDEX_SYMBOL: &str = "SPY";

#[derive(Debug, Clone, Serialize)]
pub struct CycleResults {
    pub cycle_id: String,
    pub symbols_processed: usize,
    pub signals_generated: usize,
    pub signals_approved: usize,
    pub trades_placed: usize,
    pub errors: Vec<String>,
}

impl CycleResults {
    fn new(cycle_id: String) -> Self {
        Self {
            cycle_id,
            symbols_processed: 0,
            signals_generated: 0,
            signals_approved: 0,
            trades_placed: 0,
            errors: Vec::new(),
        }
    }
}

enum CycleOutcome {
    Completed,
    /// Aborted early but with state worth keeping (snapshot, risk event).
    Aborted,
}

pub struct TradingLoopConfig {
    pub watchlist: Vec<String>,
    pub timeframe: String,
    pub cycle_interval_minutes: u64,
    pub trading_start_hour: u32,
    pub trading_end_hour: u32,
}

pub struct TradingLoop {
    db: Database,
    broker: Arc<dyn Brokerage>,
    stooq: Option<StooqClient>,
    signals: SignalEngine,
    analyst: Analyst,
    risk: RiskManager,
    executor: TradeExecutor,
    tracker: PortfolioTracker,
    coordinator: Arc<Coordinator>,
    vix: Box<dyn VolatilityIndex>,
    config: TradingLoopConfig,
}

impl TradingLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        broker: Arc<dyn Brokerage>,
        stooq: Option<StooqClient>,
        signals: SignalEngine,
        analyst: Analyst,
        risk: RiskManager,
        executor: TradeExecutor,
        tracker: PortfolioTracker,
        coordinator: Arc<Coordinator>,
        vix: Box<dyn VolatilityIndex>,
        config: TradingLoopConfig,
    ) -> Self {
        Self {
            db,
            broker,
            stooq,
            signals,
            analyst,
            risk,
            executor,
            tracker,
            coordinator,
            vix,
            config,
        }
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    /// Rebuilds advisory state from persisted rows; called once at startup.
    pub async fn restore(&mut self) -> Result<()> {
        let mut conn = self.db.pool.acquire().await?;
        self.risk.reconcile(&mut conn).await
    }

    // ===== One cycle =====

    /// Runs one full cycle over the watchlist. Per-symbol failures land in
    /// the error list; only a cycle-level failure rolls the write set back.
    /// A completion audit entry is always attempted on a fresh connection.
    pub async fn run_cycle(&mut self) -> CycleResults {
        let now = Utc::now();
        let cycle_id = Uuid::new_v4().to_string()[..8].to_string();
        let mut results = CycleResults::new(cycle_id.clone());
        info!("=== Trading cycle {} starting ===", cycle_id);

        match self.db.pool.begin().await {
            Ok(mut tx) => {
                match self.cycle_body(&mut tx, &mut results, now).await {
                    Ok(_) => {
                        if let Err(e) = tx.commit().await {
                            error!("Cycle commit failed: {}", e);
                            results.errors.push(format!("commit failed: {e}"));
                        }
                    }
                    Err(e) => {
                        error!("Trading cycle failed: {}", e);
                        results.errors.push(e.to_string());
                        if let Err(rb) = tx.rollback().await {
                            error!("Cycle rollback failed: {}", rb);
                        }
                    }
                }
            }
            Err(e) => {
                error!("Could not open cycle transaction: {}", e);
                results.errors.push(format!("transaction open failed: {e}"));
            }
        }

        AuditJournal::append_best_effort(
            &self.db.pool,
            AuditEvent::new(
                "cycle_completed",
                "orchestrator",
                serde_json::to_value(&results).unwrap_or(json!({})),
            ),
        )
        .await;

        info!(
            "=== Cycle {} complete: {} symbols, {} signals, {} approved, {} trades ===",
            cycle_id,
            results.symbols_processed,
            results.signals_generated,
            results.signals_approved,
            results.trades_placed,
        );
        results
    }

    async fn cycle_body(
        &mut self,
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        results: &mut CycleResults,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let conn: &mut SqliteConnection = &mut *tx;

        // 1. Portfolio snapshot + circuit breaker evaluation
        let snapshot = match self.tracker.snapshot(conn, now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to get portfolio snapshot: {}", e);
                results.errors.push(format!("portfolio_snapshot_failed: {e}"));
                return Ok(CycleOutcome::Aborted);
            }
        };

        let level = self.risk.evaluate_circuit_breakers(conn, &snapshot).await?;
        if level == CircuitBreakerLevel::Red {
            error!("RED circuit breaker, aborting cycle");
            AuditJournal::append(
                conn,
                AuditEvent::new(
                    "cycle_aborted",
                    "orchestrator",
                    json!({ "reason": "RED circuit breaker", "cycle_id": results.cycle_id }),
                )
                .severity(Severity::Critical),
            )
            .await?;
            return Ok(CycleOutcome::Aborted);
        }

        // 2. Latest bars for the watchlist
        let symbols = self.config.watchlist.clone();
        let timeframe = self.config.timeframe.clone();
        self.ingest_bars(conn, &symbols, &timeframe, HISTORY_BARS)
            .await?;

        // 3. Market context (broad index + volatility reading)
        let market = self.build_market_context(conn).await;

        // 4. Score and process each symbol independently
        for symbol in &symbols {
            let indicators =
                match IndicatorEngine::compute_for_symbol(conn, symbol, &timeframe).await {
                    Ok(Some(indicators)) => indicators,
                    Ok(None) => continue,
                    Err(e) => {
                        results.errors.push(format!("{symbol}: {e}"));
                        continue;
                    }
                };
            results.symbols_processed += 1;

            if let Err(e) = self
                .process_symbol(conn, symbol, &indicators, &market, &snapshot, results, now)
                .await
            {
                error!("Error processing {}: {}", symbol, e);
                results.errors.push(format!("{symbol}: {e}"));
            }
        }

        Ok(CycleOutcome::Completed)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_symbol(
        &mut self,
        conn: &mut SqliteConnection,
        symbol: &str,
        indicators: &IndicatorSet,
        market: &MarketContext,
        snapshot: &PortfolioSnapshot,
        results: &mut CycleResults,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some((mut signal, features)) = self
            .signals
            .generate_signal(conn, symbol, indicators, market, now)
            .await?
        else {
            return Ok(());
        };
        results.signals_generated += 1;

        let price = match value(indicators, "close") {
            Some(price) if price > 0.0 => price,
            _ => bail!("no usable price"),
        };

        let context = self
            .build_symbol_context(conn, symbol, indicators, market, price)
            .await;
        let review = self
            .analyst
            .review_signal(conn, &signal, &context, now)
            .await?;

        signal.analyst_approved = Some(review.approve);
        signal.analyst_adjusted_confidence = Some(review.adjusted_confidence);
        signal.analyst_reasoning = Some(review.reasoning.clone());
        signal.analyst_risk_flags = Some(review.risk_flags.clone());
        signal.analyst_position_sizing = Some(review.position_sizing.as_str().to_string());
        signal.reviewed_at = Some(now);

        if !review.approve {
            signal.status = SignalStatus::Rejected;
            SignalRepository::update_review(conn, &signal).await?;
            return Ok(());
        }
        results.signals_approved += 1;
        signal.status = SignalStatus::Approved;

        let trade = self
            .executor
            .execute(
                conn, &self.risk, &mut signal, &review, &features, snapshot, market, price, now,
            )
            .await?;

        if trade.is_some() {
            signal.status = SignalStatus::Executed;
            results.trades_placed += 1;
        } else if signal.risk_approved == Some(false) {
            signal.status = SignalStatus::Rejected;
        }
        SignalRepository::update_review(conn, &signal).await?;

        Ok(())
    }

    // ===== Data ingestion =====

    /// Fetches and upserts bars for each symbol. Transport failures fall
    /// back to the free daily feed where possible and otherwise only warn;
    /// persistence failures propagate.
    async fn ingest_bars(
        &self,
        conn: &mut SqliteConnection,
        symbols: &[String],
        timeframe: &str,
        limit: usize,
    ) -> Result<usize> {
        let mut total = 0;
        for symbol in symbols {
            let bars = match self.broker.get_bars(symbol, timeframe, limit).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!("Bar fetch failed for {}: {}", symbol, e);
                    match (&self.stooq, timeframe) {
                        (Some(stooq), "1Day" | "1D") => {
                            match stooq.get_daily_bars(symbol, limit).await {
                                Ok(bars) => bars,
                                Err(e2) => {
                                    error!("Daily fallback also failed for {}: {}", symbol, e2);
                                    continue;
                                }
                            }
                        }
                        _ => continue,
                    }
                }
            };
            for bar in &bars {
                BarRepository::upsert(conn, bar).await?;
            }
            total += bars.len();
        }
        info!(
            "Ingested {} bars for {} symbols ({})",
            total,
            symbols.len(),
            timeframe
        );
        Ok(total)
    }

    // ===== Context builders =====

    async fn build_market_context(&self, conn: &mut SqliteConnection) -> MarketContext {
        let mut closes: Vec<f64> = BarRepository::latest(conn, INDEX_SYMBOL, "1Day", 30)
            .await
            .map(|bars| bars.iter().map(|b| b.close).collect())
            .unwrap_or_default();

        if closes.len() < 21 {
            if let Ok(bars) = self.broker.get_bars(INDEX_SYMBOL, "1Day", 30).await {
                closes = bars.iter().map(|b| b.close).collect();
            }
        }

        let spy_return_1d = if closes.len() >= 2 && closes[closes.len() - 2] > 0.0 {
            closes[closes.len() - 1] / closes[closes.len() - 2] - 1.0
        } else {
            0.0
        };
        let (vix, vix_change) = self.vix.read(&closes);

        MarketContext {
            spy_return_1d,
            vix,
            vix_change,
        }
    }

    async fn build_symbol_context(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        indicators: &IndicatorSet,
        market: &MarketContext,
        price: f64,
    ) -> SymbolContext {
        let (high_52w, low_52w) = self
            .fifty_two_week_range(conn, symbol)
            .await
            .unwrap_or((0.0, 0.0));

        let news = match self.broker.get_news(&[symbol.to_string()], 5).await {
            Ok(news) => news,
            Err(e) => {
                warn!("News fetch failed for {}: {}", symbol, e);
                Vec::new()
            }
        };

        let trend = match (
            value(indicators, "sma_20"),
            value(indicators, "sma_50"),
        ) {
            (Some(sma20), Some(sma50)) if price > sma20 && sma20 > sma50 => "bullish",
            (Some(sma20), Some(sma50)) if price < sma20 && sma20 < sma50 => "bearish",
            (Some(_), Some(_)) => "mixed",
            _ => "neutral",
        };

        SymbolContext {
            price,
            change_pct: value(indicators, "return_1d").unwrap_or(0.0),
            volume_ratio: value(indicators, "volume_vs_sma20").unwrap_or(1.0),
            high_52w,
            low_52w,
            rsi_14: value(indicators, "rsi_14"),
            macd_histogram: value(indicators, "macd_histogram"),
            bb_position: value(indicators, "bb_position"),
            atr_14: value(indicators, "atr_14"),
            trend: trend.to_string(),
            vix: market.vix,
            spy_change: market.spy_return_1d,
            sector: sector_for(symbol).to_string(),
            recent_news: news,
            upcoming_events: String::new(),
        }
    }

    async fn fifty_two_week_range(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
    ) -> Result<(f64, f64)> {
        let bars = BarRepository::latest(conn, symbol, "1Day", 252).await?;
        if bars.is_empty() {
            return Ok((0.0, 0.0));
        }
        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        Ok((high, low))
    }

    /// Context for the on-demand deep-analysis path.
    pub async fn build_analysis_context(&self, symbol: &str) -> Result<SymbolContext> {
        let mut conn = self.db.pool.acquire().await?;
        let market = self.build_market_context(&mut conn).await;

        let indicators =
            IndicatorEngine::compute_for_symbol(&mut conn, symbol, &self.config.timeframe)
                .await?
                .unwrap_or_default();

        let price = match value(&indicators, "close") {
            Some(price) if price > 0.0 => price,
            _ => self.broker.get_latest_trade(symbol).await.unwrap_or(0.0),
        };

        Ok(self
            .build_symbol_context(&mut conn, symbol, &indicators, &market, price)
            .await)
    }

    /// Runs the deep analysis for one symbol, end to end.
    pub async fn analyze_symbol(
        &self,
        symbol: &str,
    ) -> Result<crate::application::analyst::SymbolAnalysis> {
        let context = self.build_analysis_context(symbol).await?;
        let mut conn = self.db.pool.acquire().await?;
        self.analyst
            .analyze_symbol(&mut conn, symbol, &context, Utc::now())
            .await
    }

    // ===== Emergency stop =====

    /// Engages the halt flag, forces RED, and best-effort cancels orders
    /// and closes positions. In-flight cycles finish; the next one skips.
    pub async fn emergency_shutdown(&mut self, reason: &str) -> Result<(usize, usize)> {
        self.coordinator.set_halted(true);
        let mut conn = self.db.pool.acquire().await?;
        self.risk.emergency_stop(&mut conn, reason).await?;

        let cancelled = match self.executor.cancel_all_orders(&mut conn).await {
            Ok(count) => count,
            Err(e) => {
                error!("Emergency order cancel failed: {}", e);
                0
            }
        };
        let closed = match self.executor.close_all_positions(&mut conn).await {
            Ok(count) => count,
            Err(e) => {
                error!("Emergency position close failed: {}", e);
                0
            }
        };
        Ok((cancelled, closed))
    }

    // ===== Scheduling =====

    /// Periodic driver: one tick per configured interval, at most one
    /// cycle in flight, cycles only inside the weekday ET session window.
    pub async fn run(&mut self) -> Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.cycle_interval_minutes * 60,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "Scheduler started: every {} min, {}:35-{}:55 ET, Mon-Fri",
            self.config.cycle_interval_minutes,
            self.config.trading_start_hour,
            self.config.trading_end_hour - 1,
        );

        loop {
            interval.tick().await;
            let now = Utc::now();

            if self.coordinator.is_halted() {
                warn!("Trading cycle skipped, emergency halt active");
                AuditJournal::append_best_effort(
                    &self.db.pool,
                    AuditEvent::new(
                        "cycle_skipped",
                        "orchestrator",
                        json!({ "reason": "emergency halt active" }),
                    )
                    .severity(Severity::Warning),
                )
                .await;
                continue;
            }

            if !RiskManager::in_trading_window(
                now,
                self.config.trading_start_hour,
                self.config.trading_end_hour,
            ) {
                continue;
            }

            self.run_cycle().await;
        }
    }
}
