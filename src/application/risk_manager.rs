//! The risk manager has absolute authority over all trades: it owns the
//! circuit-breaker state machine and the pre-trade gate, and can veto any
//! order regardless of what upstream components decided.

use crate::application::audit_journal::{AuditEvent, AuditJournal};
use crate::domain::audit::Severity;
use crate::domain::portfolio::{MarketContext, PortfolioSnapshot};
use crate::domain::risk::{
    CircuitBreakerLevel, HARD_MAX_DAILY_LOSS_PCT, HARD_MAX_DRAWDOWN_PCT,
    HARD_MAX_MONTHLY_LOSS_PCT, HARD_MAX_OPEN_POSITIONS, HARD_MAX_POSITION_PCT,
    HARD_MAX_TRADES_PER_DAY, HARD_MAX_WEEKLY_LOSS_PCT, RiskCheckResult, RiskEvent,
};
use crate::domain::types::TradeAction;
use crate::infrastructure::persistence::repositories::RiskEventRepository;
use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::America::New_York;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{error, warn};
use uuid::Uuid;

/// Confidence floor below which no trade is admitted.
const MIN_ACCEPT_CONFIDENCE: f64 = 0.60;
/// Portfolio-wide exposure ceiling.
const MAX_TOTAL_EXPOSURE_PCT: f64 = 80.0;
/// Sector exposure above this only warns; it never blocks.
const SECTOR_WARN_PCT: f64 = 30.0;
/// Per-symbol allocation ceiling after all adjustments.
const MAX_SINGLE_STOCK_PCT: f64 = 15.0;
/// VIX above this rejects outright; above the soft bound it halves size.
const VIX_REJECT: f64 = 35.0;
const VIX_HALVE: f64 = 25.0;

/// Configured limits. Read through the clamped accessors only.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_position_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_monthly_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_open_positions: i64,
    pub max_trades_per_day: i64,
}

impl RiskLimits {
    pub fn max_position_pct(&self) -> f64 {
        self.max_position_pct.min(HARD_MAX_POSITION_PCT)
    }
    pub fn max_daily_loss_pct(&self) -> f64 {
        self.max_daily_loss_pct.min(HARD_MAX_DAILY_LOSS_PCT)
    }
    pub fn max_weekly_loss_pct(&self) -> f64 {
        self.max_weekly_loss_pct.min(HARD_MAX_WEEKLY_LOSS_PCT)
    }
    pub fn max_monthly_loss_pct(&self) -> f64 {
        self.max_monthly_loss_pct.min(HARD_MAX_MONTHLY_LOSS_PCT)
    }
    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct.min(HARD_MAX_DRAWDOWN_PCT)
    }
    pub fn max_open_positions(&self) -> i64 {
        self.max_open_positions.min(HARD_MAX_OPEN_POSITIONS)
    }
    pub fn max_trades_per_day(&self) -> i64 {
        self.max_trades_per_day.min(HARD_MAX_TRADES_PER_DAY)
    }
}

pub struct RiskManager {
    limits: RiskLimits,
    level: CircuitBreakerLevel,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            level: CircuitBreakerLevel::None,
        }
    }

    pub fn level(&self) -> CircuitBreakerLevel {
        self.level
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// The in-memory level is advisory; on startup it is re-derived from
    /// the most recent unresolved stored event.
    pub async fn reconcile(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        if let Some(event) = RiskEventRepository::latest_unresolved(conn).await? {
            warn!(
                "Reconciled circuit breaker to {} from stored event ({})",
                event.level, event.trigger_reason
            );
            self.level = event.level;
        }
        Ok(())
    }

    // ===== Circuit breaker =====

    /// Pure classification of the breaker level from loss figures. First
    /// matching condition wins, most severe first.
    pub fn classify_level(&self, snapshot: &PortfolioSnapshot) -> CircuitBreakerLevel {
        let loss = |pnl_pct: f64| if pnl_pct < 0.0 { pnl_pct.abs() } else { 0.0 };
        let daily_loss = loss(snapshot.daily_pnl_pct);
        let weekly_loss = loss(snapshot.weekly_pnl_pct);
        let monthly_loss = loss(snapshot.monthly_pnl_pct);
        let drawdown = snapshot.current_drawdown_pct;

        if monthly_loss > self.limits.max_monthly_loss_pct()
            || drawdown > self.limits.max_drawdown_pct()
        {
            CircuitBreakerLevel::Red
        } else if daily_loss > self.limits.max_daily_loss_pct()
            || weekly_loss > self.limits.max_weekly_loss_pct()
        {
            CircuitBreakerLevel::Orange
        } else if daily_loss > self.limits.max_daily_loss_pct() * 0.5 {
            CircuitBreakerLevel::Yellow
        } else {
            CircuitBreakerLevel::None
        }
    }

    /// Re-evaluates the breaker from the latest snapshot, persisting a
    /// RiskEvent and audit entry on any transition.
    pub async fn evaluate_circuit_breakers(
        &mut self,
        conn: &mut SqliteConnection,
        snapshot: &PortfolioSnapshot,
    ) -> Result<CircuitBreakerLevel> {
        let loss = |pnl_pct: f64| if pnl_pct < 0.0 { pnl_pct.abs() } else { 0.0 };
        let daily_loss = loss(snapshot.daily_pnl_pct);
        let weekly_loss = loss(snapshot.weekly_pnl_pct);
        let monthly_loss = loss(snapshot.monthly_pnl_pct);
        let drawdown = snapshot.current_drawdown_pct;

        let old_level = self.level;
        self.level = self.classify_level(snapshot);

        if self.level != old_level {
            warn!("Circuit breaker changed: {} -> {}", old_level, self.level);

            let details = json!({
                "daily_loss_pct": daily_loss,
                "weekly_loss_pct": weekly_loss,
                "monthly_loss_pct": monthly_loss,
                "drawdown_pct": drawdown,
                "old_level": old_level.as_str(),
                "new_level": self.level.as_str(),
            });
            let event = RiskEvent {
                id: 0,
                timestamp: Utc::now(),
                level: self.level,
                trigger_reason: format!(
                    "daily={daily_loss:.2}% weekly={weekly_loss:.2}% monthly={monthly_loss:.2}% drawdown={drawdown:.2}%"
                ),
                trigger_value: daily_loss.max(weekly_loss).max(monthly_loss).max(drawdown),
                threshold_value: self.limits.max_daily_loss_pct(),
                action_taken: self.level.action_taken().to_string(),
                resolved: self.level == CircuitBreakerLevel::None,
                resolved_by: (self.level == CircuitBreakerLevel::None)
                    .then(|| "auto".to_string()),
                details: details.clone(),
            };
            RiskEventRepository::insert(conn, &event).await?;

            AuditJournal::append(
                conn,
                AuditEvent::new("circuit_breaker_changed", "risk_manager", details).severity(
                    if self.level == CircuitBreakerLevel::Red {
                        Severity::Critical
                    } else {
                        Severity::Warning
                    },
                ),
            )
            .await?;
        }

        Ok(self.level)
    }

    // ===== Pre-trade gate =====

    /// Full pre-trade validation. Ten ordered checks, first failure wins.
    #[allow(clippy::too_many_arguments)]
    pub async fn pre_trade_check(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        action: TradeAction,
        confidence: f64,
        position_pct: f64,
        snapshot: &PortfolioSnapshot,
        market: &MarketContext,
        decision_chain_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<RiskCheckResult> {
        let result = self.run_checks(action, confidence, position_pct, snapshot, market, now);

        let mut event = AuditEvent::new(
            if result.approved {
                "risk_check_passed"
            } else {
                "risk_check_failed"
            },
            "risk_manager",
            json!({
                "symbol": symbol,
                "action": action.to_string(),
                "confidence": confidence,
                "original_size_pct": position_pct,
                "adjusted_size_pct": result.adjusted_size_pct,
                "reason": result.reason,
                "warnings": result.warnings,
                "circuit_breaker": self.level.as_str(),
            }),
        )
        .symbol(symbol);
        if let Some(chain_id) = decision_chain_id {
            event = event.chain(chain_id);
        }
        AuditJournal::append(conn, event).await?;

        Ok(result)
    }

    fn run_checks(
        &self,
        action: TradeAction,
        confidence: f64,
        position_pct: f64,
        snapshot: &PortfolioSnapshot,
        market: &MarketContext,
        now: DateTime<Utc>,
    ) -> RiskCheckResult {
        let mut warnings = Vec::new();

        // 1. Circuit breaker status
        if self.level == CircuitBreakerLevel::Red {
            return RiskCheckResult::reject("RED circuit breaker active, system halted");
        }
        if self.level == CircuitBreakerLevel::Orange && action != TradeAction::Sell {
            return RiskCheckResult::reject("ORANGE circuit breaker, only exits allowed");
        }

        // 2. Minimum confidence threshold
        if confidence < MIN_ACCEPT_CONFIDENCE {
            return RiskCheckResult::reject(format!(
                "Confidence {:.1}% below minimum {:.1}%",
                confidence * 100.0,
                MIN_ACCEPT_CONFIDENCE * 100.0
            ));
        }

        // 3. Daily trade limit
        if snapshot.trades_today >= self.limits.max_trades_per_day() {
            return RiskCheckResult::reject(format!(
                "Daily trade limit reached ({}/{})",
                snapshot.trades_today,
                self.limits.max_trades_per_day()
            ));
        }

        // 4. Position size clamp, halved under YELLOW
        let mut adjusted_pct = position_pct.min(self.limits.max_position_pct());
        if self.level == CircuitBreakerLevel::Yellow {
            adjusted_pct *= self.level.size_multiplier();
            warnings.push("YELLOW circuit breaker, position size halved".to_string());
        }

        // 5. Volatility index
        if market.vix > VIX_REJECT {
            return RiskCheckResult::reject(format!(
                "VIX ({:.1}) exceeds max threshold ({:.1})",
                market.vix, VIX_REJECT
            ));
        }
        if market.vix > VIX_HALVE {
            adjusted_pct *= 0.5;
            warnings.push(format!(
                "High VIX ({:.1}), position size halved",
                market.vix
            ));
        }

        // 6. Portfolio exposure ceiling
        if snapshot.total_exposure_pct + adjusted_pct > MAX_TOTAL_EXPOSURE_PCT {
            return RiskCheckResult::reject(format!(
                "Total exposure ({:.1}%) would exceed {:.0}%",
                snapshot.total_exposure_pct + adjusted_pct,
                MAX_TOTAL_EXPOSURE_PCT
            ));
        }

        // 7. Open position count (entries only)
        if action == TradeAction::Buy
            && snapshot.open_positions_count >= self.limits.max_open_positions()
        {
            return RiskCheckResult::reject(format!(
                "Max open positions reached ({}/{})",
                snapshot.open_positions_count,
                self.limits.max_open_positions()
            ));
        }

        // 8. Sector concentration warns but never blocks
        for (sector, pct) in &snapshot.sector_exposure {
            if *pct > SECTOR_WARN_PCT {
                warnings.push(format!(
                    "Sector {sector} exposure ({pct:.1}%) exceeds recommended {SECTOR_WARN_PCT:.0}%"
                ));
            }
        }

        // 9. Single-stock ceiling
        if adjusted_pct > MAX_SINGLE_STOCK_PCT {
            adjusted_pct = MAX_SINGLE_STOCK_PCT;
            warnings.push(format!(
                "Position capped to {MAX_SINGLE_STOCK_PCT:.0}% single stock limit"
            ));
        }

        // 10. Market timing: no entries in the first 15 minutes after the
        // open or the last 10 minutes before the close (US Eastern).
        let et = now.with_timezone(&New_York);
        let minute_of_day = (et.hour() * 60 + et.minute()) as i64;
        let since_open = minute_of_day - (9 * 60 + 30);
        let before_close = 16 * 60 - minute_of_day;
        if (0..15).contains(&since_open) {
            return RiskCheckResult::reject("No trades in first 15 minutes after open");
        }
        if before_close < 10 {
            return RiskCheckResult::reject("No trades in last 10 minutes before close");
        }

        RiskCheckResult::approve(adjusted_pct, warnings)
    }

    // ===== Emergency stop =====

    /// Forces RED immediately and records the manual event. Cleared only
    /// by operator restart or resume.
    pub async fn emergency_stop(
        &mut self,
        conn: &mut SqliteConnection,
        reason: &str,
    ) -> Result<()> {
        self.level = CircuitBreakerLevel::Red;
        error!("EMERGENCY STOP ACTIVATED: {}", reason);

        let event = RiskEvent {
            id: 0,
            timestamp: Utc::now(),
            level: CircuitBreakerLevel::Red,
            trigger_reason: reason.to_string(),
            trigger_value: 0.0,
            threshold_value: 0.0,
            action_taken: "emergency_close_all_halt_system".to_string(),
            resolved: false,
            resolved_by: None,
            details: json!({ "manual": true, "reason": reason }),
        };
        RiskEventRepository::insert(conn, &event).await?;

        AuditJournal::append(
            conn,
            AuditEvent::new(
                "emergency_stop_activated",
                "risk_manager",
                json!({ "reason": reason }),
            )
            .severity(Severity::Critical),
        )
        .await?;

        Ok(())
    }

    /// Weekday inside the configured ET session window, with the first
    /// entry at :35 past the opening hour and the last five minutes of the
    /// closing hour excluded.
    pub fn in_trading_window(now: DateTime<Utc>, start_hour: u32, end_hour: u32) -> bool {
        let et = now.with_timezone(&New_York);
        let weekday = et.weekday().number_from_monday();
        if weekday > 5 {
            return false;
        }
        let minute_of_day = et.hour() * 60 + et.minute();
        minute_of_day >= start_hour * 60 + 35 && minute_of_day <= end_hour * 60 - 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limits() -> RiskLimits {
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

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            timestamp: Utc::now(),
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
            trades_today: 2,
        }
    }

    // 11:00 ET on a Tuesday, well inside the session.
    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()
    }

    fn check(
        manager: &RiskManager,
        action: TradeAction,
        confidence: f64,
        snapshot: &PortfolioSnapshot,
        market: &MarketContext,
        now: DateTime<Utc>,
    ) -> RiskCheckResult {
        manager.run_checks(action, confidence, 5.0, snapshot, market, now)
    }

    #[test]
    fn test_limits_clamped_to_hard_caps() {
        let limits = RiskLimits {
            max_position_pct: 25.0,
            max_daily_loss_pct: 9.0,
            max_weekly_loss_pct: 50.0,
            max_monthly_loss_pct: 50.0,
            max_drawdown_pct: 90.0,
            max_open_positions: 40,
            max_trades_per_day: 99,
        };
        assert_eq!(limits.max_position_pct(), 10.0);
        assert_eq!(limits.max_daily_loss_pct(), 5.0);
        assert_eq!(limits.max_weekly_loss_pct(), 10.0);
        assert_eq!(limits.max_monthly_loss_pct(), 15.0);
        assert_eq!(limits.max_drawdown_pct(), 20.0);
        assert_eq!(limits.max_open_positions(), 15);
        assert_eq!(limits.max_trades_per_day(), 20);
    }

    #[test]
    fn test_happy_path_approves_with_clamped_size() {
        let manager = RiskManager::new(limits());
        let result = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snapshot(),
            &MarketContext::default(),
            midday(),
        );
        assert!(result.approved);
        assert_eq!(result.adjusted_size_pct, Some(5.0));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_confidence_floor() {
        let manager = RiskManager::new(limits());
        let result = check(
            &manager,
            TradeAction::Buy,
            0.55,
            &snapshot(),
            &MarketContext::default(),
            midday(),
        );
        assert!(!result.approved);
        assert!(result.reason.contains("below minimum"));
    }

    #[test]
    fn test_vix_boundaries() {
        let manager = RiskManager::new(limits());
        let mut market = MarketContext::default();

        market.vix = 36.0;
        let result = check(&manager, TradeAction::Buy, 0.78, &snapshot(), &market, midday());
        assert!(!result.approved);
        assert_eq!(result.reason, "VIX (36.0) exceeds max threshold (35.0)");

        market.vix = 28.0;
        let result = check(&manager, TradeAction::Buy, 0.78, &snapshot(), &market, midday());
        assert!(result.approved);
        assert_eq!(result.adjusted_size_pct, Some(2.5));
        assert!(result.warnings.iter().any(|w| w.contains("High VIX")));

        market.vix = 25.0;
        let result = check(&manager, TradeAction::Buy, 0.78, &snapshot(), &market, midday());
        assert_eq!(result.adjusted_size_pct, Some(5.0));
    }

    #[test]
    fn test_exposure_ceiling() {
        let manager = RiskManager::new(limits());
        let mut snap = snapshot();
        snap.total_exposure_pct = 77.0;
        let result = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snap,
            &MarketContext::default(),
            midday(),
        );
        assert!(!result.approved);
        assert!(result.reason.contains("exceed 80%"));
    }

    #[test]
    fn test_open_positions_blocks_buys_not_sells() {
        let manager = RiskManager::new(limits());
        let mut snap = snapshot();
        snap.open_positions_count = 8;
        let buy = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snap,
            &MarketContext::default(),
            midday(),
        );
        assert!(!buy.approved);
        let sell = check(
            &manager,
            TradeAction::Sell,
            0.78,
            &snap,
            &MarketContext::default(),
            midday(),
        );
        assert!(sell.approved);
    }

    #[test]
    fn test_trade_count_limit() {
        let manager = RiskManager::new(limits());
        let mut snap = snapshot();
        snap.trades_today = 10;
        let result = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snap,
            &MarketContext::default(),
            midday(),
        );
        assert!(!result.approved);
        assert!(result.reason.contains("Daily trade limit"));
    }

    #[test]
    fn test_sector_warning_is_not_fatal() {
        let manager = RiskManager::new(limits());
        let mut snap = snapshot();
        snap.sector_exposure
            .insert("Technology".to_string(), 42.0);
        let result = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snap,
            &MarketContext::default(),
            midday(),
        );
        assert!(result.approved);
        assert!(result.warnings.iter().any(|w| w.contains("Technology")));
    }

    #[test]
    fn test_market_timing_boundaries() {
        let manager = RiskManager::new(limits());
        let snap = snapshot();
        let market = MarketContext::default();
        // 2025-06-10 is an EDT Tuesday: 9:30 ET = 13:30 UTC.
        let at = |h, m| Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap();

        // 9:44 ET: minute 14 after the open still rejects.
        let result = check(&manager, TradeAction::Buy, 0.78, &snap, &market, at(13, 44));
        assert!(!result.approved);
        assert!(result.reason.contains("first 15 minutes"));

        // 9:45 ET: minute 15 passes.
        let result = check(&manager, TradeAction::Buy, 0.78, &snap, &market, at(13, 45));
        assert!(result.approved);

        // 15:51 ET: 9 minutes before the close rejects.
        let result = check(&manager, TradeAction::Buy, 0.78, &snap, &market, at(19, 51));
        assert!(!result.approved);
        assert!(result.reason.contains("last 10 minutes"));

        // 15:50 ET: 10 minutes before the close passes.
        let result = check(&manager, TradeAction::Buy, 0.78, &snap, &market, at(19, 50));
        assert!(result.approved);
    }

    #[test]
    fn test_circuit_breaker_precedence_table() {
        let manager = RiskManager::new(limits());
        let classify = |daily: f64, weekly: f64, monthly: f64, drawdown: f64| {
            let mut snap = snapshot();
            snap.daily_pnl_pct = daily;
            snap.weekly_pnl_pct = weekly;
            snap.monthly_pnl_pct = monthly;
            snap.current_drawdown_pct = drawdown;
            manager.classify_level(&snap)
        };

        assert_eq!(classify(0.0, 0.0, 0.0, 0.0), CircuitBreakerLevel::None);
        assert_eq!(classify(-1.8, 0.0, 0.0, 0.0), CircuitBreakerLevel::Yellow);
        assert_eq!(classify(-3.5, 0.0, 0.0, 0.0), CircuitBreakerLevel::Orange);
        assert_eq!(classify(0.0, -5.5, 0.0, 0.0), CircuitBreakerLevel::Orange);
        assert_eq!(classify(0.0, 0.0, -9.0, 0.0), CircuitBreakerLevel::Red);
        assert_eq!(classify(0.0, 0.0, 0.0, 13.0), CircuitBreakerLevel::Red);
        // RED outranks a simultaneous ORANGE condition.
        assert_eq!(classify(-4.0, 0.0, -9.0, 0.0), CircuitBreakerLevel::Red);
        // Positive pnl never trips a loss breaker.
        assert_eq!(classify(4.0, 6.0, 10.0, 0.0), CircuitBreakerLevel::None);
    }

    #[test]
    fn test_orange_blocks_buys_allows_sells() {
        let mut manager = RiskManager::new(limits());
        manager.level = CircuitBreakerLevel::Orange;
        let buy = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snapshot(),
            &MarketContext::default(),
            midday(),
        );
        assert!(!buy.approved);
        assert!(buy.reason.contains("ORANGE"));
        let sell = check(
            &manager,
            TradeAction::Sell,
            0.78,
            &snapshot(),
            &MarketContext::default(),
            midday(),
        );
        assert!(sell.approved);
    }

    #[test]
    fn test_yellow_halves_size() {
        let mut manager = RiskManager::new(limits());
        manager.level = CircuitBreakerLevel::Yellow;
        let result = check(
            &manager,
            TradeAction::Buy,
            0.78,
            &snapshot(),
            &MarketContext::default(),
            midday(),
        );
        assert!(result.approved);
        assert_eq!(result.adjusted_size_pct, Some(2.5));
    }

    #[test]
    fn test_red_rejects_everything() {
        let mut manager = RiskManager::new(limits());
        manager.level = CircuitBreakerLevel::Red;
        for action in [TradeAction::Buy, TradeAction::Sell] {
            let result = check(
                &manager,
                action,
                0.99,
                &snapshot(),
                &MarketContext::default(),
                midday(),
            );
            assert!(!result.approved);
            assert!(result.reason.contains("RED"));
        }
    }

    #[test]
    fn test_trading_window() {
        // EDT Tuesday.
        let at = |h, m| Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap();
        assert!(!RiskManager::in_trading_window(at(13, 34), 9, 16)); // 9:34 ET
        assert!(RiskManager::in_trading_window(at(13, 35), 9, 16)); // 9:35 ET
        assert!(RiskManager::in_trading_window(at(19, 55), 9, 16)); // 15:55 ET
        assert!(!RiskManager::in_trading_window(at(19, 56), 9, 16)); // 15:56 ET
        // Saturday.
        let sat = Utc.with_ymd_and_hms(2025, 6, 14, 15, 0, 0).unwrap();
        assert!(!RiskManager::in_trading_window(sat, 9, 16));
    }
}
