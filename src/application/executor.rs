//! Trade execution: sizes approved signals with ATR-based stops and
//! targets, places the bracket order, and records the local trade
//! projection. Also carries the emergency broker actions.

use crate::application::analyst::AnalystReview;
use crate::application::audit_journal::{AuditEvent, AuditJournal};
use crate::application::features::FeatureVector;
use crate::application::risk_manager::RiskManager;
use crate::domain::audit::Severity;
use crate::domain::portfolio::{MarketContext, PortfolioSnapshot};
use crate::domain::ports::Brokerage;
use crate::domain::risk::HARD_MAX_POSITION_PCT;
use crate::domain::types::{
    BracketOrder, OrderSide, PositionSize, SignalRecord, TradeAction, TradeRecord, TradeStatus,
};
use crate::infrastructure::persistence::repositories::TradeRepository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

/// Stop distance in ATRs below the entry.
const STOP_ATR_MULT: f64 = 2.0;
/// Target distance in ATRs above the entry.
const TARGET_ATR_MULT: f64 = 3.0;
/// Tiny premium over the last price so the entry limit fills.
const LIMIT_PREMIUM: f64 = 1.001;

/// Exact cents, matching what goes on the wire.
fn round_cents(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2).to_f64().unwrap_or(value))
        .unwrap_or(value)
}

pub struct TradeExecutor {
    broker: Arc<dyn Brokerage>,
}

impl TradeExecutor {
    pub fn new(broker: Arc<dyn Brokerage>) -> Self {
        Self { broker }
    }

    /// ATR-based sizing. The analyst's sizing recommendation scales the
    /// risk-gate-approved allocation before dollars and shares are fixed.
    pub fn calculate_position(
        price: f64,
        features: &FeatureVector,
        review: &AnalystReview,
        equity: f64,
        allocation_pct: f64,
    ) -> PositionSize {
        let atr = {
            let atr = features.get("atr_14");
            if atr > 0.0 { atr } else { price * 0.02 }
        };

        // The analyst can scale the allocation but never past the hard cap.
        let final_pct =
            (allocation_pct * review.position_sizing.multiplier()).min(HARD_MAX_POSITION_PCT);
        let dollar_amount = equity * (final_pct / 100.0);
        let shares = if price > 0.0 {
            ((dollar_amount / price).floor() as i64).max(1)
        } else {
            1
        };

        let stop_price = round_cents(price - STOP_ATR_MULT * atr);
        let target_price = round_cents(price + TARGET_ATR_MULT * atr);
        let limit_price = round_cents(price * LIMIT_PREMIUM);

        let risk = price - stop_price;
        let reward = target_price - price;
        let risk_reward_ratio = if risk > 0.0 {
            round_cents(reward / risk)
        } else {
            0.0
        };

        PositionSize {
            shares,
            dollar_amount: round_cents(shares as f64 * price),
            allocation_pct: round_cents(final_pct),
            limit_price,
            stop_price,
            target_price,
            risk_reward_ratio,
        }
    }

    /// Full pipeline for one approved signal: risk gate, sizing, bracket
    /// placement, persistence, audit. Returns None when any stage stops
    /// the trade; the signal's risk fields are updated in place.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        conn: &mut SqliteConnection,
        risk: &RiskManager,
        signal: &mut SignalRecord,
        review: &AnalystReview,
        features: &FeatureVector,
        snapshot: &PortfolioSnapshot,
        market: &MarketContext,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeRecord>> {
        // 1. Pre-trade risk check
        let check = risk
            .pre_trade_check(
                conn,
                &signal.symbol,
                signal.action,
                review.adjusted_confidence,
                risk.limits().max_position_pct(),
                snapshot,
                market,
                Some(signal.decision_chain_id),
                now,
            )
            .await?;

        if !check.approved {
            signal.risk_approved = Some(false);
            signal.risk_rejection_reason = Some(check.reason.clone());
            AuditJournal::append(
                conn,
                AuditEvent::new(
                    "trade_rejected_risk",
                    "trade_executor",
                    json!({ "symbol": signal.symbol, "reason": check.reason }),
                )
                .symbol(&signal.symbol)
                .chain(signal.decision_chain_id),
            )
            .await?;
            info!(
                "Trade rejected by risk manager: {} - {}",
                signal.symbol, check.reason
            );
            return Ok(None);
        }
        signal.risk_approved = Some(true);

        // 2. Position sizing
        let allocation = check
            .adjusted_size_pct
            .unwrap_or(risk.limits().max_position_pct());
        let position =
            Self::calculate_position(price, features, review, snapshot.total_equity, allocation);
        if position.shares <= 0 {
            warn!("Position sizing produced no shares for {}", signal.symbol);
            return Ok(None);
        }

        // 3. Bracket order at the broker. No local row is written when
        // placement fails.
        let side = if signal.action == TradeAction::Buy {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let order = BracketOrder {
            symbol: signal.symbol.clone(),
            qty: position.shares,
            side,
            limit_price: position.limit_price,
            stop_price: position.stop_price,
            target_price: position.target_price,
        };
        let placed = match self.broker.place_bracket_order(&order).await {
            Ok(placed) => placed,
            Err(e) => {
                warn!("Order placement failed for {}: {}", signal.symbol, e);
                AuditJournal::append(
                    conn,
                    AuditEvent::new(
                        "trade_placement_failed",
                        "trade_executor",
                        json!({ "symbol": signal.symbol, "error": e.to_string() }),
                    )
                    .severity(Severity::Warning)
                    .symbol(&signal.symbol)
                    .chain(signal.decision_chain_id),
                )
                .await?;
                return Ok(None);
            }
        };

        // 4. Local projection
        let mut trade = TradeRecord {
            id: 0,
            decision_chain_id: signal.decision_chain_id,
            signal_id: signal.id,
            broker_order_id: placed.id,
            symbol: signal.symbol.clone(),
            side,
            shares: position.shares,
            entry_price: position.limit_price,
            stop_price: position.stop_price,
            target_price: position.target_price,
            fill_price: None,
            exit_price: None,
            realized_pnl: None,
            ml_confidence: signal.confidence,
            analyst_confidence: Some(review.adjusted_confidence),
            analyst_reasoning: Some(review.reasoning.clone()),
            allocation_pct: position.allocation_pct,
            dollar_amount: position.dollar_amount,
            status: TradeStatus::Pending,
            exit_reason: None,
            placed_at: now,
            filled_at: None,
            closed_at: None,
        };
        trade.id = TradeRepository::insert(conn, &trade).await?;

        // 5. Decision-chain audit
        AuditJournal::append(
            conn,
            AuditEvent::new(
                "trade_placed",
                "trade_executor",
                json!({
                    "symbol": trade.symbol,
                    "side": trade.side.as_str(),
                    "shares": position.shares,
                    "entry_price": position.limit_price,
                    "stop_price": position.stop_price,
                    "target_price": position.target_price,
                    "allocation_pct": position.allocation_pct,
                    "risk_reward": position.risk_reward_ratio,
                    "order_id": trade.broker_order_id,
                }),
            )
            .symbol(&trade.symbol)
            .chain(trade.decision_chain_id),
        )
        .await?;

        info!(
            "Trade placed: {} {} {} shares @ ${:.2} (stop: ${:.2}, target: ${:.2})",
            signal.action,
            trade.symbol,
            position.shares,
            position.limit_price,
            position.stop_price,
            position.target_price,
        );

        Ok(Some(trade))
    }

    // ===== Emergency actions =====

    pub async fn cancel_all_orders(&self, conn: &mut SqliteConnection) -> Result<usize> {
        let count = self.broker.cancel_all_orders().await?;
        AuditJournal::append(
            conn,
            AuditEvent::new(
                "all_orders_cancelled",
                "trade_executor",
                json!({ "count": count }),
            )
            .severity(Severity::Warning),
        )
        .await?;
        Ok(count)
    }

    pub async fn close_all_positions(&self, conn: &mut SqliteConnection) -> Result<usize> {
        let count = self.broker.close_all_positions().await?;
        AuditJournal::append(
            conn,
            AuditEvent::new(
                "all_positions_closed",
                "trade_executor",
                json!({ "count": count }),
            )
            .severity(Severity::Critical),
        )
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::analyst::PositionSizing;
    use crate::application::features::build_features;
    use crate::application::indicators::IndicatorSet;

    fn review(sizing: PositionSizing) -> AnalystReview {
        AnalystReview {
            adjusted_confidence: 0.75,
            confidence_adjustment: 0,
            position_sizing: sizing,
            reasoning: "ok".to_string(),
            risk_flags: Vec::new(),
            approve: true,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    fn features_with_atr(atr: f64) -> FeatureVector {
        let mut ind = IndicatorSet::new();
        ind.insert("atr_14".to_string(), Some(atr));
        build_features(&ind, &MarketContext::default()).unwrap()
    }

    #[test]
    fn test_atr_sizing_levels() {
        let position = TradeExecutor::calculate_position(
            185.0,
            &features_with_atr(2.85),
            &review(PositionSizing::Normal),
            100_000.0,
            5.0,
        );
        assert_eq!(position.stop_price, 179.30);
        assert_eq!(position.target_price, 193.55);
        assert_eq!(position.limit_price, round_cents(185.0 * 1.001));
        // 2 ATR risk vs 3 ATR reward.
        assert!((position.risk_reward_ratio - 1.5).abs() < 0.01);
        // $5,000 at $185 floors to 27 shares.
        assert_eq!(position.shares, 27);
        assert!(position.dollar_amount > 0.0);
    }

    #[test]
    fn test_sizing_multipliers_scale_allocation() {
        let conservative = TradeExecutor::calculate_position(
            100.0,
            &features_with_atr(2.0),
            &review(PositionSizing::Conservative),
            100_000.0,
            5.0,
        );
        let normal = TradeExecutor::calculate_position(
            100.0,
            &features_with_atr(2.0),
            &review(PositionSizing::Normal),
            100_000.0,
            5.0,
        );
        let aggressive = TradeExecutor::calculate_position(
            100.0,
            &features_with_atr(2.0),
            &review(PositionSizing::Aggressive),
            100_000.0,
            5.0,
        );
        assert_eq!(conservative.allocation_pct, 2.5);
        assert_eq!(normal.allocation_pct, 5.0);
        assert_eq!(aggressive.allocation_pct, 6.25);
        assert_eq!(conservative.shares, 25);
        assert_eq!(normal.shares, 50);
        assert_eq!(aggressive.shares, 62);
    }

    #[test]
    fn test_atr_fallback_uses_two_percent_of_price() {
        let position = TradeExecutor::calculate_position(
            100.0,
            &features_with_atr(0.0),
            &review(PositionSizing::Normal),
            100_000.0,
            5.0,
        );
        // Fallback ATR = 2.0, so the stop sits 4.0 below the entry.
        assert_eq!(position.stop_price, 96.0);
        assert_eq!(position.target_price, 106.0);
    }

    #[test]
    fn test_allocation_never_exceeds_hard_cap() {
        let position = TradeExecutor::calculate_position(
            100.0,
            &features_with_atr(2.0),
            &review(PositionSizing::Aggressive),
            100_000.0,
            10.0,
        );
        assert_eq!(position.allocation_pct, 10.0);
    }

    #[test]
    fn test_minimum_one_share() {
        let position = TradeExecutor::calculate_position(
            5_000.0,
            &features_with_atr(50.0),
            &review(PositionSizing::Conservative),
            10_000.0,
            1.0,
        );
        assert_eq!(position.shares, 1);
    }

    #[test]
    fn test_buy_invariant_stop_below_entry_below_target() {
        let position = TradeExecutor::calculate_position(
            185.0,
            &features_with_atr(2.85),
            &review(PositionSizing::Normal),
            100_000.0,
            5.0,
        );
        assert!(position.stop_price < 185.0);
        assert!(185.0 < position.target_price);
    }
}
