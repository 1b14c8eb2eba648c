use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One OHLCV bar. Unique per (symbol, timeframe, timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub vwap: Option<f64>,
    pub trade_count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Approved => "approved",
            SignalStatus::Rejected => "rejected",
            SignalStatus::Executed => "executed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Filled,
    Partial,
    Closed,
    Cancelled,
    Expired,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Filled => "filled",
            TradeStatus::Partial => "partial",
            TradeStatus::Closed => "closed",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Expired => "expired",
        }
    }
}

/// A scored trading signal. The decision_chain_id minted here threads
/// through every downstream audit event and any resulting trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: i64,
    pub decision_chain_id: Uuid,
    pub symbol: String,
    pub action: TradeAction,
    pub confidence: f64,
    pub model_version: String,
    pub features_snapshot: serde_json::Value,
    pub status: SignalStatus,
    pub analyst_approved: Option<bool>,
    pub analyst_adjusted_confidence: Option<f64>,
    pub analyst_reasoning: Option<String>,
    pub analyst_risk_flags: Option<Vec<String>>,
    pub analyst_position_sizing: Option<String>,
    pub risk_approved: Option<bool>,
    pub risk_rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl SignalRecord {
    pub fn new(
        symbol: &str,
        action: TradeAction,
        confidence: f64,
        model_version: &str,
        features_snapshot: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            decision_chain_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            confidence,
            model_version: model_version.to_string(),
            features_snapshot,
            status: SignalStatus::Pending,
            analyst_approved: None,
            analyst_adjusted_confidence: None,
            analyst_reasoning: None,
            analyst_risk_flags: None,
            analyst_position_sizing: None,
            risk_approved: None,
            risk_rejection_reason: None,
            created_at: now,
            reviewed_at: None,
        }
    }
}

/// Local projection of a bracket order placed at the broker. The broker is
/// the source of truth after placement; this row is updated by later
/// snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub decision_chain_id: Uuid,
    pub signal_id: i64,
    pub broker_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub shares: i64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub fill_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub ml_confidence: f64,
    pub analyst_confidence: Option<f64>,
    pub analyst_reasoning: Option<String>,
    pub allocation_pct: f64,
    pub dollar_amount: f64,
    pub status: TradeStatus,
    pub exit_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Sizing output for one approved signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSize {
    pub shares: i64,
    pub dollar_amount: f64,
    pub allocation_pct: f64,
    pub limit_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk_reward_ratio: f64,
}

/// Bracket order request handed to the broker port.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketOrder {
    pub symbol: String,
    pub qty: i64,
    pub side: OrderSide,
    pub limit_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedOrder {
    pub id: String,
    pub status: String,
}

/// A news article attached to the analyst's review context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub created_at: String,
    pub symbols: Vec<String>,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(TradeAction::Buy.to_string(), "BUY");
        assert_eq!(TradeAction::Sell.to_string(), "SELL");
        assert_eq!(TradeAction::Hold.to_string(), "HOLD");
    }

    #[test]
    fn test_new_signal_defaults() {
        let sig = SignalRecord::new(
            "AAPL",
            TradeAction::Buy,
            0.72,
            "heuristic-v1",
            serde_json::json!({}),
            Utc::now(),
        );
        assert_eq!(sig.status, SignalStatus::Pending);
        assert!(sig.analyst_approved.is_none());
        assert!(!sig.decision_chain_id.is_nil());
    }
}
