use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ceilings that no configuration can exceed. Configured limits are
/// clamped against these at read time.
pub const HARD_MAX_POSITION_PCT: f64 = 10.0;
pub const HARD_MAX_DAILY_LOSS_PCT: f64 = 5.0;
pub const HARD_MAX_WEEKLY_LOSS_PCT: f64 = 10.0;
pub const HARD_MAX_MONTHLY_LOSS_PCT: f64 = 15.0;
pub const HARD_MAX_DRAWDOWN_PCT: f64 = 20.0;
pub const HARD_MAX_OPEN_POSITIONS: i64 = 15;
pub const HARD_MAX_TRADES_PER_DAY: i64 = 20;

/// Four-state risk posture gating trade admission.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CircuitBreakerLevel {
    None = 0,
    Yellow = 1,
    Orange = 2,
    Red = 3,
}

impl CircuitBreakerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitBreakerLevel::None => "NONE",
            CircuitBreakerLevel::Yellow => "YELLOW",
            CircuitBreakerLevel::Orange => "ORANGE",
            CircuitBreakerLevel::Red => "RED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(CircuitBreakerLevel::None),
            "YELLOW" => Some(CircuitBreakerLevel::Yellow),
            "ORANGE" => Some(CircuitBreakerLevel::Orange),
            "RED" => Some(CircuitBreakerLevel::Red),
            _ => None,
        }
    }

    /// Position size multiplier applied while in this level.
    pub fn size_multiplier(&self) -> f64 {
        match self {
            CircuitBreakerLevel::Yellow => 0.5,
            _ => 1.0,
        }
    }

    pub fn action_taken(&self) -> &'static str {
        match self {
            CircuitBreakerLevel::None => "normal_trading",
            CircuitBreakerLevel::Yellow => "reduce_position_sizes_50pct",
            CircuitBreakerLevel::Orange => "halt_new_trades_allow_exits",
            CircuitBreakerLevel::Red => "close_all_positions_halt_system",
        }
    }
}

impl fmt::Display for CircuitBreakerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the pre-trade gate.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub reason: String,
    pub adjusted_size_pct: Option<f64>,
    pub warnings: Vec<String>,
}

impl RiskCheckResult {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            adjusted_size_pct: None,
            warnings: Vec::new(),
        }
    }

    pub fn approve(adjusted_size_pct: f64, warnings: Vec<String>) -> Self {
        Self {
            approved: true,
            reason: String::new(),
            adjusted_size_pct: Some(adjusted_size_pct),
            warnings,
        }
    }
}

/// Persisted record of a circuit-breaker transition or manual stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: CircuitBreakerLevel,
    pub trigger_reason: String,
    pub trigger_value: f64,
    pub threshold_value: f64,
    pub action_taken: String,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(CircuitBreakerLevel::Red > CircuitBreakerLevel::Orange);
        assert!(CircuitBreakerLevel::Orange > CircuitBreakerLevel::Yellow);
        assert!(CircuitBreakerLevel::Yellow > CircuitBreakerLevel::None);
    }

    #[test]
    fn test_only_yellow_halves_size() {
        assert_eq!(CircuitBreakerLevel::Yellow.size_multiplier(), 0.5);
        assert_eq!(CircuitBreakerLevel::None.size_multiplier(), 1.0);
        assert_eq!(CircuitBreakerLevel::Orange.size_multiplier(), 1.0);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [
            CircuitBreakerLevel::None,
            CircuitBreakerLevel::Yellow,
            CircuitBreakerLevel::Orange,
            CircuitBreakerLevel::Red,
        ] {
            assert_eq!(CircuitBreakerLevel::from_str(level.as_str()), Some(level));
        }
        assert_eq!(CircuitBreakerLevel::from_str("PURPLE"), None);
    }
}
