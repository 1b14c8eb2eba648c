use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broker account summary, already parsed out of the wire strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub equity: f64,
    pub last_equity: f64,
    pub cash: f64,
    pub long_market_value: f64,
    pub short_market_value: f64,
}

/// One open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: i64,
    pub side: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,
}

/// Point-in-time view of the whole portfolio, persisted once per cycle.
/// peak_equity is monotone non-decreasing across successive snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_equity: f64,
    pub cash: f64,
    pub market_value: f64,
    pub daily_pnl: f64,
    pub daily_pnl_pct: f64,
    pub weekly_pnl: f64,
    pub weekly_pnl_pct: f64,
    pub monthly_pnl: f64,
    pub monthly_pnl_pct: f64,
    pub peak_equity: f64,
    pub current_drawdown_pct: f64,
    pub total_exposure_pct: f64,
    pub open_positions_count: i64,
    pub positions: HashMap<String, Position>,
    pub sector_exposure: HashMap<String, f64>,
    pub trades_today: i64,
}

impl PortfolioSnapshot {
    /// Drawdown from a peak, floored at zero.
    pub fn drawdown_pct(peak_equity: f64, total_equity: f64) -> f64 {
        if peak_equity <= 0.0 {
            return 0.0;
        }
        ((peak_equity - total_equity) / peak_equity * 100.0).max(0.0)
    }
}

/// Per-cycle market backdrop shared by every symbol's scoring step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub spy_return_1d: f64,
    pub vix: f64,
    pub vix_change: f64,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            spy_return_1d: 0.0,
            vix: 20.0,
            vix_change: 0.0,
        }
    }
}

/// Source of the volatility-index reading used by the risk gate.
///
/// The default implementation derives a proxy from the broad index's
/// realized volatility; a configured live feed takes precedence.
pub trait VolatilityIndex: Send + Sync {
    /// Returns (level, change) from the index's daily close series
    /// (oldest first).
    fn read(&self, index_closes: &[f64]) -> (f64, f64);
}

/// Annualized realized volatility of the index's last 20 daily returns,
/// scaled by 100. The change term compares the realized volatility of the
/// most recent 5 returns against the prior 5.
pub struct RealizedVolProxy;

impl RealizedVolProxy {
    fn annualized_vol(returns: &[f64]) -> f64 {
        use statrs::statistics::Statistics;
        if returns.len() < 2 {
            return 20.0;
        }
        let sd = returns.std_dev();
        if sd.is_nan() {
            return 20.0;
        }
        sd * (252.0_f64).sqrt() * 100.0
    }
}

impl VolatilityIndex for RealizedVolProxy {
    fn read(&self, index_closes: &[f64]) -> (f64, f64) {
        if index_closes.len() < 21 {
            return (20.0, 0.0);
        }
        let returns: Vec<f64> = index_closes
            .windows(2)
            .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
            .collect();

        let last20 = &returns[returns.len() - 20..];
        let level = Self::annualized_vol(last20);

        let change = if returns.len() >= 10 {
            let recent = &returns[returns.len() - 5..];
            let prior = &returns[returns.len() - 10..returns.len() - 5];
            Self::annualized_vol(recent) - Self::annualized_vol(prior)
        } else {
            0.0
        };

        (level, change)
    }
}

/// Fixed reading from an external feed, configured by the operator.
pub struct StaticVix(pub f64);

impl VolatilityIndex for StaticVix {
    fn read(&self, _index_closes: &[f64]) -> (f64, f64) {
        (self.0, 0.0)
    }
}
