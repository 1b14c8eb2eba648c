//! Snapshots the broker account and open positions, then reconstructs the
//! slower-moving figures (weekly and monthly pnl, peak equity, drawdown)
//! from previously stored snapshots.

use crate::application::sectors::sector_for;
use crate::domain::portfolio::{PortfolioSnapshot, Position};
use crate::domain::ports::Brokerage;
use crate::infrastructure::persistence::repositories::{SnapshotRepository, TradeRepository};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct PortfolioTracker {
    broker: Arc<dyn Brokerage>,
}

impl PortfolioTracker {
    pub fn new(broker: Arc<dyn Brokerage>) -> Self {
        Self { broker }
    }

    /// Takes a full snapshot, persists it, and returns the in-memory
    /// record that the rest of the cycle works from.
    pub async fn snapshot(
        &self,
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
    ) -> Result<PortfolioSnapshot> {
        let account = self
            .broker
            .get_account()
            .await
            .context("account fetch failed")?;
        let broker_positions = self
            .broker
            .get_positions()
            .await
            .context("positions fetch failed")?;

        let equity = account.equity;
        let market_value = account.long_market_value + account.short_market_value.abs();

        let daily_pnl = equity - account.last_equity;
        let daily_pnl_pct = if account.last_equity > 0.0 {
            daily_pnl / account.last_equity * 100.0
        } else {
            0.0
        };

        let (weekly_pnl, weekly_pnl_pct) =
            Self::pnl_against_baseline(conn, now - Duration::days(7), equity).await?;
        let (monthly_pnl, monthly_pnl_pct) =
            Self::pnl_against_baseline(conn, now - Duration::days(30), equity).await?;

        let stored_peak = SnapshotRepository::max_peak_equity(conn).await?.unwrap_or(0.0);
        let peak_equity = stored_peak.max(equity);
        let current_drawdown_pct = PortfolioSnapshot::drawdown_pct(peak_equity, equity);

        let mut positions: HashMap<String, Position> = HashMap::new();
        let mut sector_exposure: HashMap<String, f64> = HashMap::new();
        for pos in broker_positions {
            if equity > 0.0 {
                let sector = sector_for(&pos.symbol).to_string();
                *sector_exposure.entry(sector).or_insert(0.0) +=
                    pos.market_value.abs() / equity * 100.0;
            }
            positions.insert(pos.symbol.clone(), pos);
        }

        let total_exposure_pct = if equity > 0.0 {
            market_value / equity * 100.0
        } else {
            0.0
        };

        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let trades_today = TradeRepository::count_placed_since(conn, midnight).await?;

        let snapshot = PortfolioSnapshot {
            timestamp: now,
            total_equity: equity,
            cash: account.cash,
            market_value,
            daily_pnl,
            daily_pnl_pct,
            weekly_pnl,
            weekly_pnl_pct,
            monthly_pnl,
            monthly_pnl_pct,
            peak_equity,
            current_drawdown_pct,
            total_exposure_pct,
            open_positions_count: positions.len() as i64,
            positions,
            sector_exposure,
            trades_today,
        };

        SnapshotRepository::insert(conn, &snapshot).await?;

        info!(
            "Portfolio snapshot: ${:.2} equity, {} positions, {:.1}% exposure, ${:.2} daily P&L",
            equity, snapshot.open_positions_count, total_exposure_pct, daily_pnl,
        );

        Ok(snapshot)
    }

    /// P&L versus the stored equity closest to the cutoff. With no
    /// history at or before the cutoff, the oldest later snapshot stands
    /// in; with no history at all the figure is zero.
    async fn pnl_against_baseline(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
        equity: f64,
    ) -> Result<(f64, f64)> {
        let baseline = match SnapshotRepository::equity_at_or_before(conn, cutoff).await? {
            Some(e) => Some(e),
            None => SnapshotRepository::earliest_equity_after(conn, cutoff).await?,
        };
        match baseline {
            Some(base) if base > 0.0 => {
                let pnl = equity - base;
                Ok((pnl, pnl / base * 100.0))
            }
            _ => Ok((0.0, 0.0)),
        }
    }
}
