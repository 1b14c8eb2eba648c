//! Hand-written repositories over the SQLite schema. Every method takes
//! the caller's connection so cycle writes stay inside the cycle's
//! transaction; the orchestrator decides when to commit or roll back.

use crate::application::indicators::IndicatorSet;
use crate::domain::audit::{AuditEntry, Severity};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::risk::{CircuitBreakerLevel, RiskEvent};
use crate::domain::types::{
    Bar, OrderSide, SignalRecord, SignalStatus, TradeAction, TradeRecord, TradeStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

fn parse_chain_id(raw: Option<String>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(&s).ok())
}

// ===== Bars =====

pub struct BarRepository;

impl BarRepository {
    pub async fn upsert(conn: &mut SqliteConnection, bar: &Bar) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bars (symbol, timeframe, timestamp, open, high, low, close, volume, vwap, trade_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT(symbol, timeframe, timestamp) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                vwap = excluded.vwap,
                trade_count = excluded.trade_count
            "#,
        )
        .bind(&bar.symbol)
        .bind(&bar.timeframe)
        .bind(bar.timestamp)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .bind(bar.vwap)
        .bind(bar.trade_count)
        .execute(conn)
        .await
        .context("Failed to upsert bar")?;
        Ok(())
    }

    /// The most recent `limit` bars, returned oldest first.
    pub async fn latest(
        conn: &mut SqliteConnection,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, timeframe, timestamp, open, high, low, close, volume, vwap, trade_count
            FROM bars
            WHERE symbol = $1 AND timeframe = $2
            ORDER BY timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe)
        .bind(limit as i64)
        .fetch_all(conn)
        .await
        .context("Failed to load bars")?;

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| Bar {
                symbol: row.get("symbol"),
                timeframe: row.get("timeframe"),
                timestamp: row.get("timestamp"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
                vwap: row.get("vwap"),
                trade_count: row.get("trade_count"),
            })
            .collect();
        bars.reverse();
        Ok(bars)
    }

    pub async fn count(
        conn: &mut SqliteConnection,
        symbol: &str,
        timeframe: &str,
    ) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM bars WHERE symbol = $1 AND timeframe = $2")
            .bind(symbol)
            .bind(timeframe)
            .fetch_one(conn)
            .await?;
        Ok(row.get("n"))
    }
}

// ===== Indicators =====

pub struct IndicatorRepository;

impl IndicatorRepository {
    pub async fn upsert(
        conn: &mut SqliteConnection,
        symbol: &str,
        timeframe: &str,
        timestamp: DateTime<Utc>,
        values: &IndicatorSet,
    ) -> Result<()> {
        let values_json = serde_json::to_string(values)?;
        sqlx::query(
            r#"
            INSERT INTO indicators (symbol, timeframe, timestamp, values_json)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(symbol, timeframe, timestamp) DO UPDATE SET
                values_json = excluded.values_json
            "#,
        )
        .bind(symbol)
        .bind(timeframe)
        .bind(timestamp)
        .bind(values_json)
        .execute(conn)
        .await
        .context("Failed to upsert indicator snapshot")?;
        Ok(())
    }

    pub async fn latest(
        conn: &mut SqliteConnection,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Option<IndicatorSet>> {
        let row = sqlx::query(
            r#"
            SELECT values_json FROM indicators
            WHERE symbol = $1 AND timeframe = $2
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(timeframe)
        .fetch_optional(conn)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("values_json");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

// ===== Signals =====

pub struct SignalRepository;

impl SignalRepository {
    pub async fn insert(conn: &mut SqliteConnection, signal: &SignalRecord) -> Result<i64> {
        let flags = signal
            .analyst_risk_flags
            .as_ref()
            .map(|f| serde_json::to_string(f))
            .transpose()?;
        let result = sqlx::query(
            r#"
            INSERT INTO signals (
                decision_chain_id, symbol, action, confidence, model_version,
                features_json, status, analyst_approved, analyst_adjusted_confidence,
                analyst_reasoning, analyst_risk_flags, analyst_position_sizing,
                risk_approved, risk_rejection_reason, created_at, reviewed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(signal.decision_chain_id.to_string())
        .bind(&signal.symbol)
        .bind(signal.action.to_string())
        .bind(signal.confidence)
        .bind(&signal.model_version)
        .bind(signal.features_snapshot.to_string())
        .bind(signal.status.as_str())
        .bind(signal.analyst_approved)
        .bind(signal.analyst_adjusted_confidence)
        .bind(&signal.analyst_reasoning)
        .bind(flags)
        .bind(&signal.analyst_position_sizing)
        .bind(signal.risk_approved)
        .bind(&signal.risk_rejection_reason)
        .bind(signal.created_at)
        .bind(signal.reviewed_at)
        .execute(conn)
        .await
        .context("Failed to insert signal")?;
        Ok(result.last_insert_rowid())
    }

    /// Writes back the analyst and risk verdict fields plus the status.
    pub async fn update_review(conn: &mut SqliteConnection, signal: &SignalRecord) -> Result<()> {
        let flags = signal
            .analyst_risk_flags
            .as_ref()
            .map(|f| serde_json::to_string(f))
            .transpose()?;
        sqlx::query(
            r#"
            UPDATE signals SET
                status = $1,
                analyst_approved = $2,
                analyst_adjusted_confidence = $3,
                analyst_reasoning = $4,
                analyst_risk_flags = $5,
                analyst_position_sizing = $6,
                risk_approved = $7,
                risk_rejection_reason = $8,
                reviewed_at = $9
            WHERE id = $10
            "#,
        )
        .bind(signal.status.as_str())
        .bind(signal.analyst_approved)
        .bind(signal.analyst_adjusted_confidence)
        .bind(&signal.analyst_reasoning)
        .bind(flags)
        .bind(&signal.analyst_position_sizing)
        .bind(signal.risk_approved)
        .bind(&signal.risk_rejection_reason)
        .bind(signal.reviewed_at)
        .bind(signal.id)
        .execute(conn)
        .await
        .context("Failed to update signal")?;
        Ok(())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<SignalRecord>> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.map(Self::from_row).transpose()
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<SignalRecord> {
        let action: String = row.get("action");
        let status: String = row.get("status");
        let chain: String = row.get("decision_chain_id");
        let features_raw: String = row.get("features_json");
        let flags_raw: Option<String> = row.get("analyst_risk_flags");
        Ok(SignalRecord {
            id: row.get("id"),
            decision_chain_id: Uuid::parse_str(&chain).context("bad chain id")?,
            symbol: row.get("symbol"),
            action: match action.as_str() {
                "BUY" => TradeAction::Buy,
                "SELL" => TradeAction::Sell,
                _ => TradeAction::Hold,
            },
            confidence: row.get("confidence"),
            model_version: row.get("model_version"),
            features_snapshot: serde_json::from_str(&features_raw)
                .unwrap_or(serde_json::Value::Null),
            status: match status.as_str() {
                "approved" => SignalStatus::Approved,
                "rejected" => SignalStatus::Rejected,
                "executed" => SignalStatus::Executed,
                _ => SignalStatus::Pending,
            },
            analyst_approved: row.get("analyst_approved"),
            analyst_adjusted_confidence: row.get("analyst_adjusted_confidence"),
            analyst_reasoning: row.get("analyst_reasoning"),
            analyst_risk_flags: flags_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            analyst_position_sizing: row.get("analyst_position_sizing"),
            risk_approved: row.get("risk_approved"),
            risk_rejection_reason: row.get("risk_rejection_reason"),
            created_at: row.get("created_at"),
            reviewed_at: row.get("reviewed_at"),
        })
    }
}

// ===== Trades =====

pub struct TradeRepository;

impl TradeRepository {
    pub async fn insert(conn: &mut SqliteConnection, trade: &TradeRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                decision_chain_id, signal_id, broker_order_id, symbol, side, shares,
                entry_price, stop_price, target_price, fill_price, exit_price,
                realized_pnl, ml_confidence, analyst_confidence, analyst_reasoning,
                allocation_pct, dollar_amount, status, exit_reason, placed_at,
                filled_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(trade.decision_chain_id.to_string())
        .bind(trade.signal_id)
        .bind(&trade.broker_order_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.shares)
        .bind(trade.entry_price)
        .bind(trade.stop_price)
        .bind(trade.target_price)
        .bind(trade.fill_price)
        .bind(trade.exit_price)
        .bind(trade.realized_pnl)
        .bind(trade.ml_confidence)
        .bind(trade.analyst_confidence)
        .bind(&trade.analyst_reasoning)
        .bind(trade.allocation_pct)
        .bind(trade.dollar_amount)
        .bind(trade.status.as_str())
        .bind(&trade.exit_reason)
        .bind(trade.placed_at)
        .bind(trade.filled_at)
        .bind(trade.closed_at)
        .execute(conn)
        .await
        .context("Failed to insert trade")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn count_placed_since(
        conn: &mut SqliteConnection,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trades WHERE placed_at >= $1")
            .bind(since)
            .fetch_one(conn)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn find_by_chain(
        conn: &mut SqliteConnection,
        chain_id: Uuid,
    ) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query("SELECT * FROM trades WHERE decision_chain_id = $1")
            .bind(chain_id.to_string())
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<TradeRecord> {
        let side: String = row.get("side");
        let status: String = row.get("status");
        let chain: String = row.get("decision_chain_id");
        Ok(TradeRecord {
            id: row.get("id"),
            decision_chain_id: Uuid::parse_str(&chain).context("bad chain id")?,
            signal_id: row.get("signal_id"),
            broker_order_id: row.get("broker_order_id"),
            symbol: row.get("symbol"),
            side: if side == "sell" {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            shares: row.get("shares"),
            entry_price: row.get("entry_price"),
            stop_price: row.get("stop_price"),
            target_price: row.get("target_price"),
            fill_price: row.get("fill_price"),
            exit_price: row.get("exit_price"),
            realized_pnl: row.get("realized_pnl"),
            ml_confidence: row.get("ml_confidence"),
            analyst_confidence: row.get("analyst_confidence"),
            analyst_reasoning: row.get("analyst_reasoning"),
            allocation_pct: row.get("allocation_pct"),
            dollar_amount: row.get("dollar_amount"),
            status: match status.as_str() {
                "filled" => TradeStatus::Filled,
                "partial" => TradeStatus::Partial,
                "closed" => TradeStatus::Closed,
                "cancelled" => TradeStatus::Cancelled,
                "expired" => TradeStatus::Expired,
                _ => TradeStatus::Pending,
            },
            exit_reason: row.get("exit_reason"),
            placed_at: row.get("placed_at"),
            filled_at: row.get("filled_at"),
            closed_at: row.get("closed_at"),
        })
    }
}

// ===== Portfolio snapshots =====

pub struct SnapshotRepository;

impl SnapshotRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        snapshot: &PortfolioSnapshot,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO portfolio_snapshots (
                timestamp, total_equity, cash, market_value,
                daily_pnl, daily_pnl_pct, weekly_pnl, weekly_pnl_pct,
                monthly_pnl, monthly_pnl_pct, peak_equity, current_drawdown_pct,
                total_exposure_pct, open_positions_count, positions_json,
                sector_exposure_json, trades_today
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.total_equity)
        .bind(snapshot.cash)
        .bind(snapshot.market_value)
        .bind(snapshot.daily_pnl)
        .bind(snapshot.daily_pnl_pct)
        .bind(snapshot.weekly_pnl)
        .bind(snapshot.weekly_pnl_pct)
        .bind(snapshot.monthly_pnl)
        .bind(snapshot.monthly_pnl_pct)
        .bind(snapshot.peak_equity)
        .bind(snapshot.current_drawdown_pct)
        .bind(snapshot.total_exposure_pct)
        .bind(snapshot.open_positions_count)
        .bind(serde_json::to_string(&snapshot.positions)?)
        .bind(serde_json::to_string(&snapshot.sector_exposure)?)
        .bind(snapshot.trades_today)
        .execute(conn)
        .await
        .context("Failed to insert portfolio snapshot")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn equity_at_or_before(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let row = sqlx::query(
            r#"
            SELECT total_equity FROM portfolio_snapshots
            WHERE timestamp <= $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(cutoff)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(|r| r.get("total_equity")))
    }

    pub async fn earliest_equity_after(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let row = sqlx::query(
            r#"
            SELECT total_equity FROM portfolio_snapshots
            WHERE timestamp > $1
            ORDER BY timestamp ASC
            LIMIT 1
            "#,
        )
        .bind(cutoff)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(|r| r.get("total_equity")))
    }

    pub async fn max_peak_equity(conn: &mut SqliteConnection) -> Result<Option<f64>> {
        let row = sqlx::query("SELECT MAX(peak_equity) AS peak FROM portfolio_snapshots")
            .fetch_one(conn)
            .await?;
        Ok(row.get("peak"))
    }

    pub async fn latest_peaks(
        conn: &mut SqliteConnection,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT peak_equity FROM portfolio_snapshots
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(conn)
        .await?;
        let mut peaks: Vec<f64> = rows.into_iter().map(|r| r.get("peak_equity")).collect();
        peaks.reverse();
        Ok(peaks)
    }
}

// ===== Risk events =====

pub struct RiskEventRepository;

impl RiskEventRepository {
    pub async fn insert(conn: &mut SqliteConnection, event: &RiskEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO risk_events (
                timestamp, level, trigger_reason, trigger_value, threshold_value,
                action_taken, resolved, resolved_by, details_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.timestamp)
        .bind(event.level.as_str())
        .bind(&event.trigger_reason)
        .bind(event.trigger_value)
        .bind(event.threshold_value)
        .bind(&event.action_taken)
        .bind(event.resolved)
        .bind(&event.resolved_by)
        .bind(event.details.to_string())
        .execute(conn)
        .await
        .context("Failed to insert risk event")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn latest_unresolved(
        conn: &mut SqliteConnection,
    ) -> Result<Option<RiskEvent>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM risk_events
            WHERE resolved = 0
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(conn)
        .await?;
        row.map(Self::from_row).transpose()
    }

    pub async fn all(conn: &mut SqliteConnection) -> Result<Vec<RiskEvent>> {
        let rows = sqlx::query("SELECT * FROM risk_events ORDER BY timestamp ASC")
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<RiskEvent> {
        let level: String = row.get("level");
        let details_raw: String = row.get("details_json");
        Ok(RiskEvent {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            level: CircuitBreakerLevel::from_str(&level)
                .unwrap_or(CircuitBreakerLevel::None),
            trigger_reason: row.get("trigger_reason"),
            trigger_value: row.get("trigger_value"),
            threshold_value: row.get("threshold_value"),
            action_taken: row.get("action_taken"),
            resolved: row.get("resolved"),
            resolved_by: row.get("resolved_by"),
            details: serde_json::from_str(&details_raw).unwrap_or(serde_json::Value::Null),
        })
    }
}

// ===== Audit log =====

pub struct AuditRepository;

impl AuditRepository {
    pub async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (
                timestamp, event_type, severity, component, symbol,
                details_json, decision_chain_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.timestamp)
        .bind(&entry.event_type)
        .bind(entry.severity.as_str())
        .bind(&entry.component)
        .bind(&entry.symbol)
        .bind(entry.details.to_string())
        .bind(entry.decision_chain_id.map(|id| id.to_string()))
        .execute(conn)
        .await
        .context("Failed to append audit entry")?;
        Ok(result.last_insert_rowid())
    }

    /// Full provenance of one capital decision, oldest first.
    pub async fn by_chain(
        conn: &mut SqliteConnection,
        chain_id: Uuid,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM audit_log
            WHERE decision_chain_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(chain_id.to_string())
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    pub async fn by_event_type(
        conn: &mut SqliteConnection,
        event_type: &str,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM audit_log
            WHERE event_type = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(event_type)
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(Self::from_row).collect()
    }

    fn from_row(row: sqlx::sqlite::SqliteRow) -> Result<AuditEntry> {
        let severity: String = row.get("severity");
        let details_raw: String = row.get("details_json");
        Ok(AuditEntry {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            event_type: row.get("event_type"),
            severity: match severity.as_str() {
                "CRITICAL" => Severity::Critical,
                "WARNING" => Severity::Warning,
                _ => Severity::Info,
            },
            component: row.get("component"),
            symbol: row.get("symbol"),
            details: serde_json::from_str(&details_raw).unwrap_or(serde_json::Value::Null),
            decision_chain_id: parse_chain_id(row.get("decision_chain_id")),
        })
    }
}
