use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Pool wrapper; owns schema creation.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Single-connection in-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                vwap REAL,
                trade_count INTEGER
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_bars_symbol_timeframe_ts
            ON bars (symbol, timeframe, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create bars table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indicators (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                values_json TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_indicators_symbol_timeframe_ts
            ON indicators (symbol, timeframe, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create indicators table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                decision_chain_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                model_version TEXT NOT NULL,
                features_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                analyst_approved INTEGER,
                analyst_adjusted_confidence REAL,
                analyst_reasoning TEXT,
                analyst_risk_flags TEXT,
                analyst_position_sizing TEXT,
                risk_approved INTEGER,
                risk_rejection_reason TEXT,
                created_at TEXT NOT NULL,
                reviewed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_signals_symbol_created
            ON signals (symbol, created_at);
            CREATE INDEX IF NOT EXISTS idx_signals_status ON signals (status);
            CREATE INDEX IF NOT EXISTS idx_signals_chain ON signals (decision_chain_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signals table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                decision_chain_id TEXT NOT NULL,
                signal_id INTEGER NOT NULL,
                broker_order_id TEXT NOT NULL UNIQUE,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                shares INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                stop_price REAL NOT NULL,
                target_price REAL NOT NULL,
                fill_price REAL,
                exit_price REAL,
                realized_pnl REAL,
                ml_confidence REAL NOT NULL,
                analyst_confidence REAL,
                analyst_reasoning TEXT,
                allocation_pct REAL NOT NULL,
                dollar_amount REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                exit_reason TEXT,
                placed_at TEXT NOT NULL,
                filled_at TEXT,
                closed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_symbol_placed
            ON trades (symbol, placed_at);
            CREATE INDEX IF NOT EXISTS idx_trades_status ON trades (status);
            CREATE INDEX IF NOT EXISTS idx_trades_chain ON trades (decision_chain_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                total_equity REAL NOT NULL,
                cash REAL NOT NULL,
                market_value REAL NOT NULL,
                daily_pnl REAL NOT NULL DEFAULT 0,
                daily_pnl_pct REAL NOT NULL DEFAULT 0,
                weekly_pnl REAL NOT NULL DEFAULT 0,
                weekly_pnl_pct REAL NOT NULL DEFAULT 0,
                monthly_pnl REAL NOT NULL DEFAULT 0,
                monthly_pnl_pct REAL NOT NULL DEFAULT 0,
                peak_equity REAL NOT NULL,
                current_drawdown_pct REAL NOT NULL DEFAULT 0,
                total_exposure_pct REAL NOT NULL DEFAULT 0,
                open_positions_count INTEGER NOT NULL DEFAULT 0,
                positions_json TEXT NOT NULL DEFAULT '{}',
                sector_exposure_json TEXT NOT NULL DEFAULT '{}',
                trades_today INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON portfolio_snapshots (timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create portfolio_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                trigger_reason TEXT NOT NULL,
                trigger_value REAL NOT NULL,
                threshold_value REAL NOT NULL,
                action_taken TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolved_by TEXT,
                details_json TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_risk_events_ts ON risk_events (timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create risk_events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'INFO',
                component TEXT NOT NULL,
                symbol TEXT,
                details_json TEXT NOT NULL DEFAULT '{}',
                decision_chain_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_ts_type ON audit_log (timestamp, event_type);
            CREATE INDEX IF NOT EXISTS idx_audit_severity ON audit_log (severity);
            CREATE INDEX IF NOT EXISTS idx_audit_chain ON audit_log (decision_chain_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create audit_log table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
