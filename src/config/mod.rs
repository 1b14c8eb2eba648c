//! Environment-driven configuration. Everything is read once at startup;
//! a missing secret or invalid mode refuses to boot.

use crate::application::risk_manager::RiskLimits;
use crate::domain::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Execution mode: paper routes to the sandbox broker, live to production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Paper,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Paper => "paper",
            Mode::Live => "live",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Mode::Paper => "https://paper-api.alpaca.markets",
            Mode::Live => "https://api.alpaca.markets",
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(Mode::Paper),
            "live" => Ok(Mode::Live),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Core
    pub mode: Mode,
    pub log_level: String,

    // Broker
    pub alpaca_api_key: String,
    pub alpaca_secret_key: String,
    pub alpaca_base_url: String,
    pub alpaca_data_url: String,

    // Analyst
    pub anthropic_api_key: String,
    pub analyst_model: String,
    pub analyst_max_reviews_per_day: u32,

    // Persistence
    pub database_url: String,

    // Operator surface
    pub auth_token_secret: String,

    // Trading
    pub watchlist: Vec<String>,
    pub trading_start_hour: u32,
    pub trading_end_hour: u32,
    pub cycle_interval_minutes: u64,
    pub model_path: PathBuf,
    pub vix_override: Option<f64>,

    // Risk limits (clamped against hard caps at read time)
    pub max_position_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_monthly_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_open_positions: i64,
    pub max_trades_per_day: i64,
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_watchlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

const DEFAULT_WATCHLIST: &str = "AAPL,MSFT,GOOGL,AMZN,NVDA,META,TSLA,JPM,V,UNH,SPY,QQQ";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = Mode::from_str(&env::var("MODE").unwrap_or_else(|_| "paper".to_string()))?;

        let alpaca_base_url =
            env::var("ALPACA_BASE_URL").unwrap_or_else(|_| mode.default_base_url().to_string());
        let alpaca_data_url = env::var("ALPACA_DATA_URL")
            .unwrap_or_else(|_| "https://data.alpaca.markets".to_string());

        let watchlist = parse_watchlist(
            &env::var("WATCHLIST").unwrap_or_else(|_| DEFAULT_WATCHLIST.to_string()),
        );

        let vix_override = match env::var("VIX_OVERRIDE") {
            Ok(raw) => Some(raw.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                var: "VIX_OVERRIDE",
                value: raw,
            })?),
            Err(_) => None,
        };

        Ok(Self {
            mode,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            alpaca_api_key: required("ALPACA_API_KEY")?,
            alpaca_secret_key: required("ALPACA_SECRET_KEY")?,
            alpaca_base_url,
            alpaca_data_url,

            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            analyst_model: env::var("ANALYST_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            analyst_max_reviews_per_day: parse_or("ANALYST_MAX_REVIEWS_PER_DAY", 50)?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/tradepulse.db".to_string()),

            auth_token_secret: required("AUTH_TOKEN_SECRET")?,

            watchlist,
            trading_start_hour: parse_or("TRADING_START_HOUR", 9)?,
            trading_end_hour: parse_or("TRADING_END_HOUR", 16)?,
            cycle_interval_minutes: parse_or("CYCLE_INTERVAL_MINUTES", 5)?,
            model_path: PathBuf::from(
                env::var("MODEL_PATH").unwrap_or_else(|_| "ml_models/latest.json".to_string()),
            ),
            vix_override,

            max_position_pct: parse_or("MAX_POSITION_PCT", 5.0)?,
            max_daily_loss_pct: parse_or("MAX_DAILY_LOSS_PCT", 3.0)?,
            max_weekly_loss_pct: parse_or("MAX_WEEKLY_LOSS_PCT", 5.0)?,
            max_monthly_loss_pct: parse_or("MAX_MONTHLY_LOSS_PCT", 8.0)?,
            max_drawdown_pct: parse_or("MAX_DRAWDOWN_PCT", 12.0)?,
            max_open_positions: parse_or("MAX_OPEN_POSITIONS", 8)?,
            max_trades_per_day: parse_or("MAX_TRADES_PER_DAY", 10)?,
        })
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_pct: self.max_position_pct,
            max_daily_loss_pct: self.max_daily_loss_pct,
            max_weekly_loss_pct: self.max_weekly_loss_pct,
            max_monthly_loss_pct: self.max_monthly_loss_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            max_open_positions: self.max_open_positions,
            max_trades_per_day: self.max_trades_per_day,
        }
    }
}
