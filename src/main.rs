use clap::Parser;
use std::sync::Arc;
use tradepulse::application::analyst::Analyst;
use tradepulse::application::coordinator::Coordinator;
use tradepulse::application::executor::TradeExecutor;
use tradepulse::application::orchestrator::{TradingLoop, TradingLoopConfig};
use tradepulse::application::portfolio_tracker::PortfolioTracker;
use tradepulse::application::risk_manager::RiskManager;
use tradepulse::application::signal_engine::SignalEngine;
use tradepulse::config::Config;
use tradepulse::domain::portfolio::{RealizedVolProxy, StaticVix, VolatilityIndex};
use tradepulse::infrastructure::alpaca::AlpacaClient;
use tradepulse::infrastructure::anthropic::AnthropicClient;
use tradepulse::infrastructure::persistence::database::Database;
use tradepulse::infrastructure::stooq::StooqClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tradepulse", about = "Autonomous equities trading loop")]
struct Cli {
    /// Run a single cycle immediately and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("Starting tradepulse ({} mode)", config.mode.as_str());
    info!("Watchlist: {} symbols", config.watchlist.len());

    let db = Database::new(&config.database_url).await?;

    let broker = Arc::new(AlpacaClient::new(
        config.alpaca_api_key.clone(),
        config.alpaca_secret_key.clone(),
        config.alpaca_base_url.clone(),
        config.alpaca_data_url.clone(),
    )?);
    let chat = Arc::new(AnthropicClient::new(
        config.anthropic_api_key.clone(),
        config.analyst_model.clone(),
    )?);
    let coordinator = Arc::new(Coordinator::new(config.analyst_max_reviews_per_day));

    let vix: Box<dyn VolatilityIndex> = match config.vix_override {
        Some(level) => Box::new(StaticVix(level)),
        None => Box::new(RealizedVolProxy),
    };

    let mut trading_loop = TradingLoop::new(
        db,
        broker.clone(),
        Some(StooqClient::new()?),
        SignalEngine::new(&config.model_path),
        Analyst::new(chat, coordinator.clone()),
        RiskManager::new(config.risk_limits()),
        TradeExecutor::new(broker.clone()),
        PortfolioTracker::new(broker),
        coordinator,
        vix,
        TradingLoopConfig {
            watchlist: config.watchlist.clone(),
            timeframe: "1Day".to_string(),
            cycle_interval_minutes: config.cycle_interval_minutes,
            trading_start_hour: config.trading_start_hour,
            trading_end_hour: config.trading_end_hour,
        },
    );
    trading_loop.restore().await?;

    if cli.once {
        let results = trading_loop.run_cycle().await;
        info!("Cycle results: {}", serde_json::to_string(&results)?);
        return Ok(());
    }

    trading_loop.run().await
}
