use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tradebot::api::{BinanceClient, BinanceClientFactory};
use tradebot::bot::{BotConfig, BotRegistry, SymbolConfig};
use tradebot::credentials::{CredentialStore, EnvCredentialStore};
use tradebot::db::{InMemoryStore, PostgresStore, TradeStore};
use tradebot::notify::{LogNotifier, NotificationSink, TelegramNotifier};
use tradebot::risk::RiskManager;
use tradebot::scheduler::{Scheduler, SchedulerConfig};
use tradebot::strategy::WeightedEvaluator;
use uuid::Uuid;

/// Default user ID for single-operator mode
const DEFAULT_USER_ID: Uuid = Uuid::from_u128(1);

#[derive(Parser)]
#[command(name = "tradebot", about = "Periodic multi-timeframe trading engine")]
struct Cli {
    /// Seconds between scheduler ticks
    #[arg(long, default_value_t = 300)]
    tick_interval: u64,

    /// Postgres URL; falls back to DATABASE_URL, then to in-memory mode
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    tracing::info!("🚀 tradebot starting");

    let store = connect_store(cli.database_url).await;
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(EnvCredentialStore::from_env().context("BINANCE_API_KEY is required")?);

    let registry = BotRegistry::new();
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: std::time::Duration::from_secs(cli.tick_interval),
            ..SchedulerConfig::default()
        },
        registry.clone(),
        credentials,
        Arc::new(BinanceClient::new(None)),
        Arc::new(BinanceClientFactory::new()),
        Arc::new(RiskManager::new()),
        Arc::new(WeightedEvaluator::default()),
        store,
        build_notifier(),
    ));

    // Single-operator mode: activate a bot straight from the environment.
    // Without TRADE_SYMBOLS the engine idles until a bot is activated.
    match bot_config_from_env() {
        Some(config) => {
            registry.activate(DEFAULT_USER_ID, config);
        }
        None => {
            tracing::info!("TRADE_SYMBOLS not set, waiting for bot activation");
        }
    }

    let scheduler_task = tokio::spawn(scheduler.run());

    tracing::info!("Press Ctrl+C to stop...");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = scheduler_task => {
            tracing::error!("Scheduler exited unexpectedly: {:?}", result);
        }
    }

    tracing::info!("👋 tradebot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tradebot=info")),
        )
        .init();
}

async fn connect_store(cli_url: Option<String>) -> Arc<dyn TradeStore> {
    let url = cli_url.or_else(|| std::env::var("DATABASE_URL").ok());

    let Some(url) = url else {
        tracing::warn!("No DATABASE_URL, running with in-memory persistence");
        return Arc::new(InMemoryStore::new());
    };

    match PostgresStore::new(&url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing with in-memory persistence",
                e
            );
            Arc::new(InMemoryStore::new())
        }
    }
}

fn build_notifier() -> Arc<dyn NotificationSink> {
    let token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
    let chat_id = std::env::var("TELEGRAM_CHAT_ID")
        .ok()
        .and_then(|v| v.parse::<i64>().ok());

    match (token, chat_id) {
        (Some(token), Some(chat_id)) => {
            let mut chats = HashMap::new();
            chats.insert(DEFAULT_USER_ID, chat_id);
            tracing::info!("Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(token, chats))
        }
        _ => {
            tracing::info!("Telegram not configured, logging notifications instead");
            Arc::new(LogNotifier)
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bot_config_from_env() -> Option<BotConfig> {
    let symbols_raw = std::env::var("TRADE_SYMBOLS").ok()?;
    let symbols: Vec<SymbolConfig> = symbols_raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|symbol| SymbolConfig {
            symbol: symbol.to_string(),
            lower_price_limit: None,
            upper_price_limit: None,
        })
        .collect();
    if symbols.is_empty() {
        return None;
    }

    let intervals: Vec<String> = std::env::var("TRADE_INTERVALS")
        .unwrap_or_else(|_| "15m,1h,4h".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Some(BotConfig {
        trade_amount: env_f64("TRADE_AMOUNT", 50.0),
        intervals,
        symbols,
        candle_limit: env_f64("CANDLE_LIMIT", 100.0) as u32,
        cooldown_minutes: env_f64("COOLDOWN_MINUTES", 30.0) as i64,
        max_investment: env_f64("MAX_INVESTMENT", 500.0),
        activated_at: Utc::now(),
    })
}
