use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Per-symbol trading constraints within a bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    pub lower_price_limit: Option<f64>,
    pub upper_price_limit: Option<f64>,
}

/// One user's active bot configuration.
///
/// Held only in memory: a process restart requires re-activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Quote-currency amount to spend per buy
    pub trade_amount: f64,
    /// Candle intervals evaluated per symbol, e.g. ["15m", "1h", "4h"]
    pub intervals: Vec<String>,
    pub symbols: Vec<SymbolConfig>,
    /// Candles requested per (symbol, interval) fetch
    pub candle_limit: u32,
    pub cooldown_minutes: i64,
    /// Cap on summed quote value of open bot-placed positions
    pub max_investment: f64,
    pub activated_at: DateTime<Utc>,
}

impl BotConfig {
    pub fn symbol_config(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// In-memory registry of active bots, shared between the request layer
/// and the scheduler. Cloneable handle, all clones see the same state.
#[derive(Clone, Default)]
pub struct BotRegistry {
    bots: Arc<RwLock<HashMap<Uuid, BotConfig>>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a bot for the user. Returns false if one is already active.
    pub fn activate(&self, user_id: Uuid, config: BotConfig) -> bool {
        let mut bots = self.bots.write().unwrap();
        if bots.contains_key(&user_id) {
            return false;
        }
        tracing::info!(
            "Activated bot for user {} ({} symbols, {} intervals)",
            user_id,
            config.symbols.len(),
            config.intervals.len()
        );
        bots.insert(user_id, config);
        true
    }

    /// Deactivate the user's bot. Returns false if none was active.
    pub fn deactivate(&self, user_id: Uuid) -> bool {
        let removed = self.bots.write().unwrap().remove(&user_id).is_some();
        if removed {
            tracing::info!("Deactivated bot for user {}", user_id);
        }
        removed
    }

    pub fn state(&self, user_id: Uuid) -> Option<BotConfig> {
        self.bots.read().unwrap().get(&user_id).cloned()
    }

    /// Snapshot of every active (user, config) pair for one tick
    pub fn snapshot(&self) -> Vec<(Uuid, BotConfig)> {
        self.bots
            .read()
            .unwrap()
            .iter()
            .map(|(id, cfg)| (*id, cfg.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.read().unwrap().is_empty()
    }
}
