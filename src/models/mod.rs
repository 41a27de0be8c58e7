use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candlestick for one (symbol, interval) bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading action for a single evaluation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Output of the signal evaluator for one symbol x interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub action: TradeAction,
    pub confidence: f64,
}

impl Signal {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            confidence: 0.0,
        }
    }

    /// Actionable means non-Hold with confidence at or above 0.5
    pub fn is_actionable(&self) -> bool {
        self.action != TradeAction::Hold && self.confidence >= 0.5
    }
}

/// Fused decision for one user x symbol x tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedSignal {
    pub action: TradeAction,
    pub confidence: f64,
}

/// A bot-acquired holding awaiting exit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    /// Quote-currency value actually spent, fills plus quote commission
    pub quote_value: f64,
    pub commission: f64,
    pub opened_at: DateTime<Utc>,
    pub closed: bool,
    pub bot_placed: bool,
}

/// Immutable record of a closed position's exit leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub position_id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub exit_price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub closed_at: DateTime<Utc>,
}

/// Exchange-imposed constraints for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRules {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub min_qty: f64,
    pub step_size: f64,
    pub min_notional: f64,
}

/// One fill of an executed order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub commission_asset: String,
}

/// Executed order as reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedOrder {
    pub order_id: u64,
    pub symbol: String,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub fills: Vec<OrderFill>,
}

/// Discriminated result of an order placement attempt
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Filled(ExecutedOrder),
    Rejected { reason: String },
}

impl ExecutedOrder {
    /// Fill-weighted average execution price, falling back to the
    /// cumulative quote quantity when fills are absent
    pub fn average_price(&self) -> f64 {
        let filled: f64 = self.fills.iter().map(|f| f.quantity).sum();
        if filled > 0.0 {
            let notional: f64 = self.fills.iter().map(|f| f.price * f.quantity).sum();
            notional / filled
        } else if self.executed_qty > 0.0 {
            self.cumulative_quote_qty / self.executed_qty
        } else {
            0.0
        }
    }

    /// Total commission paid in the given asset. Commission charged in any
    /// other asset is not converted, only surfaced in the fills themselves.
    pub fn commission_in(&self, asset: &str) -> f64 {
        self.fills
            .iter()
            .filter(|f| f.commission_asset == asset)
            .map(|f| f.commission)
            .sum()
    }
}
