// Order execution and trade reconciliation
pub mod executor;

pub use executor::{BuyOutcome, SellOutcome, TradeExecutor};
