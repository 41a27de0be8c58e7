// Exchange access, typed at the boundary
pub mod binance;

pub use binance::{BinanceClient, BinanceClientFactory};

use crate::credentials::ExchangeCredentials;
use crate::models::{Candle, OrderOutcome, SymbolRules};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything the engine needs from an exchange.
///
/// Market-data reads are public; balance and order calls assume the
/// transport is already authenticated. Order placement returns a
/// discriminated `OrderOutcome`: an exchange-side rejection is data, a
/// transport failure is an error.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest trade price for the symbol
    async fn price(&self, symbol: &str) -> Result<f64>;

    /// Candle history, oldest first
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Instrument constraints: lot step, minimum quantity/notional, assets
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules>;

    /// Free (unlocked) balance of the asset
    async fn free_balance(&self, asset: &str) -> Result<f64>;

    /// Market buy spending `quote_amount` of the quote asset
    async fn place_market_buy(&self, symbol: &str, quote_amount: f64) -> Result<OrderOutcome>;

    /// Market sell of `quantity` base units
    async fn place_market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome>;
}

/// Builds a per-user trading client from decrypted credentials.
///
/// Market data is shared across users; only balance and order calls go
/// through a per-user client.
pub trait ExchangeClientFactory: Send + Sync {
    fn client_for(&self, credentials: &ExchangeCredentials) -> Arc<dyn ExchangeClient>;
}
