use crate::api::{ExchangeClient, ExchangeClientFactory};
use crate::credentials::ExchangeCredentials;
use crate::error::EngineError;
use crate::models::{Candle, ExecutedOrder, OrderFill, OrderOutcome, SymbolRules};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600;

// Type alias for the rate limiter to simplify signatures
type RestRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance REST client.
///
/// Market-data endpoints are public. Balance and order endpoints attach
/// the API key header; request signing is expected from the authenticated
/// transport fronting the exchange, which is also why the base URL is
/// injectable.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<RestRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
    #[allow(dead_code)]
    locked: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfoEntry {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { min_qty: String, step_size: String },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: String },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillResponse {
    price: String,
    qty: String,
    commission: String,
    commission_asset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    symbol: String,
    executed_qty: String,
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<FillResponse>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: i64,
    msg: String,
}

fn parse_f64(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| EngineError::Exchange(format!("unparseable {field}: {value}")))
}

impl BinanceClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client with static config");

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get(&self, path_and_query: &str) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path_and_query);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Exchange(format!("{status}: {body}")));
        }
        Ok(response)
    }

    /// Raw kline rows are heterogenous arrays; pick out open time, OHLC
    /// and volume by position.
    fn parse_klines(rows: Vec<Vec<serde_json::Value>>) -> Result<Vec<Candle>> {
        let mut candles = Vec::with_capacity(rows.len());

        for row in rows {
            if row.len() < 6 {
                return Err(EngineError::Exchange(format!(
                    "kline row with {} fields",
                    row.len()
                )));
            }

            let open_time_ms = row[0]
                .as_i64()
                .ok_or_else(|| EngineError::Exchange("kline open time not numeric".into()))?;
            let open_time: DateTime<Utc> = DateTime::from_timestamp_millis(open_time_ms)
                .ok_or_else(|| EngineError::Exchange("kline open time out of range".into()))?;

            let field = |idx: usize, name: &str| -> Result<f64> {
                row[idx]
                    .as_str()
                    .ok_or_else(|| EngineError::Exchange(format!("kline {name} not a string")))
                    .and_then(|s| parse_f64(s, name))
            };

            candles.push(Candle {
                open_time,
                open: field(1, "open")?,
                high: field(2, "high")?,
                low: field(3, "low")?,
                close: field(4, "close")?,
                volume: field(5, "volume")?,
            });
        }

        Ok(candles)
    }

    async fn place_order(&self, query: String) -> Result<OrderOutcome> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/order?{}", self.base_url, query);
        let mut request = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // The exchange explains rejections in a {code, msg} body;
            // anything else is a transport-level problem
            if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                tracing::warn!("Order rejected ({}): {}", api_error.code, api_error.msg);
                return Ok(OrderOutcome::Rejected {
                    reason: api_error.msg,
                });
            }
            return Err(EngineError::Network(format!("{status}: {body}")));
        }

        let order: OrderResponse = serde_json::from_str(&body)?;

        let fills = order
            .fills
            .iter()
            .map(|f| {
                Ok(OrderFill {
                    price: parse_f64(&f.price, "fill price")?,
                    quantity: parse_f64(&f.qty, "fill qty")?,
                    commission: parse_f64(&f.commission, "fill commission")?,
                    commission_asset: f.commission_asset.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderOutcome::Filled(ExecutedOrder {
            order_id: order.order_id,
            symbol: order.symbol,
            executed_qty: parse_f64(&order.executed_qty, "executedQty")?,
            cumulative_quote_qty: parse_f64(&order.cummulative_quote_qty, "cummulativeQuoteQty")?,
            fills,
        }))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn price(&self, symbol: &str) -> Result<f64> {
        let response = self
            .get(&format!("/api/v3/ticker/price?symbol={symbol}"))
            .await?;
        let ticker: TickerPriceResponse = response.json().await?;
        parse_f64(&ticker.price, "price")
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let response = self
            .get(&format!(
                "/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}"
            ))
            .await?;
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        Self::parse_klines(rows)
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        let response = self
            .get(&format!("/api/v3/exchangeInfo?symbol={symbol}"))
            .await?;
        let info: ExchangeInfoResponse = response.json().await?;

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| EngineError::Exchange(format!("unknown symbol {symbol}")))?;

        let mut rules = SymbolRules {
            symbol: entry.symbol,
            base_asset: entry.base_asset,
            quote_asset: entry.quote_asset,
            min_qty: 0.0,
            step_size: 0.0,
            min_notional: 0.0,
        };

        for filter in entry.filters {
            match filter {
                SymbolFilter::LotSize { min_qty, step_size } => {
                    rules.min_qty = parse_f64(&min_qty, "minQty")?;
                    rules.step_size = parse_f64(&step_size, "stepSize")?;
                }
                SymbolFilter::Notional { min_notional }
                | SymbolFilter::MinNotional { min_notional } => {
                    rules.min_notional = parse_f64(&min_notional, "minNotional")?;
                }
                SymbolFilter::Other => {}
            }
        }

        Ok(rules)
    }

    async fn free_balance(&self, asset: &str) -> Result<f64> {
        let response = self.get("/api/v3/account").await?;
        let account: AccountResponse = response.json().await?;

        account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| parse_f64(&b.free, "free balance"))
            .unwrap_or(Ok(0.0))
    }

    async fn place_market_buy(&self, symbol: &str, quote_amount: f64) -> Result<OrderOutcome> {
        self.place_order(format!(
            "symbol={symbol}&side=BUY&type=MARKET&quoteOrderQty={quote_amount}&newOrderRespType=FULL"
        ))
        .await
    }

    async fn place_market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome> {
        self.place_order(format!(
            "symbol={symbol}&side=SELL&type=MARKET&quantity={quantity}&newOrderRespType=FULL"
        ))
        .await
    }
}

/// Factory producing per-user trading clients against one base URL
pub struct BinanceClientFactory {
    base_url: String,
}

impl BinanceClientFactory {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }
}

impl Default for BinanceClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeClientFactory for BinanceClientFactory {
    fn client_for(&self, credentials: &ExchangeCredentials) -> Arc<dyn ExchangeClient> {
        Arc::new(BinanceClient::with_base_url(
            &self.base_url,
            Some(credentials.api_key.clone()),
        ))
    }
}
