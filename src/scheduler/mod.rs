use crate::api::{ExchangeClient, ExchangeClientFactory};
use crate::bot::{BotConfig, BotRegistry};
use crate::credentials::CredentialStore;
use crate::db::TradeStore;
use crate::error::RiskRejection;
use crate::execution::{BuyOutcome, SellOutcome, TradeExecutor};
use crate::indicators::IndicatorSnapshot;
use crate::models::{Position, Signal, SymbolRules, TradeAction};
use crate::notify::NotificationSink;
use crate::risk::{BuyDecision, RiskManager, SellBatch};
use crate::strategy::{aggregate_signals, SignalStrategy};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};
use uuid::Uuid;

/// Scheduler timing and fetch limits
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Simultaneous market-data requests per tick
    pub fetch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300),
            fetch_concurrency: 5,
        }
    }
}

/// What happened for one (user, symbol) within a tick
#[derive(Debug)]
pub enum UnitResult {
    NoAction,
    Skipped { reason: String },
    Rejected(RiskRejection),
    Bought(Position),
    /// One entry per sell candidate; mixed results are expected and
    /// earlier fills are never rolled back
    Sold(Vec<SellOutcome>),
    Failed(String),
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub user_id: Uuid,
    pub symbol: String,
    pub result: UnitResult,
}

/// Collected results of one tick, also used by tests to drive the
/// pipeline without the timer
#[derive(Debug, Default)]
pub struct TickSummary {
    pub outcomes: Vec<UnitOutcome>,
}

impl TickSummary {
    pub fn trades_executed(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match &o.result {
                UnitResult::Bought(_) => 1,
                UnitResult::Sold(legs) => legs
                    .iter()
                    .filter(|l| matches!(l, SellOutcome::Executed(_)))
                    .count(),
                _ => 0,
            })
            .sum()
    }
}

/// Market data shared by every user within one tick
struct TickMarketData {
    prices: HashMap<String, f64>,
    rules: HashMap<String, SymbolRules>,
    snapshots: HashMap<(String, String), IndicatorSnapshot>,
}

/// Periodic orchestrator: snapshots active bots, batches market-data
/// fetches, and drives the per-user decision pipeline.
///
/// Self-driving: `run` loops from engine startup and a tick with no
/// active bots is a no-op. `MissedTickBehavior::Skip` plus the strictly
/// sequential loop body guarantee ticks never overlap.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: BotRegistry,
    credentials: Arc<dyn CredentialStore>,
    market: Arc<dyn ExchangeClient>,
    trading: Arc<dyn ExchangeClientFactory>,
    risk: Arc<RiskManager>,
    strategy: Arc<dyn SignalStrategy>,
    executor: TradeExecutor,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        registry: BotRegistry,
        credentials: Arc<dyn CredentialStore>,
        market: Arc<dyn ExchangeClient>,
        trading: Arc<dyn ExchangeClientFactory>,
        risk: Arc<RiskManager>,
        strategy: Arc<dyn SignalStrategy>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            registry,
            credentials,
            market,
            trading,
            risk,
            strategy,
            executor: TradeExecutor::new(store.clone()),
            store,
            notifier,
        }
    }

    /// Drive ticks forever. Never returns; failures stay inside the tick.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Scheduler started (tick every {:?}, fetch window {})",
            self.config.tick_interval,
            self.config.fetch_concurrency
        );

        loop {
            ticker.tick().await;
            let summary = self.run_tick().await;
            if !summary.outcomes.is_empty() {
                tracing::info!(
                    "Tick complete: {} units processed, {} trades executed",
                    summary.outcomes.len(),
                    summary.trades_executed()
                );
            }
        }
    }

    /// One full pass over every active bot
    pub async fn run_tick(&self) -> TickSummary {
        let bots = self.registry.snapshot();
        if bots.is_empty() {
            return TickSummary::default();
        }

        tracing::debug!("Tick started for {} active bots", bots.len());

        // Resolve credentials up front; a credential failure only costs
        // that user this tick
        let mut clients: HashMap<Uuid, Arc<dyn ExchangeClient>> = HashMap::new();
        for (user_id, _) in &bots {
            match self.credentials.credentials_for(*user_id).await {
                Ok(creds) => {
                    clients.insert(*user_id, self.trading.client_for(&creds));
                }
                Err(e) => {
                    tracing::warn!("Skipping user {} this tick: {}", user_id, e);
                }
            }
        }

        let market_data = self.fetch_market_data(&bots).await;

        let mut summary = TickSummary::default();
        let mut trades_per_user: HashMap<Uuid, usize> = HashMap::new();

        for (user_id, config) in &bots {
            let Some(client) = clients.get(user_id) else {
                continue;
            };

            for symbol_cfg in &config.symbols {
                let symbol = symbol_cfg.symbol.clone();
                let result = self
                    .process_user_symbol(*user_id, config, &symbol, client.as_ref(), &market_data)
                    .await;

                let result = match result {
                    Ok(r) => r,
                    // Isolation boundary: one unit's failure never stops
                    // the tick or its siblings
                    Err(e) => {
                        tracing::warn!("Unit ({}, {}) failed: {}", user_id, symbol, e);
                        UnitResult::Failed(e.to_string())
                    }
                };

                let executed = match &result {
                    UnitResult::Bought(_) => 1,
                    UnitResult::Sold(legs) => legs
                        .iter()
                        .filter(|l| matches!(l, SellOutcome::Executed(_)))
                        .count(),
                    _ => 0,
                };
                if executed > 0 {
                    *trades_per_user.entry(*user_id).or_default() += executed;
                }

                summary.outcomes.push(UnitOutcome {
                    user_id: *user_id,
                    symbol,
                    result,
                });
            }
        }

        self.notify_users(&trades_per_user).await;
        self.log_exposure(&bots).await;

        summary
    }

    /// Deduplicate and fetch everything the tick needs: one price and one
    /// rules lookup per symbol, one candle history per (symbol, interval),
    /// all under the bounded-concurrency window.
    async fn fetch_market_data(&self, bots: &[(Uuid, BotConfig)]) -> TickMarketData {
        let mut symbols: HashSet<String> = HashSet::new();
        // pair -> largest candle limit any user asked for
        let mut pairs: HashMap<(String, String), u32> = HashMap::new();

        for (_, config) in bots {
            for symbol_cfg in &config.symbols {
                symbols.insert(symbol_cfg.symbol.clone());
                for interval in &config.intervals {
                    let key = (symbol_cfg.symbol.clone(), interval.clone());
                    let limit = pairs.entry(key).or_insert(0);
                    *limit = (*limit).max(config.candle_limit);
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1)));
        let mut prices = HashMap::new();
        let mut rules = HashMap::new();
        let mut snapshots = HashMap::new();

        let mut symbol_tasks: JoinSet<(String, crate::Result<(f64, SymbolRules)>)> =
            JoinSet::new();
        for symbol in &symbols {
            let market = self.market.clone();
            let semaphore = semaphore.clone();
            let symbol = symbol.clone();
            symbol_tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let price = market.price(&symbol).await;
                let symbol_rules = market.symbol_rules(&symbol).await;
                let result = price.and_then(|p| symbol_rules.map(|r| (p, r)));
                (symbol, result)
            });
        }
        while let Some(joined) = symbol_tasks.join_next().await {
            match joined {
                Ok((symbol, Ok((price, symbol_rules)))) => {
                    prices.insert(symbol.clone(), price);
                    rules.insert(symbol, symbol_rules);
                }
                Ok((symbol, Err(e))) => {
                    tracing::warn!("Excluding {} this tick: {}", symbol, e);
                }
                Err(e) => {
                    tracing::error!("Symbol fetch task panicked: {}", e);
                }
            }
        }

        let mut pair_tasks: JoinSet<((String, String), crate::Result<IndicatorSnapshot>)> =
            JoinSet::new();
        for ((symbol, interval), limit) in pairs {
            // No price means the symbol is already excluded this tick
            if !prices.contains_key(&symbol) {
                continue;
            }
            let market = self.market.clone();
            let semaphore = semaphore.clone();
            pair_tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let result = market.klines(&symbol, &interval, limit).await.map(|candles| {
                    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                    // Indicators are computed once per pair and shared by
                    // every user referencing it
                    IndicatorSnapshot::compute(&closes)
                });
                ((symbol, interval), result)
            });
        }
        while let Some(joined) = pair_tasks.join_next().await {
            match joined {
                Ok((pair, Ok(snapshot))) => {
                    snapshots.insert(pair, snapshot);
                }
                Ok(((symbol, interval), Err(e))) => {
                    tracing::warn!("Excluding ({}, {}) this tick: {}", symbol, interval, e);
                }
                Err(e) => {
                    tracing::error!("Kline fetch task panicked: {}", e);
                }
            }
        }

        TickMarketData {
            prices,
            rules,
            snapshots,
        }
    }

    /// Aggregator -> risk -> executor for one (user, symbol)
    async fn process_user_symbol(
        &self,
        user_id: Uuid,
        config: &BotConfig,
        symbol: &str,
        client: &dyn ExchangeClient,
        market_data: &TickMarketData,
    ) -> crate::Result<UnitResult> {
        let (Some(&price), Some(rules)) = (
            market_data.prices.get(symbol),
            market_data.rules.get(symbol),
        ) else {
            return Ok(UnitResult::Skipped {
                reason: format!("no market data for {symbol}"),
            });
        };

        let signals: Vec<Signal> = config
            .intervals
            .iter()
            .filter_map(|interval| {
                market_data
                    .snapshots
                    .get(&(symbol.to_string(), interval.clone()))
            })
            .map(|snapshot| self.strategy.evaluate(snapshot))
            .collect();

        // Damping is against the configured interval count: intervals
        // excluded by fetch failures still count in the denominator
        let aggregated = aggregate_signals(&signals, config.intervals.len());
        tracing::debug!(
            "({}, {}) aggregated {:?} at {:.2}",
            user_id,
            symbol,
            aggregated.action,
            aggregated.confidence
        );

        match aggregated.action {
            TradeAction::Hold => Ok(UnitResult::NoAction),
            TradeAction::Buy => {
                self.run_buy(user_id, config, symbol, price, rules, client)
                    .await
            }
            TradeAction::Sell => {
                self.run_sell(user_id, symbol, price, rules, client).await
            }
        }
    }

    async fn run_buy(
        &self,
        user_id: Uuid,
        config: &BotConfig,
        symbol: &str,
        price: f64,
        rules: &SymbolRules,
        client: &dyn ExchangeClient,
    ) -> crate::Result<UnitResult> {
        let decision = self
            .risk
            .evaluate_buy(
                user_id,
                config,
                symbol,
                price,
                rules,
                self.store.as_ref(),
                client,
            )
            .await?;

        let amount = match decision {
            BuyDecision::Approved { amount } => amount,
            BuyDecision::Rejected(rejection) => {
                tracing::debug!("Buy ({}, {}) rejected: {}", user_id, symbol, rejection);
                return Ok(UnitResult::Rejected(rejection));
            }
        };

        let outcome = self
            .executor
            .execute_buy(user_id, symbol, amount, rules, client)
            .await?;

        match outcome {
            BuyOutcome::Executed(position) => {
                self.risk.stamp_cooldown(symbol);
                Ok(UnitResult::Bought(position))
            }
            BuyOutcome::Rejected { reason } => Ok(UnitResult::Failed(reason)),
        }
    }

    async fn run_sell(
        &self,
        user_id: Uuid,
        symbol: &str,
        price: f64,
        rules: &SymbolRules,
        client: &dyn ExchangeClient,
    ) -> crate::Result<UnitResult> {
        let batch = self
            .risk
            .evaluate_sell_batch(user_id, symbol, price, rules, self.store.as_ref(), client)
            .await?;

        let candidates = match batch {
            SellBatch::Candidates(candidates) => candidates,
            SellBatch::Rejected(rejection) => {
                tracing::debug!("Sell ({}, {}) rejected: {}", user_id, symbol, rejection);
                return Ok(UnitResult::Rejected(rejection));
            }
            SellBatch::NoCandidates => return Ok(UnitResult::NoAction),
        };

        let mut legs = Vec::with_capacity(candidates.len());
        for position in &candidates {
            let quantity = match self.risk.vet_sell_candidate(position, price, rules) {
                Ok(quantity) => quantity,
                Err(rejection) => {
                    tracing::debug!(
                        "Sell candidate {} skipped: {}",
                        position.id,
                        rejection
                    );
                    legs.push(SellOutcome::Rejected {
                        reason: rejection.to_string(),
                    });
                    continue;
                }
            };

            match self
                .executor
                .execute_sell(position, quantity, rules, client)
                .await
            {
                Ok(outcome) => {
                    if matches!(outcome, SellOutcome::Executed(_)) {
                        self.risk.stamp_cooldown(symbol);
                    }
                    legs.push(outcome);
                }
                // One candidate failing must not abort the rest of the
                // batch; earlier fills already stand
                Err(e) => {
                    tracing::warn!("Sell leg for {} failed: {}", position.id, e);
                    legs.push(SellOutcome::Rejected {
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(UnitResult::Sold(legs))
    }

    /// At most one notification per user per tick, none when no trades
    /// happened. Undelivered is a normal outcome.
    async fn notify_users(&self, trades_per_user: &HashMap<Uuid, usize>) {
        for (user_id, count) in trades_per_user {
            if *count == 0 {
                continue;
            }
            let payload = format!("Executed {count} trade(s) this cycle");
            let delivered = self.notifier.send(*user_id, &payload).await;
            if !delivered {
                tracing::debug!("Notification for user {} not delivered", user_id);
            }
        }
    }

    async fn log_exposure(&self, bots: &[(Uuid, BotConfig)]) {
        for (user_id, config) in bots {
            if let Ok(exposure) = self.store.open_bot_exposure(*user_id).await {
                tracing::debug!(
                    "User {} open exposure: {:.2} / cap {:.2}",
                    user_id,
                    exposure,
                    config.max_investment
                );
            }
        }
    }
}
