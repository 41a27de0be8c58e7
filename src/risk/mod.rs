use crate::api::ExchangeClient;
use crate::bot::BotConfig;
use crate::db::TradeStore;
use crate::error::RiskRejection;
use crate::models::{Position, SymbolRules};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Entry prices within this fraction of the current price count as
/// duplicates of an open position.
pub const DUPLICATE_BAND: f64 = 0.004;
/// Sell candidates must have been entered below price x this factor.
pub const SELL_ENTRY_DISCOUNT: f64 = 0.995;
/// A position only sells while price >= entry x this factor.
pub const PROFIT_FLOOR: f64 = 1.005;

/// Outcome of the ordered buy checks
#[derive(Debug, Clone, PartialEq)]
pub enum BuyDecision {
    /// Amount may exceed the configured trade amount when raised to the
    /// instrument's minimum notional
    Approved { amount: f64 },
    Rejected(RiskRejection),
}

/// Outcome of the batch-level sell checks for one (user, symbol)
#[derive(Debug, Clone)]
pub enum SellBatch {
    /// Vetted candidates, oldest first; each still passes per-candidate
    /// checks independently at execution time
    Candidates(Vec<Position>),
    Rejected(RiskRejection),
    /// Nothing to sell; not a rejection worth reporting
    NoCandidates,
}

/// Floor a quantity to the instrument's lot step.
///
/// The relative epsilon keeps an exact multiple of the step from losing a
/// whole step to floating-point division.
pub fn quantize_to_step(quantity: f64, step_size: f64) -> f64 {
    if step_size <= 0.0 {
        return quantity;
    }
    (quantity / step_size * (1.0 + 1e-9)).floor() * step_size
}

/// Stateful risk gate for the whole engine.
///
/// Owns the cooldown map. The key is the SYMBOL ALONE, not (user, symbol):
/// all users trading a symbol in this process share one stamp, trading
/// per-user fairness for exchange-wide rate protection. A per-user scheme
/// would key on (user, symbol) here and in `stamp_cooldown`.
#[derive(Default)]
pub struct RiskManager {
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade on the symbol at the current instant
    pub fn stamp_cooldown(&self, symbol: &str) {
        self.stamp_cooldown_at(symbol, Utc::now());
    }

    pub fn stamp_cooldown_at(&self, symbol: &str, at: DateTime<Utc>) {
        self.cooldowns
            .lock()
            .unwrap()
            .insert(symbol.to_string(), at);
    }

    /// Minutes left on the symbol's cooldown, if any
    fn cooldown_remaining(&self, symbol: &str, cooldown_minutes: i64) -> Option<i64> {
        let cooldowns = self.cooldowns.lock().unwrap();
        let last_trade = cooldowns.get(symbol)?;
        let elapsed = Utc::now().signed_duration_since(*last_trade);
        let window = Duration::minutes(cooldown_minutes);
        if elapsed < window {
            Some((window - elapsed).num_minutes().max(1))
        } else {
            None
        }
    }

    /// Ordered buy checks, short-circuiting on the first failure.
    ///
    /// Does not place the order and does not stamp the cooldown; the
    /// cooldown is only stamped once the exchange confirms the trade.
    pub async fn evaluate_buy(
        &self,
        user_id: Uuid,
        config: &BotConfig,
        symbol: &str,
        price: f64,
        rules: &SymbolRules,
        store: &dyn TradeStore,
        client: &dyn ExchangeClient,
    ) -> Result<BuyDecision> {
        // 1. cooldown
        if let Some(remaining) = self.cooldown_remaining(symbol, config.cooldown_minutes) {
            return Ok(BuyDecision::Rejected(RiskRejection::Cooldown {
                symbol: symbol.to_string(),
                remaining_minutes: remaining,
            }));
        }

        // 2. configured price band
        let symbol_cfg = config.symbol_config(symbol);
        let lower = symbol_cfg.and_then(|c| c.lower_price_limit);
        let upper = symbol_cfg.and_then(|c| c.upper_price_limit);
        if lower.map_or(false, |l| price < l) || upper.map_or(false, |u| price > u) {
            return Ok(BuyDecision::Rejected(RiskRejection::PriceBand {
                price,
                lower,
                upper,
            }));
        }

        // 3. raise the spend to the instrument's minimum order value
        let amount = config.trade_amount.max(rules.min_notional);

        // 4. max investment cap, failing closed when exposure is unknown
        let open_value = match store.open_bot_exposure(user_id).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "Exposure query failed for user {}, failing closed: {}",
                    user_id,
                    e
                );
                return Ok(BuyDecision::Rejected(RiskRejection::MaxInvestment {
                    open_value: None,
                    amount,
                    cap: config.max_investment,
                }));
            }
        };
        if open_value + amount > config.max_investment {
            return Ok(BuyDecision::Rejected(RiskRejection::MaxInvestment {
                open_value: Some(open_value),
                amount,
                cap: config.max_investment,
            }));
        }

        // 5. duplicate-position band around the current price
        let open_positions = store.open_positions(user_id, symbol).await?;
        if let Some(duplicate) = open_positions.iter().find(|p| {
            p.entry_price >= price * (1.0 - DUPLICATE_BAND)
                && p.entry_price <= price * (1.0 + DUPLICATE_BAND)
        }) {
            return Ok(BuyDecision::Rejected(RiskRejection::DuplicatePosition {
                entry_price: duplicate.entry_price,
                price,
            }));
        }

        // 6. quote balance must cover the spend
        let available = client.free_balance(&rules.quote_asset).await?;
        if available < amount {
            return Ok(BuyDecision::Rejected(RiskRejection::InsufficientBalance {
                required: amount,
                available,
            }));
        }

        Ok(BuyDecision::Approved { amount })
    }

    /// Batch-level sell checks for one (user, symbol).
    ///
    /// Either the whole candidate set is eligible or the batch is rejected
    /// for the tick; there is no partial-balance splitting.
    pub async fn evaluate_sell_batch(
        &self,
        user_id: Uuid,
        symbol: &str,
        price: f64,
        rules: &SymbolRules,
        store: &dyn TradeStore,
        client: &dyn ExchangeClient,
    ) -> Result<SellBatch> {
        let base_balance = client.free_balance(&rules.base_asset).await?;
        if base_balance <= 0.0 {
            return Ok(SellBatch::NoCandidates);
        }

        let candidates = store
            .sellable_positions(user_id, symbol, price * SELL_ENTRY_DISCOUNT)
            .await?;
        if candidates.is_empty() {
            return Ok(SellBatch::NoCandidates);
        }

        let total_quantity: f64 = candidates.iter().map(|p| p.quantity).sum();
        if base_balance < total_quantity {
            return Ok(SellBatch::Rejected(RiskRejection::InsufficientBalance {
                required: total_quantity,
                available: base_balance,
            }));
        }

        Ok(SellBatch::Candidates(candidates))
    }

    /// Per-candidate checks, applied independently right before each sell.
    ///
    /// Returns the lot-quantized quantity to sell, or the reason this
    /// candidate is skipped. Profitability is re-verified per candidate
    /// because entry prices differ within a batch.
    pub fn vet_sell_candidate(
        &self,
        position: &Position,
        price: f64,
        rules: &SymbolRules,
    ) -> std::result::Result<f64, RiskRejection> {
        let quantity = quantize_to_step(position.quantity, rules.step_size);

        if quantity < rules.min_qty || quantity <= 0.0 {
            return Err(RiskRejection::BelowMinimum {
                quantity,
                reason: format!("below minimum quantity {}", rules.min_qty),
            });
        }

        if quantity * price < rules.min_notional {
            return Err(RiskRejection::BelowMinimum {
                quantity,
                reason: format!("notional under {}", rules.min_notional),
            });
        }

        if price < position.entry_price * PROFIT_FLOOR {
            return Err(RiskRejection::NotProfitable {
                entry_price: position.entry_price,
                price,
            });
        }

        Ok(quantity)
    }
}
