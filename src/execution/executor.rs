use crate::api::ExchangeClient;
use crate::db::TradeStore;
use crate::models::{ExecutedOrder, OrderOutcome, Position, Sale, SymbolRules};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a buy attempt that cleared risk checks
#[derive(Debug, Clone)]
pub enum BuyOutcome {
    Executed(Position),
    /// The exchange turned the order down; cooldown stays untouched
    Rejected { reason: String },
}

/// Result of one sell leg
#[derive(Debug, Clone)]
pub enum SellOutcome {
    Executed(Sale),
    Rejected { reason: String },
}

/// Places orders and reconciles exchange fills into persisted records.
///
/// A persistence failure after a filled order is a critical, non-rolled-
/// back inconsistency: the exchange-side trade stands, the gap is logged,
/// and the outcome still reports the executed trade.
pub struct TradeExecutor {
    store: Arc<dyn TradeStore>,
}

impl TradeExecutor {
    pub fn new(store: Arc<dyn TradeStore>) -> Self {
        Self { store }
    }

    fn log_foreign_commissions(order: &ExecutedOrder, quote_asset: &str) {
        for fill in order
            .fills
            .iter()
            .filter(|f| f.commission_asset != quote_asset && f.commission > 0.0)
        {
            tracing::info!(
                "Order {}: commission {} {} recorded, not converted to {}",
                order.order_id,
                fill.commission,
                fill.commission_asset,
                quote_asset
            );
        }
    }

    /// Market buy spending `quote_amount`; persists exactly one Position
    /// on success.
    pub async fn execute_buy(
        &self,
        user_id: Uuid,
        symbol: &str,
        quote_amount: f64,
        rules: &SymbolRules,
        client: &dyn ExchangeClient,
    ) -> Result<BuyOutcome> {
        let order = match client.place_market_buy(symbol, quote_amount).await? {
            OrderOutcome::Filled(order) => order,
            OrderOutcome::Rejected { reason } => {
                tracing::warn!("Buy order for {} rejected: {}", symbol, reason);
                return Ok(BuyOutcome::Rejected { reason });
            }
        };

        Self::log_foreign_commissions(&order, &rules.quote_asset);
        let commission = order.commission_in(&rules.quote_asset);

        let position = Position {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.to_string(),
            entry_price: order.average_price(),
            quantity: order.executed_qty,
            quote_value: order.cumulative_quote_qty,
            commission,
            opened_at: Utc::now(),
            closed: false,
            bot_placed: true,
        };

        if let Err(e) = self.store.insert_position(&position).await {
            tracing::error!(
                "CRITICAL: buy order {} for {} filled on the exchange but the \
                 position could not be persisted: {}",
                order.order_id,
                symbol,
                e
            );
        }

        tracing::info!(
            "Bought {:.8} {} @ {:.8} (spent {:.2} {})",
            position.quantity,
            symbol,
            position.entry_price,
            position.quote_value,
            rules.quote_asset
        );

        Ok(BuyOutcome::Executed(position))
    }

    /// Market sell of one position's quantized quantity; persists exactly
    /// one Sale and marks the position closed on success.
    pub async fn execute_sell(
        &self,
        position: &Position,
        quantity: f64,
        rules: &SymbolRules,
        client: &dyn ExchangeClient,
    ) -> Result<SellOutcome> {
        let order = match client.place_market_sell(&position.symbol, quantity).await? {
            OrderOutcome::Filled(order) => order,
            OrderOutcome::Rejected { reason } => {
                tracing::warn!("Sell order for {} rejected: {}", position.symbol, reason);
                return Ok(SellOutcome::Rejected { reason });
            }
        };

        Self::log_foreign_commissions(&order, &rules.quote_asset);
        let commission = order.commission_in(&rules.quote_asset);
        let exit_price = order.average_price();

        let profit = (exit_price - position.entry_price) * order.executed_qty - commission;
        let profit_pct = if position.quote_value > 0.0 {
            profit / position.quote_value * 100.0
        } else {
            0.0
        };

        let sale = Sale {
            id: Uuid::new_v4(),
            position_id: position.id,
            user_id: position.user_id,
            symbol: position.symbol.clone(),
            exit_price,
            quantity: order.executed_qty,
            commission,
            profit,
            profit_pct,
            closed_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_sale(&sale).await {
            tracing::error!(
                "CRITICAL: sell order {} for {} filled on the exchange but the \
                 sale could not be persisted: {}",
                order.order_id,
                position.symbol,
                e
            );
        }
        if let Err(e) = self.store.mark_closed(position.id).await {
            tracing::error!(
                "CRITICAL: position {} sold on the exchange but could not be \
                 marked closed: {}",
                position.id,
                e
            );
        }

        tracing::info!(
            "Sold {:.8} {} @ {:.8} (profit {:.2} {}, {:.2}%)",
            sale.quantity,
            sale.symbol,
            sale.exit_price,
            sale.profit,
            rules.quote_asset,
            sale.profit_pct
        );

        Ok(SellOutcome::Executed(sale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::error::EngineError;
    use crate::models::{Candle, OrderFill};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedExchange {
        outcomes: Mutex<Vec<OrderOutcome>>,
    }

    impl ScriptedExchange {
        fn new(outcomes: Vec<OrderOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
            }
        }

        fn filled(price: f64, quantity: f64, commission: f64) -> OrderOutcome {
            OrderOutcome::Filled(ExecutedOrder {
                order_id: 7,
                symbol: "BTCUSDT".to_string(),
                executed_qty: quantity,
                cumulative_quote_qty: price * quantity,
                fills: vec![OrderFill {
                    price,
                    quantity,
                    commission,
                    commission_asset: "USDT".to_string(),
                }],
            })
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        async fn price(&self, _: &str) -> Result<f64> {
            unreachable!()
        }
        async fn klines(&self, _: &str, _: &str, _: u32) -> Result<Vec<Candle>> {
            unreachable!()
        }
        async fn symbol_rules(&self, _: &str) -> Result<SymbolRules> {
            unreachable!()
        }
        async fn free_balance(&self, _: &str) -> Result<f64> {
            Ok(f64::MAX)
        }
        async fn place_market_buy(&self, _: &str, _: f64) -> Result<OrderOutcome> {
            Ok(self.outcomes.lock().unwrap().remove(0))
        }
        async fn place_market_sell(&self, _: &str, _: f64) -> Result<OrderOutcome> {
            Ok(self.outcomes.lock().unwrap().remove(0))
        }
    }

    fn rules() -> SymbolRules {
        SymbolRules {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            min_qty: 0.0001,
            step_size: 0.0001,
            min_notional: 10.0,
        }
    }

    #[tokio::test]
    async fn test_buy_persists_one_position_from_fills() {
        let store = Arc::new(InMemoryStore::new());
        let executor = TradeExecutor::new(store.clone());
        let exchange = ScriptedExchange::new(vec![ScriptedExchange::filled(100.0, 0.5, 0.05)]);
        let user = Uuid::new_v4();

        let outcome = executor
            .execute_buy(user, "BTCUSDT", 50.0, &rules(), &exchange)
            .await
            .unwrap();

        let position = match outcome {
            BuyOutcome::Executed(p) => p,
            BuyOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        };
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.quantity, 0.5);
        assert_eq!(position.commission, 0.05);
        assert!(position.bot_placed);

        let persisted = store.positions();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, position.id);
    }

    #[tokio::test]
    async fn test_exchange_rejection_is_reported_not_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let executor = TradeExecutor::new(store.clone());
        let exchange = ScriptedExchange::new(vec![OrderOutcome::Rejected {
            reason: "MIN_NOTIONAL".to_string(),
        }]);

        let outcome = executor
            .execute_buy(Uuid::new_v4(), "BTCUSDT", 50.0, &rules(), &exchange)
            .await
            .unwrap();

        assert!(matches!(outcome, BuyOutcome::Rejected { .. }));
        assert!(store.positions().is_empty());
    }

    #[tokio::test]
    async fn test_sell_records_sale_and_closes_position() {
        let store = Arc::new(InMemoryStore::new());
        let executor = TradeExecutor::new(store.clone());
        let user = Uuid::new_v4();

        let position = Position {
            id: Uuid::new_v4(),
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            entry_price: 100.0,
            quantity: 0.5,
            quote_value: 50.0,
            commission: 0.05,
            opened_at: Utc::now(),
            closed: false,
            bot_placed: true,
        };
        store.insert_position(&position).await.unwrap();

        let exchange = ScriptedExchange::new(vec![ScriptedExchange::filled(110.0, 0.5, 0.055)]);
        let outcome = executor
            .execute_sell(&position, 0.5, &rules(), &exchange)
            .await
            .unwrap();

        let sale = match outcome {
            SellOutcome::Executed(s) => s,
            SellOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        };
        assert_eq!(sale.position_id, position.id);
        assert_eq!(sale.quantity, 0.5);
        // (110 - 100) * 0.5 - 0.055
        assert!((sale.profit - 4.945).abs() < 1e-9);
        assert!((sale.profit_pct - 9.89).abs() < 1e-9);

        assert_eq!(store.sales().len(), 1);
        assert!(store.open_positions(user, "BTCUSDT").await.unwrap().is_empty());
    }

    struct FailingStore;

    #[async_trait]
    impl TradeStore for FailingStore {
        async fn insert_position(&self, _: &Position) -> Result<()> {
            Err(EngineError::Validation("store down".to_string()))
        }
        async fn mark_closed(&self, _: Uuid) -> Result<()> {
            Err(EngineError::Validation("store down".to_string()))
        }
        async fn insert_sale(&self, _: &Sale) -> Result<()> {
            Err(EngineError::Validation("store down".to_string()))
        }
        async fn open_positions(&self, _: Uuid, _: &str) -> Result<Vec<Position>> {
            Ok(Vec::new())
        }
        async fn open_bot_exposure(&self, _: Uuid) -> Result<f64> {
            Ok(0.0)
        }
        async fn sellable_positions(&self, _: Uuid, _: &str, _: f64) -> Result<Vec<Position>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_void_the_trade() {
        let executor = TradeExecutor::new(Arc::new(FailingStore));
        let exchange = ScriptedExchange::new(vec![ScriptedExchange::filled(100.0, 0.5, 0.0)]);

        let outcome = executor
            .execute_buy(Uuid::new_v4(), "BTCUSDT", 50.0, &rules(), &exchange)
            .await
            .unwrap();

        // The exchange-side trade stands even though nothing was saved
        assert!(matches!(outcome, BuyOutcome::Executed(_)));
    }
}
