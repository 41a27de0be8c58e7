use crate::db::TradeStore;
use crate::error::EngineError;
use crate::models::{Position, Sale};
use crate::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory trade store.
///
/// Serves two purposes: the no-database degraded mode of the binary, and
/// the store used by the engine tests. State dies with the process.
#[derive(Default)]
pub struct InMemoryStore {
    positions: Mutex<Vec<Position>>,
    sales: Mutex<Vec<Sale>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }

    pub fn sales(&self) -> Vec<Sale> {
        self.sales.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn insert_position(&self, position: &Position) -> Result<()> {
        self.positions.lock().unwrap().push(position.clone());
        Ok(())
    }

    async fn mark_closed(&self, position_id: Uuid) -> Result<()> {
        let mut positions = self.positions.lock().unwrap();
        match positions.iter_mut().find(|p| p.id == position_id) {
            Some(position) => {
                position.closed = true;
                Ok(())
            }
            None => Err(EngineError::Validation(format!(
                "position {position_id} not found"
            ))),
        }
    }

    async fn insert_sale(&self, sale: &Sale) -> Result<()> {
        self.sales.lock().unwrap().push(sale.clone());
        Ok(())
    }

    async fn open_positions(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Position>> {
        let mut matches: Vec<Position> = self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id && p.symbol == symbol && !p.closed)
            .cloned()
            .collect();
        matches.sort_by_key(|p| p.opened_at);
        Ok(matches)
    }

    async fn open_bot_exposure(&self, user_id: Uuid) -> Result<f64> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id && !p.closed && p.bot_placed)
            .map(|p| p.quote_value)
            .sum())
    }

    async fn sellable_positions(
        &self,
        user_id: Uuid,
        symbol: &str,
        max_entry_price: f64,
    ) -> Result<Vec<Position>> {
        let mut matches: Vec<Position> = self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.user_id == user_id
                    && p.symbol == symbol
                    && !p.closed
                    && p.bot_placed
                    && p.entry_price < max_entry_price
            })
            .cloned()
            .collect();
        matches.sort_by_key(|p| p.opened_at);
        Ok(matches)
    }
}
