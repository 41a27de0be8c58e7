// Position and sale persistence
pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use crate::models::{Position, Sale};
use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence boundary for positions and sales.
///
/// Positions are inserted once and only ever mutated by `mark_closed`;
/// sales are immutable once written.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_position(&self, position: &Position) -> Result<()>;

    async fn mark_closed(&self, position_id: Uuid) -> Result<()>;

    async fn insert_sale(&self, sale: &Sale) -> Result<()>;

    /// Every open position for (user, symbol), any origin
    async fn open_positions(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Position>>;

    /// Summed quote value of the user's open, bot-placed positions
    async fn open_bot_exposure(&self, user_id: Uuid) -> Result<f64>;

    /// Open bot-placed positions for (user, symbol) with entry price below
    /// `max_entry_price`, oldest first
    async fn sellable_positions(
        &self,
        user_id: Uuid,
        symbol: &str,
        max_entry_price: f64,
    ) -> Result<Vec<Position>>;
}
