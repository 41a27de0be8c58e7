use crate::db::TradeStore;
use crate::error::EngineError;
use crate::models::{Position, Sale};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres-backed trade store
pub struct PostgresStore {
    pool: PgPool,
}

fn numeric(value: Decimal, column: &str) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| EngineError::Validation(format!("numeric out of range in {column}")))
}

fn to_decimal(value: f64, column: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| EngineError::Validation(format!("non-finite value for {column}")))
}

fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
    let entry_price: Decimal = row.get("entry_price");
    let quantity: Decimal = row.get("quantity");
    let quote_value: Decimal = row.get("quote_value");
    let commission: Decimal = row.get("commission");
    let opened_at: DateTime<Utc> = row.get("opened_at");

    Ok(Position {
        id: row.get("id"),
        user_id: row.get("user_id"),
        symbol: row.get("symbol"),
        entry_price: numeric(entry_price, "entry_price")?,
        quantity: numeric(quantity, "quantity")?,
        quote_value: numeric(quote_value, "quote_value")?,
        commission: numeric(commission, "commission")?,
        opened_at,
        closed: row.get("closed"),
        bot_placed: row.get("bot_placed"),
    })
}

impl PostgresStore {
    /// Connect and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EngineError::Persistence(sqlx::Error::Migrate(Box::new(e))))?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }
}

#[async_trait]
impl TradeStore for PostgresStore {
    async fn insert_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, user_id, symbol, entry_price, quantity, quote_value,
                commission, opened_at, closed, bot_placed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(position.id)
        .bind(position.user_id)
        .bind(&position.symbol)
        .bind(to_decimal(position.entry_price, "entry_price")?)
        .bind(to_decimal(position.quantity, "quantity")?)
        .bind(to_decimal(position.quote_value, "quote_value")?)
        .bind(to_decimal(position.commission, "commission")?)
        .bind(position.opened_at)
        .bind(position.closed)
        .bind(position.bot_placed)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved position {} for {} to Postgres",
            position.id,
            position.symbol
        );

        Ok(())
    }

    async fn mark_closed(&self, position_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE positions SET closed = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(position_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Validation(format!(
                "position {position_id} not found"
            )));
        }
        Ok(())
    }

    async fn insert_sale(&self, sale: &Sale) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, position_id, user_id, symbol, exit_price, quantity,
                commission, profit, profit_pct, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(sale.id)
        .bind(sale.position_id)
        .bind(sale.user_id)
        .bind(&sale.symbol)
        .bind(to_decimal(sale.exit_price, "exit_price")?)
        .bind(to_decimal(sale.quantity, "quantity")?)
        .bind(to_decimal(sale.commission, "commission")?)
        .bind(to_decimal(sale.profit, "profit")?)
        .bind(to_decimal(sale.profit_pct, "profit_pct")?)
        .bind(sale.closed_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved sale {} for {} to Postgres", sale.id, sale.symbol);

        Ok(())
    }

    async fn open_positions(&self, user_id: Uuid, symbol: &str) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, symbol, entry_price, quantity, quote_value,
                   commission, opened_at, closed, bot_placed
            FROM positions
            WHERE user_id = $1 AND symbol = $2 AND NOT closed
            ORDER BY opened_at ASC
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_position).collect()
    }

    async fn open_bot_exposure(&self, user_id: Uuid) -> Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(quote_value), 0) AS exposure
            FROM positions
            WHERE user_id = $1 AND NOT closed AND bot_placed
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let exposure: Decimal = row.get("exposure");
        numeric(exposure, "exposure")
    }

    async fn sellable_positions(
        &self,
        user_id: Uuid,
        symbol: &str,
        max_entry_price: f64,
    ) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, symbol, entry_price, quantity, quote_value,
                   commission, opened_at, closed, bot_placed
            FROM positions
            WHERE user_id = $1 AND symbol = $2 AND NOT closed AND bot_placed
              AND entry_price < $3
            ORDER BY opened_at ASC
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(to_decimal(max_entry_price, "max_entry_price")?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_position).collect()
    }
}
