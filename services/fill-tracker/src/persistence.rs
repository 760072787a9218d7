//! Store gateway over the `"order"` table
//!
//! The placement pipeline inserts rows; this service reads `CREATED` rows
//! past a watermark and applies exactly one enrichment update per order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::TrackerResult;
use crate::order::{Exchange, FillUpdate, OrderRow, OrderStatus, OrderType, TradeSide};

/// Result of applying a fill update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The row transitioned out of `CREATED`
    Updated,
    /// The row had already reached a final state; nothing was written
    AlreadyFinal,
    /// No row with that id exists
    NotFound,
}

/// Read/write access to the order rows this service reconciles
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Unreconciled rows created strictly after `watermark`, oldest first
    async fn fetch_created_since(&self, watermark: DateTime<Utc>) -> TrackerResult<Vec<OrderRow>>;

    /// Apply an enrichment update to one row. Never downgrades state:
    /// replaying an update against a finalized row is a no-op.
    async fn apply_fill(&self, order_id: i64, update: &FillUpdate) -> TrackerResult<UpdateOutcome>;
}

/// PostgreSQL-backed order store
#[derive(Debug)]
pub struct PersistenceManager {
    pool: PgPool,
    min_order_size: Decimal,
    page_size: i64,
}

impl PersistenceManager {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: PgPool, min_order_size: Decimal, page_size: i64) -> Self {
        Self {
            pool,
            min_order_size,
            page_size,
        }
    }
}

#[async_trait]
impl OrderStore for PersistenceManager {
    async fn fetch_created_since(&self, watermark: DateTime<Utc>) -> TrackerResult<Vec<OrderRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, stitch_id, pair, price, exchange, size, "type", trade_side,
                status, exchange_order_id, transaction_hash, created_time,
                last_updated_time, input_amount, input_token, output_amount,
                output_token, average_fill_price, fee_info
            FROM "order"
            WHERE created_time > $1
              AND status = 'CREATED'
              AND size > $2
            ORDER BY created_time ASC
            LIMIT $3
            "#,
        )
        .bind(watermark)
        .bind(self.min_order_size)
        .bind(self.page_size)
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .iter()
            .map(decode_order)
            .collect::<TrackerResult<Vec<_>>>()?;
        debug!("Fetched {} created orders after {}", orders.len(), watermark);
        Ok(orders)
    }

    async fn apply_fill(&self, order_id: i64, update: &FillUpdate) -> TrackerResult<UpdateOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE "order" SET
                status = $2,
                input_amount = $3,
                input_token = $4,
                output_amount = $5,
                output_token = $6,
                average_fill_price = $7,
                fee_info = $8,
                last_updated_time = $9
            WHERE id = $1 AND status = 'CREATED'
            "#,
        )
        .bind(order_id)
        .bind(update.status.as_db())
        .bind(update.input_amount)
        .bind(update.input_token.as_deref())
        .bind(update.output_amount)
        .bind(update.output_token.as_deref())
        .bind(update.average_fill_price)
        .bind(&update.fee_info)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("Order {} transitioned to {}", order_id, update.status.as_db());
            return Ok(UpdateOutcome::Updated);
        }

        let existing: Option<String> =
            sqlx::query_scalar(r#"SELECT status FROM "order" WHERE id = $1"#)
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(status) => {
                debug!("Order {} already {}; update skipped", order_id, status);
                Ok(UpdateOutcome::AlreadyFinal)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }
}

fn decode_order(row: &PgRow) -> TrackerResult<OrderRow> {
    Ok(OrderRow {
        id: row.try_get("id")?,
        stitch_id: row.try_get("stitch_id")?,
        pair: row.try_get("pair")?,
        price: row.try_get("price")?,
        exchange: Exchange::from_db(&row.try_get::<String, _>("exchange")?)?,
        size: row.try_get("size")?,
        order_type: OrderType::from_db(&row.try_get::<String, _>("type")?)?,
        trade_side: TradeSide::from_db(&row.try_get::<String, _>("trade_side")?)?,
        status: OrderStatus::from_db(&row.try_get::<String, _>("status")?)?,
        exchange_order_id: row.try_get("exchange_order_id")?,
        transaction_hash: row.try_get("transaction_hash")?,
        created_time: row.try_get("created_time")?,
        last_updated_time: row.try_get("last_updated_time")?,
        input_amount: row.try_get("input_amount")?,
        input_token: row.try_get("input_token")?,
        output_amount: row.try_get("output_amount")?,
        output_token: row.try_get("output_token")?,
        average_fill_price: row.try_get("average_fill_price")?,
        fee_info: row.try_get("fee_info")?,
    })
}

/// Create the order table and its indexes when they do not exist yet.
///
/// The placement pipeline normally provisions the schema; this keeps fresh
/// environments usable without it.
pub async fn run_migrations(pool: &PgPool) -> TrackerResult<()> {
    info!("Running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "order" (
            id BIGINT PRIMARY KEY,
            stitch_id BIGINT,
            pair TEXT NOT NULL,
            price NUMERIC,
            exchange TEXT NOT NULL,
            size NUMERIC NOT NULL,
            "type" TEXT NOT NULL,
            trade_side TEXT NOT NULL,
            status TEXT NOT NULL,
            exchange_order_id TEXT NOT NULL,
            transaction_hash TEXT,
            created_time TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_updated_time TIMESTAMPTZ NOT NULL DEFAULT now(),
            input_amount NUMERIC,
            input_token TEXT,
            output_amount NUMERIC,
            output_token TEXT,
            average_fill_price NUMERIC,
            fee_info JSONB
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_order_status_created ON "order" (status, created_time)"#,
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed");
    Ok(())
}
