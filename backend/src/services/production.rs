//! Production order service

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{Clock, NewProductionOrder, ProductionOrder, ProductionOutcome};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::bom::load_bom_index;
use super::ledger_store::{flush_stock_book, lock_stock_book};
use crate::error::{AppError, AppResult};

/// Production service for in-house batches
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    variant_id: Uuid,
    quantity: Decimal,
    labor_cost: Decimal,
    overhead_cost: Decimal,
    notes: Option<String>,
    material_cost_total: Option<Decimal>,
    unit_cost: Option<Decimal>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// A stored order with the result of its last processing, if any
#[derive(Debug, Clone, Serialize)]
pub struct ProductionOrderRecord {
    pub order: ProductionOrder,
    pub material_cost_total: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<OrderRow> for ProductionOrderRecord {
    fn from(row: OrderRow) -> Self {
        Self {
            order: ProductionOrder {
                id: row.id,
                variant_id: row.variant_id,
                quantity: row.quantity,
                labor_cost: row.labor_cost,
                overhead_cost: row.overhead_cost,
                notes: row.notes,
                created_at: row.created_at,
            },
            material_cost_total: row.material_cost_total,
            unit_cost: row.unit_cost,
            processed_at: row.processed_at,
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    id, variant_id, quantity, labor_cost, overhead_cost, notes,
    material_cost_total, unit_cost, processed_at, created_at
"#;

impl ProductionService {
    /// Create a new ProductionService instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn create_order(&self, input: NewProductionOrder) -> AppResult<ProductionOrder> {
        input.validate()?;
        let mut tx = self.db.begin().await?;
        let order = insert_order(&mut tx, &input, self.clock.now()).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            variant_id = %order.variant_id,
            quantity = %order.quantity,
            "Production order created"
        );
        Ok(order)
    }

    /// Consume the BOM, cost the batch and credit the variant
    ///
    /// Runs in one transaction. Processing an order twice consumes its
    /// materials twice.
    pub async fn process(&self, order_id: Uuid) -> AppResult<ProductionOutcome> {
        let mut tx = self.db.begin().await?;

        let record: ProductionOrderRecord = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM production_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Production order".to_string()))?
        .into();

        if record.processed_at.is_some() {
            tracing::warn!(order_id = %order_id, "Production order processed again");
        }

        let outcome = process_in(&mut tx, &record.order, self.clock.now()).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Create an order and process it in the same transaction
    pub async fn create_and_process(
        &self,
        input: NewProductionOrder,
    ) -> AppResult<(ProductionOrder, ProductionOutcome)> {
        input.validate()?;
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let order = insert_order(&mut tx, &input, now).await?;
        let outcome = process_in(&mut tx, &order, now).await?;
        tx.commit().await?;
        Ok((order, outcome))
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<ProductionOrderRecord> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM production_orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Production order".to_string()))?;
        Ok(row.into())
    }

    pub async fn list_orders(&self, variant_id: Option<Uuid>) -> AppResult<Vec<ProductionOrderRecord>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM production_orders
            WHERE ($1::uuid IS NULL OR variant_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(variant_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

async fn insert_order(
    conn: &mut PgConnection,
    input: &NewProductionOrder,
    now: DateTime<Utc>,
) -> AppResult<ProductionOrder> {
    let variant_exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM finished_variants WHERE id = $1)",
    )
    .bind(input.variant_id)
    .fetch_one(&mut *conn)
    .await?;
    if !variant_exists {
        return Err(AppError::NotFound("Variant".to_string()));
    }

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        INSERT INTO production_orders (variant_id, quantity, labor_cost, overhead_cost, notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(input.variant_id)
    .bind(input.quantity)
    .bind(input.labor_cost)
    .bind(input.overhead_cost)
    .bind(&input.notes)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ProductionOrderRecord::from(row).order)
}

async fn process_in(
    conn: &mut PgConnection,
    order: &ProductionOrder,
    now: DateTime<Utc>,
) -> AppResult<ProductionOutcome> {
    let bom = load_bom_index(&mut *conn, &[order.variant_id]).await?;
    let mut book = lock_stock_book(
        &mut *conn,
        &bom.material_ids(),
        &BTreeSet::from([order.variant_id]),
    )
    .await?;

    let outcome = order.process(&bom, &mut book)?;
    flush_stock_book(&mut *conn, &mut book, now).await?;

    sqlx::query(
        r#"
        UPDATE production_orders
        SET material_cost_total = $1, unit_cost = $2, processed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(outcome.material_cost_total)
    .bind(outcome.unit_cost)
    .bind(now)
    .bind(order.id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        order_id = %order.id,
        variant_id = %order.variant_id,
        quantity = %order.quantity,
        material_cost_total = %outcome.material_cost_total,
        unit_cost = %outcome.unit_cost,
        "Production order processed"
    );
    Ok(outcome)
}
