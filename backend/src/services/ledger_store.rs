//! Row locking and write-back for the stock book
//!
//! Every change to material or variant quantities and costs goes through
//! here: rows are locked in ascending id order, the domain operation runs on
//! a [`StockBook`], and [`flush_stock_book`] persists the touched rows and
//! the movement journal inside the caller's transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use shared::{NewStockMovement, StockBook, StockMovement};
use sqlx::PgConnection;
use uuid::Uuid;

use super::catalog::VariantRow;
use super::materials::{MaterialRow, MovementRow};
use crate::error::{AppError, AppResult};

/// Lock and load the given materials and variants
///
/// Materials are locked before variants, each set in ascending id order.
pub(crate) async fn lock_stock_book(
    conn: &mut PgConnection,
    material_ids: &BTreeSet<Uuid>,
    variant_ids: &BTreeSet<Uuid>,
) -> AppResult<StockBook> {
    let mut book = StockBook::new();

    if !material_ids.is_empty() {
        let ids: Vec<Uuid> = material_ids.iter().copied().collect();
        let rows = sqlx::query_as::<_, MaterialRow>(
            r#"
            SELECT m.id, m.category_id, c.name AS category_name, m.name, m.unit,
                   m.quantity_on_hand, m.weighted_avg_cost, m.active
            FROM materials m
            JOIN material_categories c ON c.id = m.category_id
            WHERE m.id = ANY($1)
            ORDER BY m.id
            FOR UPDATE OF m
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        if rows.len() != ids.len() {
            let found: BTreeSet<Uuid> = rows.iter().map(|r| r.id).collect();
            let missing = ids.iter().find(|id| !found.contains(id)).copied();
            return Err(AppError::NotFound(format!(
                "Material {}",
                missing.map(|id| id.to_string()).unwrap_or_default()
            )));
        }
        for row in rows {
            book.insert_material(row.try_into()?);
        }
    }

    if !variant_ids.is_empty() {
        let ids: Vec<Uuid> = variant_ids.iter().copied().collect();
        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, product_id, kind, code, quantity_on_hand, unit_cost, suggested_price
            FROM finished_variants
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        if rows.len() != ids.len() {
            return Err(AppError::NotFound("Variant".to_string()));
        }
        for row in rows {
            book.insert_variant(row.into());
        }
    }

    Ok(book)
}

/// Persist touched rows and drain the journal into `stock_movements`
pub(crate) async fn flush_stock_book(
    conn: &mut PgConnection,
    book: &mut StockBook,
    now: DateTime<Utc>,
) -> AppResult<Vec<StockMovement>> {
    let materials: Vec<_> = book
        .touched_materials()
        .map(|m| (m.id, m.quantity_on_hand, m.weighted_avg_cost))
        .collect();
    for (id, quantity_on_hand, weighted_avg_cost) in materials {
        sqlx::query(
            r#"
            UPDATE materials
            SET quantity_on_hand = $1, weighted_avg_cost = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(quantity_on_hand)
        .bind(weighted_avg_cost)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }

    let variants: Vec<_> = book
        .touched_variants()
        .map(|v| (v.id, v.quantity_on_hand, v.unit_cost))
        .collect();
    for (id, quantity_on_hand, unit_cost) in variants {
        sqlx::query(
            r#"
            UPDATE finished_variants
            SET quantity_on_hand = $1, unit_cost = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(quantity_on_hand)
        .bind(unit_cost)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }

    let mut recorded = Vec::with_capacity(book.journal().len());
    for movement in book.take_journal() {
        recorded.push(insert_movement(&mut *conn, &movement, now).await?);
    }
    Ok(recorded)
}

async fn insert_movement(
    conn: &mut PgConnection,
    movement: &NewStockMovement,
    now: DateTime<Utc>,
) -> AppResult<StockMovement> {
    let row = sqlx::query_as::<_, MovementRow>(
        r#"
        INSERT INTO stock_movements (
            material_id, variant_id, direction, quantity, unit_cost, reason, note,
            shipment_id, contractor_id, production_order_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, material_id, variant_id, direction, quantity, unit_cost, reason, note,
                  shipment_id, contractor_id, production_order_id, created_at
        "#,
    )
    .bind(movement.item.material_id())
    .bind(movement.item.variant_id())
    .bind(movement.direction.as_str())
    .bind(movement.quantity)
    .bind(movement.unit_cost)
    .bind(movement.context.reason.as_str())
    .bind(&movement.context.note)
    .bind(movement.context.shipment_id)
    .bind(movement.context.contractor_id)
    .bind(movement.context.production_order_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}
