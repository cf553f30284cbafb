//! Material service: categories, materials, receipts, issues and the movement journal

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    Clock, Material, MaterialCategory, MovementContext, MovementDirection, MovementFilter,
    MovementReason, StockItem, StockMovement, UnitOfMeasure, BASIC_CATEGORIES,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::ledger_store::{flush_stock_book, lock_stock_book};
use crate::error::{duplicate_as, AppError, AppResult};
use crate::validation::{validate_not_negative, validate_positive};

/// Material service owning the weighted-average ledger
#[derive(Clone)]
pub struct MaterialService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, FromRow)]
pub(crate) struct CategoryRow {
    id: Uuid,
    name: String,
}

impl From<CategoryRow> for MaterialCategory {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MaterialRow {
    pub(crate) id: Uuid,
    category_id: Uuid,
    category_name: String,
    name: String,
    unit: String,
    quantity_on_hand: Decimal,
    weighted_avg_cost: Decimal,
    active: bool,
}

impl TryFrom<MaterialRow> for Material {
    type Error = AppError;

    fn try_from(row: MaterialRow) -> Result<Self, Self::Error> {
        let unit = UnitOfMeasure::from_str(&row.unit)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", row.unit)))?;
        Ok(Self {
            id: row.id,
            category_id: row.category_id,
            category_name: row.category_name,
            name: row.name,
            unit,
            quantity_on_hand: row.quantity_on_hand,
            weighted_avg_cost: row.weighted_avg_cost,
            active: row.active,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MovementRow {
    id: Uuid,
    material_id: Option<Uuid>,
    variant_id: Option<Uuid>,
    direction: String,
    quantity: Decimal,
    unit_cost: Decimal,
    reason: String,
    note: Option<String>,
    shipment_id: Option<Uuid>,
    contractor_id: Option<Uuid>,
    production_order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let item = match (row.material_id, row.variant_id) {
            (Some(id), None) => StockItem::Material(id),
            (None, Some(id)) => StockItem::Variant(id),
            _ => {
                return Err(AppError::Internal(format!(
                    "Movement {} must reference exactly one stock item",
                    row.id
                )))
            }
        };
        let direction = MovementDirection::from_str(&row.direction)
            .ok_or_else(|| AppError::Internal(format!("Unknown direction: {}", row.direction)))?;
        let reason = MovementReason::from_str(&row.reason)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement reason: {}", row.reason)))?;
        Ok(Self {
            id: row.id,
            item,
            direction,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            reason,
            note: row.note,
            shipment_id: row.shipment_id,
            contractor_id: row.contractor_id,
            production_order_id: row.production_order_id,
            created_at: row.created_at,
        })
    }
}

/// Input for creating a category
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 120, message = "Name must have 1 to 120 characters"))]
    pub name: String,
}

/// Input for registering a material
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 120, message = "Name must have 1 to 120 characters"))]
    pub name: String,
    pub unit: UnitOfMeasure,
}

/// Input for a material receipt
#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveMaterialInput {
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    #[validate(custom = "validate_not_negative")]
    pub unit_cost: Decimal,
    pub note: Option<String>,
}

/// Input for a manual material issue
#[derive(Debug, Deserialize, Validate)]
pub struct IssueMaterialInput {
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    pub note: Option<String>,
}

/// A material after a ledger operation, with the movement it produced
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub material: Material,
    pub movement: StockMovement,
}

const MATERIAL_COLUMNS: &str = r#"
    m.id, m.category_id, c.name AS category_name, m.name, m.unit,
    m.quantity_on_hand, m.weighted_avg_cost, m.active
"#;

impl MaterialService {
    /// Create a new MaterialService instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create the basic material categories; existing names are left alone
    pub async fn seed_basic_categories(&self) -> AppResult<u64> {
        let mut created = 0;
        for name in BASIC_CATEGORIES {
            let result = sqlx::query(
                "INSERT INTO material_categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            )
            .bind(*name)
            .execute(&self.db)
            .await?;
            created += result.rows_affected();
        }
        tracing::info!(created, "Seeded basic material categories");
        Ok(created)
    }

    pub async fn create_category(&self, input: CreateCategoryInput) -> AppResult<MaterialCategory> {
        input.validate()?;
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO material_categories (name) VALUES ($1) RETURNING id, name",
        )
        .bind(input.name.trim())
        .fetch_one(&self.db)
        .await
        .map_err(duplicate_as("name"))?;
        Ok(row.into())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<MaterialCategory>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name FROM material_categories ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Register a material with zero stock and zero cost
    pub async fn create_material(&self, input: CreateMaterialInput) -> AppResult<Material> {
        input.validate()?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO materials (category_id, name, unit)
            SELECT $1, $2, $3
            WHERE EXISTS (SELECT 1 FROM material_categories WHERE id = $1)
            RETURNING id
            "#,
        )
        .bind(input.category_id)
        .bind(input.name.trim())
        .bind(input.unit.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(duplicate_as("name"))?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))?;

        tracing::info!(material_id = %id, name = %input.name, "Material created");
        self.get_material(id).await
    }

    pub async fn get_material(&self, material_id: Uuid) -> AppResult<Material> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials m
            JOIN material_categories c ON c.id = m.category_id
            WHERE m.id = $1
            "#
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?;
        row.try_into()
    }

    pub async fn list_materials(&self, active_only: bool) -> AppResult<Vec<Material>> {
        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials m
            JOIN material_categories c ON c.id = m.category_id
            WHERE ($1 = FALSE OR m.active)
            ORDER BY c.name, m.name
            "#
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn set_active(&self, material_id: Uuid, active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE materials SET active = $1 WHERE id = $2")
            .bind(active)
            .bind(material_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Material".to_string()));
        }
        Ok(())
    }

    /// Receive stock and recompute the weighted-average cost
    pub async fn receive(&self, material_id: Uuid, input: ReceiveMaterialInput) -> AppResult<LedgerEntry> {
        input.validate()?;
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let mut book = lock_stock_book(&mut tx, &BTreeSet::from([material_id]), &BTreeSet::new()).await?;
        let mut context = MovementContext::new(MovementReason::Receipt);
        context.note = input.note;
        book.receive_material(material_id, input.quantity, input.unit_cost, context)?;

        let material = book
            .material(material_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Material".to_string()))?;
        let movement = flush_stock_book(&mut tx, &mut book, now)
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("Receipt produced no movement".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            material_id = %material_id,
            quantity = %input.quantity,
            unit_cost = %input.unit_cost,
            weighted_avg_cost = %material.weighted_avg_cost,
            "Material received"
        );
        Ok(LedgerEntry { material, movement })
    }

    /// Issue stock at the current weighted-average cost
    pub async fn issue(&self, material_id: Uuid, input: IssueMaterialInput) -> AppResult<LedgerEntry> {
        input.validate()?;
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let mut book = lock_stock_book(&mut tx, &BTreeSet::from([material_id]), &BTreeSet::new()).await?;
        let mut context = MovementContext::new(MovementReason::ManualIssue);
        context.note = input.note;
        book.issue_material(material_id, input.quantity, context)?;

        let material = book
            .material(material_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Material".to_string()))?;
        let movement = flush_stock_book(&mut tx, &mut book, now)
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("Issue produced no movement".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            material_id = %material_id,
            quantity = %input.quantity,
            remaining = %material.quantity_on_hand,
            "Material issued"
        );
        Ok(LedgerEntry { material, movement })
    }

    /// List journal entries, newest first
    pub async fn list_movements(&self, filter: &MovementFilter) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, material_id, variant_id, direction, quantity, unit_cost, reason, note,
                   shipment_id, contractor_id, production_order_id, created_at
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR material_id = $1)
              AND ($2::uuid IS NULL OR variant_id = $2)
              AND ($3::uuid IS NULL OR shipment_id = $3)
              AND ($4::uuid IS NULL OR contractor_id = $4)
              AND ($5::uuid IS NULL OR production_order_id = $5)
            ORDER BY created_at DESC, id
            LIMIT $6
            "#,
        )
        .bind(filter.material_id)
        .bind(filter.variant_id)
        .bind(filter.shipment_id)
        .bind(filter.contractor_id)
        .bind(filter.production_order_id)
        .bind(filter.limit.unwrap_or(500))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
