//! Bill-of-materials service

use rust_decimal::Decimal;
use shared::{BomEntry, BomIndex, BomItem, BomPhase, NewBomEntry};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// BOM service for per-variant recipes
#[derive(Clone)]
pub struct BomService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct BomItemRow {
    id: Uuid,
    variant_id: Uuid,
    material_id: Uuid,
    quantity_per_unit: Decimal,
    phase: String,
    material_name: String,
    category_name: String,
}

impl TryFrom<BomItemRow> for BomItem {
    type Error = AppError;

    fn try_from(row: BomItemRow) -> Result<Self, Self::Error> {
        let phase = BomPhase::from_str(&row.phase)
            .ok_or_else(|| AppError::Internal(format!("Unknown BOM phase: {}", row.phase)))?;
        Ok(Self {
            entry: BomEntry {
                id: row.id,
                variant_id: row.variant_id,
                material_id: row.material_id,
                quantity_per_unit: row.quantity_per_unit,
                phase,
            },
            material_name: row.material_name,
            category_name: row.category_name,
        })
    }
}

impl BomService {
    /// Create a new BomService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Add a material to a variant's recipe; one entry per (variant, material)
    pub async fn add_entry(&self, input: NewBomEntry) -> AppResult<BomItem> {
        input.validate()?;

        let variant_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM finished_variants WHERE id = $1)",
        )
        .bind(input.variant_id)
        .fetch_one(&self.db)
        .await?;
        if !variant_exists {
            return Err(AppError::NotFound("Variant".to_string()));
        }

        let material_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1)",
        )
        .bind(input.material_id)
        .fetch_one(&self.db)
        .await?;
        if !material_exists {
            return Err(AppError::NotFound("Material".to_string()));
        }

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO bom_entries (variant_id, material_id, quantity_per_unit, phase)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (variant_id, material_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(input.variant_id)
        .bind(input.material_id)
        .bind(input.quantity_per_unit)
        .bind(input.phase.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::validation(
                "material_id",
                "This material is already in the variant's bill of materials",
                "Este insumo já está na ficha técnica da variação",
            )
        })?;

        tracing::info!(
            bom_entry_id = %id,
            variant_id = %input.variant_id,
            material_id = %input.material_id,
            phase = input.phase.as_str(),
            "BOM entry added"
        );

        let mut conn = self.db.acquire().await?;
        load_bom_index(&mut conn, &[input.variant_id])
            .await?
            .items_for(input.variant_id)
            .iter()
            .find(|item| item.entry.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("BOM entry".to_string()))
    }

    pub async fn list_entries(&self, variant_id: Uuid) -> AppResult<Vec<BomItem>> {
        let mut conn = self.db.acquire().await?;
        let index = load_bom_index(&mut conn, &[variant_id]).await?;
        Ok(index.items_for(variant_id).to_vec())
    }

    pub async fn remove_entry(&self, entry_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bom_entries WHERE id = $1")
            .bind(entry_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("BOM entry".to_string()));
        }
        tracing::info!(bom_entry_id = %entry_id, "BOM entry removed");
        Ok(())
    }
}

/// Load the recipes of the given variants with their material categories
pub(crate) async fn load_bom_index(
    conn: &mut PgConnection,
    variant_ids: &[Uuid],
) -> AppResult<BomIndex> {
    let rows = sqlx::query_as::<_, BomItemRow>(
        r#"
        SELECT b.id, b.variant_id, b.material_id, b.quantity_per_unit, b.phase,
               m.name AS material_name, c.name AS category_name
        FROM bom_entries b
        JOIN materials m ON m.id = b.material_id
        JOIN material_categories c ON c.id = m.category_id
        WHERE b.variant_id = ANY($1)
        ORDER BY b.variant_id, m.name
        "#,
    )
    .bind(variant_ids)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(BomItem::try_from).collect()
}
