//! Catalog service: products and their finished-goods variants

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    kinds_or_default, unique_variant_code, variant_code_base, FinishedVariant, Product,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{duplicate_as, AppError, AppResult};
use crate::validation::validate_not_negative;

/// Catalog service for products and variants
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    kind: String,
    code: String,
    quantity_on_hand: Decimal,
    unit_cost: Decimal,
    suggested_price: Decimal,
}

impl From<VariantRow> for FinishedVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            kind: row.kind,
            code: row.code,
            quantity_on_hand: row.quantity_on_hand,
            unit_cost: row.unit_cost,
            suggested_price: row.suggested_price,
        }
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120, message = "Name must have 1 to 120 characters"))]
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating variants of a product
#[derive(Debug, Deserialize, Validate)]
pub struct EnsureVariantsInput {
    /// Kinds to create; empty means the default kind
    #[serde(default)]
    pub kinds: Vec<String>,
    #[validate(custom = "validate_not_negative")]
    #[serde(default)]
    pub suggested_price: Decimal,
}

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            INSERT INTO products (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, active
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product_id = %row.id, name = %row.name, "Product created");
        Ok(row.into())
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, description, active FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        Ok(row.into())
    }

    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, description, active FROM products ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create the variants of `product_id` that do not exist yet
    ///
    /// Returns how many were created.
    pub async fn ensure_variants_for_kinds(
        &self,
        product_id: Uuid,
        input: EnsureVariantsInput,
    ) -> AppResult<u32> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let product: Product = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, description, active FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?
        .into();

        let existing: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT kind FROM finished_variants WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut created = 0;
        for kind in kinds_or_default(&input.kinds) {
            if existing.contains(&kind) {
                continue;
            }
            insert_variant(&mut tx, &product, &kind, input.suggested_price).await?;
            created += 1;
        }
        tx.commit().await?;

        tracing::info!(product_id = %product_id, created, "Variants ensured");
        Ok(created)
    }

    pub async fn get_variant(&self, variant_id: Uuid) -> AppResult<FinishedVariant> {
        let row = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, product_id, kind, code, quantity_on_hand, unit_cost, suggested_price
            FROM finished_variants
            WHERE id = $1
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Variant".to_string()))?;
        Ok(row.into())
    }

    /// Variants of a product, ordered by kind
    pub async fn list_variants(&self, product_id: Uuid) -> AppResult<Vec<FinishedVariant>> {
        let rows = list_variant_rows(&mut *self.db.acquire().await?, product_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Suggested price is catalog data; stock and cost stay with the ledger
    pub async fn update_suggested_price(&self, variant_id: Uuid, price: Decimal) -> AppResult<()> {
        validate_not_negative(&price).map_err(|_| {
            AppError::validation(
                "suggested_price",
                "Value cannot be negative",
                "O valor não pode ser negativo",
            )
        })?;
        let result = sqlx::query("UPDATE finished_variants SET suggested_price = $1 WHERE id = $2")
            .bind(price)
            .bind(variant_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Variant".to_string()));
        }
        Ok(())
    }
}

pub(crate) async fn list_variant_rows(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> AppResult<Vec<VariantRow>> {
    let rows = sqlx::query_as::<_, VariantRow>(
        r#"
        SELECT id, product_id, kind, code, quantity_on_hand, unit_cost, suggested_price
        FROM finished_variants
        WHERE product_id = $1
        ORDER BY kind
        "#,
    )
    .bind(product_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

impl VariantRow {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }
}

/// Insert a variant with a freshly derived, collision-free code
async fn insert_variant(
    conn: &mut PgConnection,
    product: &Product,
    kind: &str,
    suggested_price: Decimal,
) -> AppResult<FinishedVariant> {
    let base = variant_code_base(product.id, &product.name, kind);
    let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
        "SELECT code FROM finished_variants WHERE code LIKE $1 || '%'",
    )
    .bind(&base)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();
    let code = unique_variant_code(&base, |candidate| taken.contains(candidate));

    let row = sqlx::query_as::<_, VariantRow>(
        r#"
        INSERT INTO finished_variants (product_id, kind, code, suggested_price)
        VALUES ($1, $2, $3, $4)
        RETURNING id, product_id, kind, code, quantity_on_hand, unit_cost, suggested_price
        "#,
    )
    .bind(product.id)
    .bind(kind)
    .bind(&code)
    .bind(suggested_price)
    .fetch_one(&mut *conn)
    .await
    .map_err(duplicate_as("code"))?;

    tracing::debug!(variant_id = %row.id, code = %code, "Variant created");
    Ok(row.into())
}
