//! Contractor service

use rust_decimal::Decimal;
use shared::{Contractor, ContractorRates, NewContractor};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Contractor service for outsourced workshops
#[derive(Clone)]
pub struct ContractorService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct ContractorRow {
    id: Uuid,
    name: String,
    phone: Option<String>,
    cut_price: Decimal,
    sew_price: Decimal,
    correction_price: Decimal,
    active: bool,
}

impl From<ContractorRow> for Contractor {
    fn from(row: ContractorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            phone: row.phone,
            rates: ContractorRates {
                cut_price: row.cut_price,
                sew_price: row.sew_price,
                correction_price: row.correction_price,
            },
            active: row.active,
        }
    }
}

const CONTRACTOR_COLUMNS: &str =
    "id, name, phone, cut_price, sew_price, correction_price, active";

impl ContractorService {
    /// Create a new ContractorService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewContractor) -> AppResult<Contractor> {
        input.validate()?;
        let row = sqlx::query_as::<_, ContractorRow>(&format!(
            r#"
            INSERT INTO contractors (name, phone, cut_price, sew_price, correction_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CONTRACTOR_COLUMNS}
            "#
        ))
        .bind(input.name.trim())
        .bind(input.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .bind(input.rates.cut_price)
        .bind(input.rates.sew_price)
        .bind(input.rates.correction_price)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(contractor_id = %row.id, name = %row.name, "Contractor created");
        Ok(row.into())
    }

    /// Replace the three per-piece base prices
    pub async fn update_rates(&self, contractor_id: Uuid, rates: ContractorRates) -> AppResult<Contractor> {
        rates.validate()?;
        let row = sqlx::query_as::<_, ContractorRow>(&format!(
            r#"
            UPDATE contractors
            SET cut_price = $1, sew_price = $2, correction_price = $3
            WHERE id = $4
            RETURNING {CONTRACTOR_COLUMNS}
            "#
        ))
        .bind(rates.cut_price)
        .bind(rates.sew_price)
        .bind(rates.correction_price)
        .bind(contractor_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contractor".to_string()))?;

        tracing::info!(contractor_id = %contractor_id, "Contractor rates updated");
        Ok(row.into())
    }

    pub async fn set_active(&self, contractor_id: Uuid, active: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE contractors SET active = $1 WHERE id = $2")
            .bind(active)
            .bind(contractor_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Contractor".to_string()));
        }
        Ok(())
    }

    pub async fn get(&self, contractor_id: Uuid) -> AppResult<Contractor> {
        load_contractor(&mut *self.db.acquire().await?, contractor_id).await
    }

    pub async fn list(&self, active_only: bool) -> AppResult<Vec<Contractor>> {
        let rows = sqlx::query_as::<_, ContractorRow>(&format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE ($1 = FALSE OR active) ORDER BY name"
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

pub(crate) async fn load_contractor(conn: &mut PgConnection, contractor_id: Uuid) -> AppResult<Contractor> {
    let row = sqlx::query_as::<_, ContractorRow>(&format!(
        "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE id = $1"
    ))
    .bind(contractor_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Contractor".to_string()))?;
    Ok(row.into())
}
