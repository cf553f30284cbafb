//! Contractor payment service

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    upsert_payment, Clock, ContractorPayment, PaymentFilter, PaymentStatus, PaymentSummary,
    Shipment,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Payment service for the contractor payments report
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    shipment_id: Uuid,
    contractor_id: Uuid,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl TryFrom<PaymentRow> for ContractorPayment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown payment status: {}", row.status)))?;
        Ok(Self {
            id: row.id,
            shipment_id: row.shipment_id,
            contractor_id: row.contractor_id,
            total_amount: row.total_amount,
            status,
            created_at: row.created_at,
            paid_at: row.paid_at,
            notes: row.notes,
        })
    }
}

const PAYMENT_COLUMNS: &str =
    "p.id, p.shipment_id, p.contractor_id, p.total_amount, p.status, p.created_at, p.paid_at, p.notes";

impl PaymentService {
    /// Create a new PaymentService instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn get(&self, payment_id: Uuid) -> AppResult<ContractorPayment> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM contractor_payments p WHERE p.id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;
        row.try_into()
    }

    pub async fn get_for_shipment(&self, shipment_id: Uuid) -> AppResult<Option<ContractorPayment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM contractor_payments p WHERE p.shipment_id = $1"
        ))
        .bind(shipment_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Payments matching `filter`, newest first
    pub async fn list(&self, filter: &PaymentFilter) -> AppResult<Vec<ContractorPayment>> {
        let (start, end) = filter
            .created
            .as_ref()
            .map_or((None, None), |range| (range.start, range.end));

        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM contractor_payments p
            JOIN shipments s ON s.id = p.shipment_id
            WHERE ($1::uuid IS NULL OR p.contractor_id = $1)
              AND ($2::text IS NULL OR p.status = $2)
              AND ($3::text IS NULL OR s.phase_type = $3)
              AND ($4::date IS NULL OR p.created_at::date >= $4)
              AND ($5::date IS NULL OR p.created_at::date <= $5)
            ORDER BY p.created_at DESC
            "#
        ))
        .bind(filter.contractor_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.phase_type.map(|p| p.as_str()))
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Pending and paid totals over the payments matching `filter`
    pub async fn summary(&self, filter: &PaymentFilter) -> AppResult<PaymentSummary> {
        let payments = self.list(filter).await?;
        Ok(payments.iter().collect())
    }

    /// Mark a payment paid now; no-op when already paid
    pub async fn mark_paid(&self, payment_id: Uuid) -> AppResult<ContractorPayment> {
        let now = self.clock.now();
        self.change_status(payment_id, |payment| payment.mark_paid(now))
            .await
    }

    /// Return a payment to pending; no-op when already pending
    pub async fn mark_pending(&self, payment_id: Uuid) -> AppResult<ContractorPayment> {
        self.change_status(payment_id, ContractorPayment::mark_pending)
            .await
    }

    async fn change_status<F>(&self, payment_id: Uuid, change: F) -> AppResult<ContractorPayment>
    where
        F: FnOnce(&mut ContractorPayment) -> bool,
    {
        let mut tx = self.db.begin().await?;
        let mut payment: ContractorPayment = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM contractor_payments p WHERE p.id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?
        .try_into()?;

        if !change(&mut payment) {
            tracing::debug!(payment_id = %payment_id, status = payment.status.as_str(), "Payment status unchanged");
            return Ok(payment);
        }

        sqlx::query("UPDATE contractor_payments SET status = $1, paid_at = $2 WHERE id = $3")
            .bind(payment.status.as_str())
            .bind(payment.paid_at)
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment_id, status = payment.status.as_str(), "Payment status changed");
        Ok(payment)
    }
}

/// Create or correct the payment of a finalized shipment inside the caller's transaction
pub(crate) async fn upsert_for_shipment(
    conn: &mut PgConnection,
    shipment: &Shipment,
    amount: Decimal,
    now: DateTime<Utc>,
) -> AppResult<ContractorPayment> {
    let existing = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM contractor_payments p WHERE p.shipment_id = $1 FOR UPDATE"
    ))
    .bind(shipment.id)
    .fetch_optional(&mut *conn)
    .await?
    .map(ContractorPayment::try_from)
    .transpose()?;

    let payment = upsert_payment(existing, shipment, amount, now);

    sqlx::query(
        r#"
        INSERT INTO contractor_payments
            (id, shipment_id, contractor_id, total_amount, status, created_at, paid_at, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (shipment_id) DO UPDATE
        SET total_amount = EXCLUDED.total_amount,
            contractor_id = EXCLUDED.contractor_id
        "#,
    )
    .bind(payment.id)
    .bind(payment.shipment_id)
    .bind(payment.contractor_id)
    .bind(payment.total_amount)
    .bind(payment.status.as_str())
    .bind(payment.created_at)
    .bind(payment.paid_at)
    .bind(&payment.notes)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        shipment_id = %shipment.id,
        amount = %payment.total_amount,
        status = payment.status.as_str(),
        "Contractor payment upserted"
    );
    Ok(payment)
}
