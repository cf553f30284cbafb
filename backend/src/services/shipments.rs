//! Outsourced shipment service
//!
//! Shipments go out to a contractor for one phase, come back line by line
//! and are finalized into stock movements and a contractor payment.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    apply_returns, generate_shipment_number, shipment_totals, successor_draft, BalanceOverage,
    Clock, ContractorPayment, LineReturn, NewShipment, PhaseType, PlannedLine, ReceiptOutcome,
    Shipment, ShipmentLine, ShipmentStatus, ShipmentTotals,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::bom::load_bom_index;
use super::catalog::list_variant_rows;
use super::contractors::load_contractor;
use super::ledger_store::{flush_stock_book, lock_stock_book};
use super::payments::upsert_for_shipment;
use crate::error::{AppError, AppResult};

/// Shipment service for cut, sew and correction rounds
#[derive(Clone)]
pub struct ShipmentService {
    db: PgPool,
    clock: Arc<dyn Clock>,
    number_attempts: u32,
}

#[derive(Debug, FromRow)]
struct ShipmentRow {
    id: Uuid,
    number: String,
    contractor_id: Uuid,
    phase_type: String,
    product_id: Option<Uuid>,
    predecessor_id: Option<Uuid>,
    kg_sent: Decimal,
    sent_at: DateTime<Utc>,
    received_at: Option<DateTime<Utc>>,
    status: String,
    notes: Option<String>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = AppError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        let phase_type = PhaseType::from_str(&row.phase_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown phase type: {}", row.phase_type)))?;
        let status = ShipmentStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown shipment status: {}", row.status)))?;
        Ok(Self {
            id: row.id,
            number: row.number,
            contractor_id: row.contractor_id,
            phase_type,
            product_id: row.product_id,
            predecessor_id: row.predecessor_id,
            kg_sent: row.kg_sent,
            sent_at: row.sent_at,
            received_at: row.received_at,
            status,
            notes: row.notes,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    shipment_id: Uuid,
    variant_id: Uuid,
    planned_qty: Decimal,
    ok_qty: Decimal,
    loss_qty: Decimal,
    missing_qty: Decimal,
    returned_qty: Decimal,
    unit_price_override: Decimal,
}

impl From<LineRow> for ShipmentLine {
    fn from(row: LineRow) -> Self {
        Self {
            id: row.id,
            shipment_id: row.shipment_id,
            variant_id: row.variant_id,
            planned_qty: row.planned_qty,
            ok_qty: row.ok_qty,
            loss_qty: row.loss_qty,
            missing_qty: row.missing_qty,
            returned_qty: row.returned_qty,
            unit_price_override: row.unit_price_override,
        }
    }
}

const SHIPMENT_COLUMNS: &str = r#"
    id, number, contractor_id, phase_type, product_id, predecessor_id,
    kg_sent, sent_at, received_at, status, notes
"#;

/// A shipment with its lines
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentDetail {
    pub shipment: Shipment,
    pub lines: Vec<ShipmentLine>,
}

/// Result of recording returns: the refreshed shipment and any over-returned lines
#[derive(Debug, Clone, Serialize)]
pub struct ReturnsRecorded {
    pub detail: ShipmentDetail,
    pub overages: Vec<BalanceOverage>,
}

/// Result of finalizing a receipt
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedReceipt {
    pub receipt: ReceiptOutcome,
    pub payment: Option<ContractorPayment>,
    pub movements_recorded: usize,
}

impl ShipmentService {
    /// Create a new ShipmentService instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>, number_attempts: u32) -> Self {
        Self {
            db,
            clock,
            number_attempts: number_attempts.max(1),
        }
    }

    pub async fn create(&self, input: NewShipment) -> AppResult<ShipmentDetail> {
        input.validate()?;
        let mut tx = self.db.begin().await?;
        load_contractor(&mut tx, input.contractor_id).await?;
        let detail = insert_shipment(&mut tx, &input, self.clock.now(), self.number_attempts).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Open a shipment with one empty line per variant of `product_id`
    pub async fn create_for_product(
        &self,
        contractor_id: Uuid,
        phase_type: PhaseType,
        product_id: Uuid,
    ) -> AppResult<ShipmentDetail> {
        let mut tx = self.db.begin().await?;
        load_contractor(&mut tx, contractor_id).await?;
        ensure_product_exists(&mut tx, product_id).await?;

        let variants = list_variant_rows(&mut tx, product_id).await?;
        if variants.is_empty() {
            return Err(AppError::validation(
                "product_id",
                "Product has no variants",
                "O produto não possui variantes",
            ));
        }

        let input = NewShipment {
            contractor_id,
            phase_type,
            product_id: Some(product_id),
            predecessor_id: None,
            kg_sent: Decimal::ZERO,
            notes: None,
            lines: variants
                .iter()
                .map(|variant| PlannedLine {
                    variant_id: variant.id(),
                    planned_qty: Decimal::ZERO,
                    unit_price_override: Decimal::ZERO,
                })
                .collect(),
        };
        input.validate()?;

        let detail = insert_shipment(&mut tx, &input, self.clock.now(), self.number_attempts).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn get(&self, shipment_id: Uuid) -> AppResult<ShipmentDetail> {
        let mut conn = self.db.acquire().await?;
        let shipment = load_shipment(&mut conn, shipment_id, false).await?;
        let lines = load_lines(&mut conn, shipment_id).await?;
        Ok(ShipmentDetail { shipment, lines })
    }

    pub async fn list(
        &self,
        contractor_id: Option<Uuid>,
        status: Option<ShipmentStatus>,
    ) -> AppResult<Vec<Shipment>> {
        let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
            r#"
            SELECT {SHIPMENT_COLUMNS}
            FROM shipments
            WHERE ($1::uuid IS NULL OR contractor_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY sent_at DESC
            "#
        ))
        .bind(contractor_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Store returned quantities on the shipment's lines
    ///
    /// Totals above the planned quantity are kept and reported.
    pub async fn record_returns(
        &self,
        shipment_id: Uuid,
        returns: Vec<LineReturn>,
    ) -> AppResult<ReturnsRecorded> {
        let mut tx = self.db.begin().await?;
        let mut shipment = load_shipment(&mut tx, shipment_id, true).await?;
        shipment.ensure_not_cancelled()?;

        let mut lines = load_lines(&mut tx, shipment_id).await?;
        let overages = apply_returns(&mut lines, &returns)?;

        let changed: BTreeSet<Uuid> = returns.iter().map(|r| r.variant_id).collect();
        for line in lines.iter().filter(|line| changed.contains(&line.variant_id)) {
            sqlx::query(
                r#"
                UPDATE shipment_lines
                SET ok_qty = $1, loss_qty = $2, missing_qty = $3, returned_qty = $4,
                    unit_price_override = $5
                WHERE id = $6
                "#,
            )
            .bind(line.ok_qty)
            .bind(line.loss_qty)
            .bind(line.missing_qty)
            .bind(line.returned_qty)
            .bind(line.unit_price_override)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;
        }

        shipment.refresh_status(&lines);
        update_status(&mut tx, &shipment).await?;
        tx.commit().await?;

        for overage in &overages {
            tracing::warn!(
                shipment = %shipment.number,
                variant_id = %overage.variant_id,
                planned_qty = %overage.planned_qty,
                accounted_qty = %overage.accounted_qty,
                "Returned quantities exceed the planned quantity"
            );
        }

        Ok(ReturnsRecorded {
            detail: ShipmentDetail { shipment, lines },
            overages,
        })
    }

    /// Post the returned pieces to stock and upsert the contractor payment
    ///
    /// Everything happens in one transaction with the shipment row locked.
    /// Finalizing an already finalized shipment applies the stock effects
    /// again and corrects the payment amount.
    pub async fn finalize_receipt(&self, shipment_id: Uuid) -> AppResult<FinalizedReceipt> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let mut shipment = load_shipment(&mut tx, shipment_id, true).await?;
        shipment.ensure_not_cancelled()?;
        if shipment.received_at.is_some() {
            tracing::warn!(shipment = %shipment.number, "Shipment finalized again");
        }

        let lines = load_lines(&mut tx, shipment_id).await?;
        let contractor = load_contractor(&mut tx, shipment.contractor_id).await?;

        let received: Vec<Uuid> = lines
            .iter()
            .filter(|line| line.ok_qty > Decimal::ZERO)
            .map(|line| line.variant_id)
            .collect();
        let bom = load_bom_index(&mut tx, &received).await?;

        let material_ids = if shipment.phase_type.consumption_phase().is_some() {
            bom.material_ids()
        } else {
            BTreeSet::new()
        };
        let variant_ids = if shipment.phase_type.credits_finished_goods() {
            received.iter().copied().collect()
        } else {
            BTreeSet::new()
        };
        let mut book = lock_stock_book(&mut tx, &material_ids, &variant_ids).await?;

        let receipt = shipment.finalize_receipt(&lines, &contractor, &bom, &mut book, now)?;
        let movements = flush_stock_book(&mut tx, &mut book, now).await?;

        sqlx::query("UPDATE shipments SET received_at = $1, status = $2 WHERE id = $3")
            .bind(shipment.received_at)
            .bind(shipment.status.as_str())
            .bind(shipment.id)
            .execute(&mut *tx)
            .await?;

        let payment = match receipt.payment_due {
            Some(amount) => Some(upsert_for_shipment(&mut tx, &shipment, amount, now).await?),
            None => {
                tracing::debug!(shipment = %shipment.number, "Nothing payable on receipt");
                None
            }
        };

        tx.commit().await?;

        tracing::info!(
            shipment = %shipment.number,
            phase = shipment.phase_type.as_str(),
            status = shipment.status.as_str(),
            lines_received = receipt.lines_received,
            movements = movements.len(),
            "Shipment receipt finalized"
        );

        Ok(FinalizedReceipt {
            receipt,
            payment,
            movements_recorded: movements.len(),
        })
    }

    pub async fn cancel(&self, shipment_id: Uuid) -> AppResult<Shipment> {
        let mut tx = self.db.begin().await?;
        let mut shipment = load_shipment(&mut tx, shipment_id, true).await?;
        shipment.cancel()?;
        update_status(&mut tx, &shipment).await?;
        tx.commit().await?;

        tracing::info!(shipment = %shipment.number, "Shipment cancelled");
        Ok(shipment)
    }

    /// Open the next shipment of a chain from the accepted pieces of `shipment_id`
    pub async fn generate_successor(
        &self,
        shipment_id: Uuid,
        next_phase: Option<PhaseType>,
        contractor_id: Option<Uuid>,
    ) -> AppResult<ShipmentDetail> {
        let mut tx = self.db.begin().await?;
        let source = load_shipment(&mut tx, shipment_id, true).await?;
        let source_lines = load_lines(&mut tx, shipment_id).await?;

        let draft = successor_draft(&source, &source_lines, next_phase, contractor_id)?;
        draft.validate()?;
        load_contractor(&mut tx, draft.contractor_id).await?;

        let detail = insert_shipment(&mut tx, &draft, self.clock.now(), self.number_attempts).await?;
        tx.commit().await?;

        tracing::info!(
            source = %source.number,
            successor = %detail.shipment.number,
            phase = detail.shipment.phase_type.as_str(),
            "Successor shipment created"
        );
        Ok(detail)
    }

    /// Planned, accepted and payable totals at the contractor's current price
    pub async fn totals(&self, shipment_id: Uuid) -> AppResult<ShipmentTotals> {
        let mut conn = self.db.acquire().await?;
        let shipment = load_shipment(&mut conn, shipment_id, false).await?;
        let lines = load_lines(&mut conn, shipment_id).await?;
        let contractor = load_contractor(&mut conn, shipment.contractor_id).await?;
        Ok(shipment_totals(&lines, contractor.base_price(shipment.phase_type)))
    }
}

async fn load_shipment(conn: &mut PgConnection, shipment_id: Uuid, lock: bool) -> AppResult<Shipment> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1{suffix}"
    ))
    .bind(shipment_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Shipment".to_string()))?
    .try_into()
}

async fn load_lines(conn: &mut PgConnection, shipment_id: Uuid) -> AppResult<Vec<ShipmentLine>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT l.id, l.shipment_id, l.variant_id, l.planned_qty, l.ok_qty, l.loss_qty,
               l.missing_qty, l.returned_qty, l.unit_price_override
        FROM shipment_lines l
        JOIN finished_variants v ON v.id = l.variant_id
        WHERE l.shipment_id = $1
        ORDER BY v.kind, l.id
        "#,
    )
    .bind(shipment_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn update_status(conn: &mut PgConnection, shipment: &Shipment) -> AppResult<()> {
    sqlx::query("UPDATE shipments SET status = $1 WHERE id = $2")
        .bind(shipment.status.as_str())
        .bind(shipment.id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Insert a shipment and its lines, retrying the number on collision
async fn ensure_product_exists(conn: &mut PgConnection, product_id: Uuid) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(product_id)
        .fetch_one(conn)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Product".to_string()));
    }
    Ok(())
}

/// Product, predecessor and every line variant must exist before anything is written
async fn check_references(conn: &mut PgConnection, input: &NewShipment) -> AppResult<()> {
    if let Some(product_id) = input.product_id {
        ensure_product_exists(&mut *conn, product_id).await?;
    }

    if let Some(predecessor_id) = input.predecessor_id {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM shipments WHERE id = $1)")
                .bind(predecessor_id)
                .fetch_one(&mut *conn)
                .await?;
        if !exists {
            return Err(AppError::NotFound("Shipment".to_string()));
        }
    }

    let requested: Vec<Uuid> = input
        .lines
        .iter()
        .map(|line| line.variant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM finished_variants WHERE id = ANY($1)")
        .bind(&requested)
        .fetch_all(&mut *conn)
        .await?;
    if found.len() != requested.len() {
        let found: BTreeSet<Uuid> = found.into_iter().collect();
        if let Some(missing) = requested.iter().find(|id| !found.contains(id)) {
            tracing::debug!(variant_id = %missing, "Shipment line references unknown variant");
        }
        return Err(AppError::NotFound("Variant".to_string()));
    }
    Ok(())
}

async fn insert_shipment(
    conn: &mut PgConnection,
    input: &NewShipment,
    now: DateTime<Utc>,
    attempts: u32,
) -> AppResult<ShipmentDetail> {
    check_references(conn, input).await?;
    let id = Uuid::new_v4();

    for attempt in 0..attempts {
        let (shipment, lines) = input.open(id, generate_shipment_number(now, attempt), now);

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO shipments
                (id, number, contractor_id, phase_type, product_id, predecessor_id,
                 kg_sent, sent_at, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (number) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(shipment.id)
        .bind(&shipment.number)
        .bind(shipment.contractor_id)
        .bind(shipment.phase_type.as_str())
        .bind(shipment.product_id)
        .bind(shipment.predecessor_id)
        .bind(shipment.kg_sent)
        .bind(shipment.sent_at)
        .bind(shipment.status.as_str())
        .bind(&shipment.notes)
        .fetch_optional(&mut *conn)
        .await?;

        if inserted.is_none() {
            tracing::debug!(number = %shipment.number, attempt, "Shipment number taken, retrying");
            continue;
        }

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO shipment_lines (id, shipment_id, variant_id, planned_qty, unit_price_override)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(line.id)
            .bind(line.shipment_id)
            .bind(line.variant_id)
            .bind(line.planned_qty)
            .bind(line.unit_price_override)
            .execute(&mut *conn)
            .await?;
        }

        tracing::info!(
            shipment_id = %shipment.id,
            number = %shipment.number,
            phase = shipment.phase_type.as_str(),
            lines = lines.len(),
            "Shipment created"
        );
        return Ok(ShipmentDetail { shipment, lines });
    }

    Err(AppError::DuplicateEntry(format!(
        "No free shipment number after {attempts} attempts"
    )))
}
