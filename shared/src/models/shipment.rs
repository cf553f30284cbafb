//! Outsourced shipments sent to contractors and reconciled on return
//!
//! A shipment goes out to one contractor for one phase type. Its status is
//! derived from `received_at` and the line balances:
//!
//! - `Sent` until the receipt is finalized
//! - `Partial` when pieces are still unaccounted for after receipt
//! - `Done` when every planned piece is accounted for (or over-accounted)
//! - `Cancelled` on explicit cancellation of a shipment that is not done

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bom::{BomIndex, ConsumptionPhase};
use super::contractor::Contractor;
use super::movement::{MovementContext, MovementReason};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::StockBook;
use crate::types::{quantize_money, quantize_weight};
use crate::validation::{check_field, validate_non_negative, validate_unique_variants};

/// Processing phase a contractor performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Cut,
    Sew,
    Correction,
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Cut => "cut",
            PhaseType::Sew => "sew",
            PhaseType::Correction => "correction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cut" => Some(PhaseType::Cut),
            "sew" => Some(PhaseType::Sew),
            "correction" => Some(PhaseType::Correction),
            _ => None,
        }
    }

    /// BOM phase consumed when pieces come back; corrections consume nothing
    pub fn consumption_phase(&self) -> Option<ConsumptionPhase> {
        match self {
            PhaseType::Cut => Some(ConsumptionPhase::Cut),
            PhaseType::Sew => Some(ConsumptionPhase::Sew),
            PhaseType::Correction => None,
        }
    }

    /// Sewn pieces are finished goods
    pub fn credits_finished_goods(&self) -> bool {
        matches!(self, PhaseType::Sew)
    }

    /// Phase a successor shipment takes when none is requested
    pub fn default_successor(&self) -> Option<PhaseType> {
        match self {
            PhaseType::Cut => Some(PhaseType::Sew),
            PhaseType::Sew | PhaseType::Correction => None,
        }
    }

    fn consumption_reason(&self) -> MovementReason {
        match self {
            PhaseType::Cut => MovementReason::CutConsumption,
            PhaseType::Sew | PhaseType::Correction => MovementReason::SewConsumption,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Sent,
    Partial,
    Done,
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Sent => "sent",
            ShipmentStatus::Partial => "partial",
            ShipmentStatus::Done => "done",
            ShipmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(ShipmentStatus::Sent),
            "partial" => Some(ShipmentStatus::Partial),
            "done" => Some(ShipmentStatus::Done),
            "cancelled" => Some(ShipmentStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    /// Human-readable, unique, e.g. `R20240315-43210`
    pub number: String,
    pub contractor_id: Uuid,
    pub phase_type: PhaseType,
    pub product_id: Option<Uuid>,
    /// Shipment this one was generated from
    pub predecessor_id: Option<Uuid>,
    pub kg_sent: Decimal,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub status: ShipmentStatus,
    pub notes: Option<String>,
}

/// Planned pieces of one variant and what came back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentLine {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub variant_id: Uuid,
    pub planned_qty: Decimal,
    pub ok_qty: Decimal,
    pub loss_qty: Decimal,
    pub missing_qty: Decimal,
    pub returned_qty: Decimal,
    /// Zero means the contractor's base price applies
    pub unit_price_override: Decimal,
}

impl ShipmentLine {
    pub fn planned(shipment_id: Uuid, planned: &PlannedLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            variant_id: planned.variant_id,
            planned_qty: planned.planned_qty,
            ok_qty: Decimal::ZERO,
            loss_qty: Decimal::ZERO,
            missing_qty: Decimal::ZERO,
            returned_qty: Decimal::ZERO,
            unit_price_override: planned.unit_price_override,
        }
    }

    pub fn accounted_qty(&self) -> Decimal {
        self.ok_qty + self.loss_qty + self.missing_qty + self.returned_qty
    }

    /// Planned minus accounted pieces, 2 decimals. Negative when over-returned.
    pub fn balance(&self) -> Decimal {
        quantize_money(self.planned_qty - self.accounted_qty())
    }

    pub fn effective_unit_price(&self, base_price: Decimal) -> Decimal {
        if self.unit_price_override.is_zero() {
            base_price
        } else {
            self.unit_price_override
        }
    }

    pub fn amount_payable(&self, base_price: Decimal) -> Decimal {
        quantize_money(self.effective_unit_price(base_price) * self.ok_qty)
    }
}

/// Status implied by the receipt timestamp and the line balances
pub fn derive_status(received_at: Option<DateTime<Utc>>, lines: &[ShipmentLine]) -> ShipmentStatus {
    if received_at.is_none() {
        return ShipmentStatus::Sent;
    }
    let remaining: Decimal = lines.iter().map(ShipmentLine::balance).sum();
    if remaining > Decimal::ZERO {
        ShipmentStatus::Partial
    } else {
        ShipmentStatus::Done
    }
}

/// Shipment number for `at`, shifted by `attempt` to step past collisions
pub fn generate_shipment_number(at: DateTime<Utc>, attempt: u32) -> String {
    let seq = (at.timestamp().rem_euclid(100_000) + i64::from(attempt)) % 100_000;
    format!("R{}-{seq:05}", at.format("%Y%m%d"))
}

/// A line requested when creating a shipment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedLine {
    pub variant_id: Uuid,
    pub planned_qty: Decimal,
    #[serde(default)]
    pub unit_price_override: Decimal,
}

/// Input for creating a shipment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewShipment {
    pub contractor_id: Uuid,
    pub phase_type: PhaseType,
    pub product_id: Option<Uuid>,
    pub predecessor_id: Option<Uuid>,
    #[serde(default)]
    pub kg_sent: Decimal,
    pub notes: Option<String>,
    pub lines: Vec<PlannedLine>,
}

impl NewShipment {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field("kg_sent", validate_non_negative(self.kg_sent))?;
        for line in &self.lines {
            check_field("planned_qty", validate_non_negative(line.planned_qty))?;
            check_field(
                "unit_price_override",
                validate_non_negative(line.unit_price_override),
            )?;
        }
        check_field(
            "lines",
            validate_unique_variants(self.lines.iter().map(|l| l.variant_id)),
        )
    }

    /// Build the shipment header and its lines
    pub fn open(&self, id: Uuid, number: String, sent_at: DateTime<Utc>) -> (Shipment, Vec<ShipmentLine>) {
        let shipment = Shipment {
            id,
            number,
            contractor_id: self.contractor_id,
            phase_type: self.phase_type,
            product_id: self.product_id,
            predecessor_id: self.predecessor_id,
            kg_sent: quantize_weight(self.kg_sent),
            sent_at,
            received_at: None,
            status: ShipmentStatus::Sent,
            notes: self.notes.clone(),
        };
        let lines = self
            .lines
            .iter()
            .map(|planned| ShipmentLine::planned(id, planned))
            .collect();
        (shipment, lines)
    }
}

/// Returned quantities for one variant of a shipment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineReturn {
    pub variant_id: Uuid,
    #[serde(default)]
    pub ok_qty: Decimal,
    #[serde(default)]
    pub loss_qty: Decimal,
    #[serde(default)]
    pub missing_qty: Decimal,
    #[serde(default)]
    pub returned_qty: Decimal,
    /// Left unchanged when absent
    pub unit_price_override: Option<Decimal>,
}

impl LineReturn {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field("ok_qty", validate_non_negative(self.ok_qty))?;
        check_field("loss_qty", validate_non_negative(self.loss_qty))?;
        check_field("missing_qty", validate_non_negative(self.missing_qty))?;
        check_field("returned_qty", validate_non_negative(self.returned_qty))?;
        if let Some(price) = self.unit_price_override {
            check_field("unit_price_override", validate_non_negative(price))?;
        }
        Ok(())
    }
}

/// A line whose returned pieces exceed the planned quantity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceOverage {
    pub line_id: Uuid,
    pub variant_id: Uuid,
    pub planned_qty: Decimal,
    pub accounted_qty: Decimal,
}

/// Store returned quantities on the matching lines
///
/// Either every return is applied or none is. Over-returns are kept as
/// entered and reported back.
pub fn apply_returns(
    lines: &mut [ShipmentLine],
    returns: &[LineReturn],
) -> LedgerResult<Vec<BalanceOverage>> {
    check_field(
        "returns",
        validate_unique_variants(returns.iter().map(|r| r.variant_id)),
    )?;

    let mut targets = Vec::with_capacity(returns.len());
    for ret in returns {
        ret.validate()?;
        let index = lines
            .iter()
            .position(|line| line.variant_id == ret.variant_id)
            .ok_or_else(|| {
                LedgerError::NotFound(format!("Shipment line for variant {}", ret.variant_id))
            })?;
        targets.push(index);
    }

    let mut overages = Vec::new();
    for (ret, index) in returns.iter().zip(targets) {
        let line = &mut lines[index];
        line.ok_qty = ret.ok_qty;
        line.loss_qty = ret.loss_qty;
        line.missing_qty = ret.missing_qty;
        line.returned_qty = ret.returned_qty;
        if let Some(price) = ret.unit_price_override {
            line.unit_price_override = price;
        }
        if line.balance() < Decimal::ZERO {
            overages.push(BalanceOverage {
                line_id: line.id,
                variant_id: line.variant_id,
                planned_qty: line.planned_qty,
                accounted_qty: line.accounted_qty(),
            });
        }
    }
    Ok(overages)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShipmentTotals {
    pub planned_qty: Decimal,
    pub ok_qty: Decimal,
    pub balance: Decimal,
    pub payable: Decimal,
}

pub fn shipment_totals(lines: &[ShipmentLine], base_price: Decimal) -> ShipmentTotals {
    let mut totals = lines.iter().fold(ShipmentTotals::default(), |mut acc, line| {
        acc.planned_qty += line.planned_qty;
        acc.ok_qty += line.ok_qty;
        acc.balance += line.balance();
        acc.payable += line.effective_unit_price(base_price) * line.ok_qty;
        acc
    });
    totals.payable = quantize_money(totals.payable);
    totals
}

/// Effects of a finalized receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptOutcome {
    pub status: ShipmentStatus,
    pub received_at: DateTime<Utc>,
    /// Unrounded sum of `effective_price * ok` over received lines
    pub gross_payment: Decimal,
    /// Amount owed, 2 decimals; `None` when nothing is payable
    pub payment_due: Option<Decimal>,
    pub lines_received: usize,
}

impl Shipment {
    pub fn is_cancelled(&self) -> bool {
        self.status == ShipmentStatus::Cancelled
    }

    pub fn ensure_not_cancelled(&self) -> LedgerResult<()> {
        if self.is_cancelled() {
            return Err(LedgerError::InvalidState(format!(
                "Shipment {} is cancelled",
                self.number
            )));
        }
        Ok(())
    }

    /// Recompute the status from the lines; a cancelled shipment stays cancelled
    pub fn refresh_status(&mut self, lines: &[ShipmentLine]) {
        if !self.is_cancelled() {
            self.status = derive_status(self.received_at, lines);
        }
    }

    /// Cancel a shipment that is not done. Cancelling twice is a no-op.
    pub fn cancel(&mut self) -> LedgerResult<()> {
        match self.status {
            ShipmentStatus::Done => Err(LedgerError::InvalidState(format!(
                "Shipment {} is already done",
                self.number
            ))),
            _ => {
                self.status = ShipmentStatus::Cancelled;
                Ok(())
            }
        }
    }

    /// Reconcile returned pieces into stock and compute the contractor payment
    ///
    /// For every line with accepted pieces: cut shipments consume cut-phase
    /// materials, sew shipments consume sew-phase materials and credit the
    /// variant, corrections only accrue payment. Stock effects land on `book`
    /// atomically. Finalizing again applies them again.
    pub fn finalize_receipt(
        &mut self,
        lines: &[ShipmentLine],
        contractor: &Contractor,
        bom: &BomIndex,
        book: &mut StockBook,
        now: DateTime<Utc>,
    ) -> LedgerResult<ReceiptOutcome> {
        self.ensure_not_cancelled()?;
        if contractor.id != self.contractor_id {
            return Err(LedgerError::validation(
                "contractor_id",
                "Contractor does not match the shipment",
            ));
        }
        if let Some(line) = lines.iter().find(|line| line.shipment_id != self.id) {
            return Err(LedgerError::validation(
                "lines",
                format!("Line {} belongs to another shipment", line.id),
            ));
        }

        let base_price = contractor.base_price(self.phase_type);
        let phase = self.phase_type;
        let (gross_payment, lines_received) = book.transact(|book| {
            let mut total = Decimal::ZERO;
            let mut received = 0usize;

            for line in lines.iter().filter(|line| line.ok_qty > Decimal::ZERO) {
                received += 1;
                total += line.effective_unit_price(base_price) * line.ok_qty;

                if let Some(consumption_phase) = phase.consumption_phase() {
                    let context = MovementContext::new(phase.consumption_reason())
                        .with_note(format!("{} consumption, shipment {}", phase.as_str(), self.number))
                        .for_shipment(self.id, self.contractor_id);
                    for c in bom.consumption(line.variant_id, Some(consumption_phase), line.ok_qty) {
                        book.issue_material(c.material_id, c.quantity, context.clone())?;
                    }
                }

                if phase.credits_finished_goods() {
                    let context = MovementContext::new(MovementReason::SewOutput)
                        .with_note(format!("Sewn pieces, shipment {}", self.number))
                        .for_shipment(self.id, self.contractor_id);
                    book.credit_variant(line.variant_id, line.ok_qty, context)?;
                }
            }
            Ok((total, received))
        })?;

        let received_at = *self.received_at.get_or_insert(now);
        self.refresh_status(lines);

        Ok(ReceiptOutcome {
            status: self.status,
            received_at,
            gross_payment,
            payment_due: (gross_payment > Decimal::ZERO).then(|| quantize_money(gross_payment)),
            lines_received,
        })
    }
}
