//! In-house production orders

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bom::BomIndex;
use super::movement::{MovementContext, MovementReason};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::StockBook;
use crate::types::quantize_unit_cost;
use crate::validation::{check_field, validate_non_negative, validate_production_quantity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub quantity: Decimal,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a production order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductionOrder {
    pub variant_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub labor_cost: Decimal,
    #[serde(default)]
    pub overhead_cost: Decimal,
    pub notes: Option<String>,
}

impl NewProductionOrder {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field("quantity", validate_production_quantity(self.quantity))?;
        check_field("labor_cost", validate_non_negative(self.labor_cost))?;
        check_field("overhead_cost", validate_non_negative(self.overhead_cost))
    }
}

/// Result of processing an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOutcome {
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity_produced: Decimal,
    /// Sum of issued quantities valued at their weighted-average cost
    pub material_cost_total: Decimal,
    pub unit_cost: Decimal,
}

/// `(materials + labor + overhead) / quantity`, 4 decimals
pub fn production_unit_cost(
    material_cost: Decimal,
    labor_cost: Decimal,
    overhead_cost: Decimal,
    quantity: Decimal,
) -> LedgerResult<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation(
            "quantity",
            "Quantity must be greater than zero",
        ));
    }
    Ok(quantize_unit_cost(
        (material_cost + labor_cost + overhead_cost) / quantity,
    ))
}

impl ProductionOrder {
    /// Consume the variant's full BOM and credit the produced pieces
    ///
    /// All issues and the credit happen together or not at all. Processing
    /// the same order again consumes materials again.
    pub fn process(&self, bom: &BomIndex, book: &mut StockBook) -> LedgerResult<ProductionOutcome> {
        book.transact(|book| {
            let note = format!("Production order {}", self.id);
            let mut material_cost_total = Decimal::ZERO;

            for consumption in bom.consumption(self.variant_id, None, self.quantity) {
                let context = MovementContext::new(MovementReason::ProductionConsumption)
                    .with_note(note.clone())
                    .for_production_order(self.id);
                let movement =
                    book.issue_material(consumption.material_id, consumption.quantity, context)?;
                material_cost_total += movement.value();
            }

            let unit_cost = production_unit_cost(
                material_cost_total,
                self.labor_cost,
                self.overhead_cost,
                self.quantity,
            )?;
            let context = MovementContext::new(MovementReason::ProductionOutput)
                .with_note(note)
                .for_production_order(self.id);
            book.record_production(self.variant_id, self.quantity, unit_cost, context)?;

            Ok(ProductionOutcome {
                order_id: self.id,
                variant_id: self.variant_id,
                quantity_produced: self.quantity,
                material_cost_total,
                unit_cost,
            })
        })
    }
}
