//! Raw materials and weighted-average costing

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::movement::{MovementContext, MovementDirection, NewStockMovement, StockItem};
use crate::error::{LedgerError, LedgerResult};
use crate::validation::{check_field, validate_non_negative, validate_positive_quantity};

/// Category names created by the initial seed
pub const BASIC_CATEGORIES: &[&str] = &[
    "Tecido",
    "Linha",
    "Etiqueta",
    "Botão",
    "Papel de Estampa",
    "Filme/Transfer",
    "Caixa/Embalagem",
];

/// Units a material can be stocked in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Metre,
    Unit,
    Kilogram,
    Roll,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Metre => "m",
            UnitOfMeasure::Unit => "un",
            UnitOfMeasure::Kilogram => "kg",
            UnitOfMeasure::Roll => "rolo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "m" => Some(UnitOfMeasure::Metre),
            "un" => Some(UnitOfMeasure::Unit),
            "kg" => Some(UnitOfMeasure::Kilogram),
            "rolo" => Some(UnitOfMeasure::Roll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaterialCategory {
    pub id: Uuid,
    pub name: String,
}

/// A raw material with its on-hand quantity and weighted-average cost
///
/// Quantity and cost change only through [`Material::receive`] and
/// [`Material::issue`], each of which yields the movement to record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub id: Uuid,
    pub category_id: Uuid,
    /// Category name, needed to resolve automatic BOM phases
    pub category_name: String,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub quantity_on_hand: Decimal,
    pub weighted_avg_cost: Decimal,
    pub active: bool,
}

/// Input for registering a material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub category_id: Uuid,
    pub name: String,
    pub unit: UnitOfMeasure,
}

/// Weighted-average unit cost after receiving `quantity` at `unit_cost`
///
/// Kept at full decimal precision. When the resulting quantity is not
/// positive the current cost is returned unchanged.
pub fn weighted_average_cost(
    current_qty: Decimal,
    current_cost: Decimal,
    quantity: Decimal,
    unit_cost: Decimal,
) -> Decimal {
    let new_qty = current_qty + quantity;
    if new_qty <= Decimal::ZERO {
        return current_cost;
    }
    (current_qty * current_cost + quantity * unit_cost) / new_qty
}

impl Material {
    pub fn receive(
        &mut self,
        quantity: Decimal,
        unit_cost: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        check_field("quantity", validate_positive_quantity(quantity))?;
        check_field("unit_cost", validate_non_negative(unit_cost))?;

        self.weighted_avg_cost =
            weighted_average_cost(self.quantity_on_hand, self.weighted_avg_cost, quantity, unit_cost);
        self.quantity_on_hand += quantity;

        Ok(NewStockMovement {
            item: StockItem::Material(self.id),
            direction: MovementDirection::In,
            quantity,
            unit_cost,
            context,
        })
    }

    /// Take `quantity` out of stock, valued at the current average cost
    pub fn issue(
        &mut self,
        quantity: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        check_field("quantity", validate_positive_quantity(quantity))?;

        if quantity > self.quantity_on_hand {
            return Err(LedgerError::InsufficientStock {
                material_id: self.id,
                material_name: self.name.clone(),
                requested: quantity,
                available: self.quantity_on_hand,
            });
        }
        self.quantity_on_hand -= quantity;

        Ok(NewStockMovement {
            item: StockItem::Material(self.id),
            direction: MovementDirection::Out,
            quantity,
            unit_cost: self.weighted_avg_cost,
            context,
        })
    }

    pub fn stock_value(&self) -> Decimal {
        self.quantity_on_hand * self.weighted_avg_cost
    }
}
