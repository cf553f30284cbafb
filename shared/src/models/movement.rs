//! Immutable stock movement journal entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementDirection::In),
            "out" => Some(MovementDirection::Out),
            _ => None,
        }
    }
}

/// Why a movement was recorded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Purchase or other inbound material entry
    Receipt,
    ManualIssue,
    ProductionConsumption,
    ProductionOutput,
    CutConsumption,
    SewConsumption,
    /// Finished pieces returned by a sewing contractor
    SewOutput,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Receipt => "receipt",
            MovementReason::ManualIssue => "manual_issue",
            MovementReason::ProductionConsumption => "production_consumption",
            MovementReason::ProductionOutput => "production_output",
            MovementReason::CutConsumption => "cut_consumption",
            MovementReason::SewConsumption => "sew_consumption",
            MovementReason::SewOutput => "sew_output",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementReason::Receipt),
            "manual_issue" => Some(MovementReason::ManualIssue),
            "production_consumption" => Some(MovementReason::ProductionConsumption),
            "production_output" => Some(MovementReason::ProductionOutput),
            "cut_consumption" => Some(MovementReason::CutConsumption),
            "sew_consumption" => Some(MovementReason::SewConsumption),
            "sew_output" => Some(MovementReason::SewOutput),
            _ => None,
        }
    }
}

/// The stock-carrying row a movement applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockItem {
    Material(Uuid),
    Variant(Uuid),
}

impl StockItem {
    pub fn material_id(&self) -> Option<Uuid> {
        match self {
            StockItem::Material(id) => Some(*id),
            StockItem::Variant(_) => None,
        }
    }

    pub fn variant_id(&self) -> Option<Uuid> {
        match self {
            StockItem::Variant(id) => Some(*id),
            StockItem::Material(_) => None,
        }
    }
}

/// Traceability attached to a movement by the operation that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementContext {
    pub reason: MovementReason,
    pub note: Option<String>,
    pub shipment_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub production_order_id: Option<Uuid>,
}

impl MovementContext {
    pub fn new(reason: MovementReason) -> Self {
        Self {
            reason,
            note: None,
            shipment_id: None,
            contractor_id: None,
            production_order_id: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn for_shipment(mut self, shipment_id: Uuid, contractor_id: Uuid) -> Self {
        self.shipment_id = Some(shipment_id);
        self.contractor_id = Some(contractor_id);
        self
    }

    pub fn for_production_order(mut self, order_id: Uuid) -> Self {
        self.production_order_id = Some(order_id);
        self
    }
}

/// A movement produced by a ledger operation, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub item: StockItem,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub context: MovementContext,
}

impl NewStockMovement {
    /// Quantity valued at the movement's unit cost
    pub fn value(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// A persisted movement. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub item: StockItem,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reason: MovementReason,
    pub note: Option<String>,
    pub shipment_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub production_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing the movement journal; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub material_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub production_order_id: Option<Uuid>,
    pub limit: Option<i64>,
}
