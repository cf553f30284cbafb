//! Persistence-backed services for the apparel ledger

pub mod bom;
pub mod catalog;
pub mod contractors;
mod ledger_store;
pub mod materials;
pub mod payments;
pub mod production;
pub mod shipments;

pub use bom::BomService;
pub use catalog::CatalogService;
pub use contractors::ContractorService;
pub use materials::MaterialService;
pub use payments::PaymentService;
pub use production::ProductionService;
pub use shipments::ShipmentService;
