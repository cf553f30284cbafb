//! Shared domain types for the apparel material and outsourced-production ledger
//!
//! Everything here is pure and synchronous: weighted-average material
//! costing, bills of materials, production orders, outsourced shipments,
//! contractor payments and shipment chaining. The backend crate persists
//! these types and runs them inside database transactions.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;

pub use clock::*;
pub use error::*;
pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
