//! Domain models for the apparel manufacturing ledger

mod bom;
mod chain;
mod contractor;
mod material;
mod movement;
mod payment;
mod product;
mod production;
mod shipment;

pub use bom::*;
pub use chain::*;
pub use contractor::*;
pub use material::*;
pub use movement::*;
pub use payment::*;
pub use product::*;
pub use production::*;
pub use shipment::*;
