//! Apparel Ledger - Backend
//!
//! Material stock, in-house production and outsourced cut/sew rounds for a
//! small apparel workshop, persisted in PostgreSQL.

use std::sync::Arc;

use shared::{Clock, SystemClock};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod error;
pub mod services;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::{
    BomService, CatalogService, ContractorService, MaterialService, PaymentService,
    ProductionService, ShipmentService,
};

/// Services sharing one pool and one clock
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub materials: MaterialService,
    pub catalog: CatalogService,
    pub bom: BomService,
    pub production: ProductionService,
    pub contractors: ContractorService,
    pub shipments: ShipmentService,
    pub payments: PaymentService,
}

impl AppState {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            materials: MaterialService::new(db.clone(), clock.clone()),
            catalog: CatalogService::new(db.clone()),
            bom: BomService::new(db.clone()),
            production: ProductionService::new(db.clone(), clock.clone()),
            contractors: ContractorService::new(db.clone()),
            shipments: ShipmentService::new(
                db.clone(),
                clock.clone(),
                config.shipments.number_attempts,
            ),
            payments: PaymentService::new(db.clone(), clock),
            db,
        }
    }

    /// State backed by the wall clock
    pub fn with_system_clock(db: PgPool, config: &Config) -> Self {
        Self::new(db, Arc::new(SystemClock), config)
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured filter.
pub fn init_tracing(logging: &config::LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
