//! Apparel Ledger - database bootstrap
//!
//! Applies the schema migrations and seeds the basic material categories.

use std::{sync::Arc, time::Duration};

use apparel_ledger::{init_tracing, services::MaterialService, Config};
use shared::SystemClock;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    init_tracing(&config.logging);
    tracing::info!("Environment: {}", config.environment);

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Migrations completed");

    let materials = MaterialService::new(db_pool.clone(), Arc::new(SystemClock));
    let created = materials.seed_basic_categories().await?;
    tracing::info!(created, "Basic material categories seeded");

    db_pool.close().await;
    Ok(())
}
