//! Configuration management for the apparel ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Outsourced shipment settings
    #[serde(default)]
    pub shipments: ShipmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when RUST_LOG is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipmentConfig {
    /// Attempts at generating a unique shipment number
    pub number_attempts: u32,
}

impl Default for ShipmentConfig {
    fn default() -> Self {
        Self { number_attempts: 5 }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Self::from_sources(&environment, environment_source())
    }

    fn from_sources(environment: &str, overrides: Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("logging.filter", "apparel_ledger=info,ledger_migrate=info,sqlx=warn")?
            .set_default("logging.json", false)?
            .set_default("shipments.number_attempts", 5)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_DATABASE__URL, ...)
            .add_source(overrides)
            .build()?;

        config.try_deserialize()
    }
}

/// `LEDGER_` prefix, `__` between nested keys
fn environment_source() -> Environment {
    Environment::with_prefix("LEDGER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
