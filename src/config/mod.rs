//! Configuration resolution.
//!
//! Layering: built-in defaults, then the TOML settings file, then
//! environment variables (a `.env` file is loaded first when present).

mod cases;
mod database;
mod gateway;
pub(crate) mod helpers;

pub use cases::CasesConfig;
pub use database::{DatabaseBackend, DatabaseConfig, default_libsql_path};
pub use gateway::GatewayConfig;

use crate::error::ConfigError;
use crate::settings::Settings;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub cases: CasesConfig,
}

impl Config {
    /// Load `.env`, the settings file, and the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings = Settings::load()?;
        Self::resolve(&settings)
    }

    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            gateway: GatewayConfig::resolve(settings)?,
            cases: CasesConfig::resolve(settings)?,
        })
    }
}
