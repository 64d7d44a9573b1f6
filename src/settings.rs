//! File-backed settings.
//!
//! Settings are the middle layer of configuration: built-in defaults, then
//! the optional TOML file, then environment variables (applied by the
//! `config` module when it resolves each section).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable pointing at an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "CASELEDGER_SETTINGS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub gateway: GatewaySettings,
    pub cases: CasesSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: String,
    pub url: Option<String>,
    pub pool_size: usize,
    pub libsql_path: Option<String>,
    pub libsql_url: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: "postgres".to_string(),
            url: None,
            pool_size: 10,
            libsql_path: None,
            libsql_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasesSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub export_source: String,
}

impl Default for CasesSettings {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            export_source: "caseledger".to_string(),
        }
    }
}

impl Settings {
    /// Default location: `~/.caseledger/settings.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".caseledger")
            .join("settings.toml")
    }

    /// Parse a settings file. Unknown keys are ignored, missing keys default.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            ConfigError::ParseError(format!("invalid settings file {}: {}", path.display(), e))
        })
    }

    /// Load the settings file named by `CASELEDGER_SETTINGS`, falling back to
    /// the default path. A missing default file yields built-in defaults; a
    /// missing explicit file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(SETTINGS_PATH_ENV) {
            Ok(explicit) if !explicit.trim().is_empty() => {
                Self::load_from(Path::new(explicit.trim()))
            }
            _ => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
