use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::{optional_env, parse_number_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Which persistence backend serves the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    LibSql,
}

impl DatabaseBackend {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "libsql" | "sqlite" | "turso" => Ok(Self::LibSql),
            other => Err(ConfigError::InvalidValue {
                key: "DATABASE_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::LibSql => "libsql",
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub pool_size: usize,
    pub libsql_path: Option<PathBuf>,
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<SecretString>,
}

/// Default embedded database location: `~/.caseledger/caseledger.db`.
pub fn default_libsql_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".caseledger")
        .join("caseledger.db")
}

impl DatabaseConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = DatabaseBackend::from_str(&parse_string_env(
            "DATABASE_BACKEND",
            settings.database.backend.clone(),
        )?)?;

        let url = optional_env("DATABASE_URL")?
            .or_else(|| settings.database.url.clone())
            .map(SecretString::from);
        if backend == DatabaseBackend::Postgres && url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "DATABASE_URL".to_string(),
                hint: "Set DATABASE_URL or choose DATABASE_BACKEND=libsql.".to_string(),
            });
        }

        let pool_size = parse_number_env("DATABASE_POOL_SIZE", settings.database.pool_size)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".to_string(),
                message: "pool size must be at least 1".to_string(),
            });
        }

        let libsql_url = optional_env("LIBSQL_URL")?.or_else(|| settings.database.libsql_url.clone());
        let libsql_auth_token = optional_env("LIBSQL_AUTH_TOKEN")?.map(SecretString::from);
        if libsql_url.is_some() && libsql_auth_token.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "LIBSQL_AUTH_TOKEN".to_string(),
                hint: "A remote replica needs an auth token.".to_string(),
            });
        }

        Ok(Self {
            backend,
            url,
            pool_size,
            libsql_path: optional_env("LIBSQL_PATH")?
                .or_else(|| settings.database.libsql_path.clone())
                .map(PathBuf::from),
            libsql_url,
            libsql_auth_token,
        })
    }

    /// Connection target safe for logs: credentials and query removed.
    pub fn display_target(&self) -> String {
        match self.backend {
            DatabaseBackend::Postgres => self
                .url
                .as_ref()
                .map(|url| redact_url(url.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
            DatabaseBackend::LibSql => match &self.libsql_url {
                Some(url) => redact_url(url),
                None => self
                    .libsql_path
                    .clone()
                    .unwrap_or_else(default_libsql_path)
                    .display()
                    .to_string(),
            },
        }
    }
}

fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
