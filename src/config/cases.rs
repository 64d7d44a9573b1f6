use std::sync::LazyLock;

use regex::Regex;

use crate::cases::query::QueryLimits;
use crate::config::helpers::{parse_number_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

const MAX_EXPORT_SOURCE_LEN: usize = 64;

static EXPORT_SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

/// Recommendation paging and case export controls.
#[derive(Debug, Clone)]
pub struct CasesConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Source system identifier stamped into JSON export metadata.
    pub export_source: String,
}

fn validate_page_sizes(default_page_size: u32, max_page_size: u32) -> Result<(), ConfigError> {
    if max_page_size == 0 {
        return Err(ConfigError::InvalidValue {
            key: "CASES_MAX_PAGE_SIZE".to_string(),
            message: "max page size must be at least 1".to_string(),
        });
    }
    if default_page_size == 0 || default_page_size > max_page_size {
        return Err(ConfigError::InvalidValue {
            key: "CASES_DEFAULT_PAGE_SIZE".to_string(),
            message: format!("default page size must be between 1 and {max_page_size}"),
        });
    }
    Ok(())
}

fn validate_export_source(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "CASES_EXPORT_SOURCE".to_string(),
            message: "export source must not be empty".to_string(),
        });
    }
    if trimmed.len() > MAX_EXPORT_SOURCE_LEN {
        return Err(ConfigError::InvalidValue {
            key: "CASES_EXPORT_SOURCE".to_string(),
            message: format!("export source must be at most {MAX_EXPORT_SOURCE_LEN} characters"),
        });
    }
    if !EXPORT_SOURCE_RE.is_match(trimmed) {
        return Err(ConfigError::InvalidValue {
            key: "CASES_EXPORT_SOURCE".to_string(),
            message: "export source may only contain letters, digits, '.', '_' and '-'"
                .to_string(),
        });
    }
    Ok(trimmed.to_string())
}

impl CasesConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let default_page_size =
            parse_number_env("CASES_DEFAULT_PAGE_SIZE", settings.cases.default_page_size)?;
        let max_page_size = parse_number_env("CASES_MAX_PAGE_SIZE", settings.cases.max_page_size)?;
        validate_page_sizes(default_page_size, max_page_size)?;

        let export_source = {
            let raw = parse_string_env("CASES_EXPORT_SOURCE", settings.cases.export_source.clone())?;
            validate_export_source(&raw)?
        };

        Ok(Self {
            default_page_size,
            max_page_size,
            export_source,
        })
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.default_page_size,
            max_limit: self.max_page_size,
        }
    }
}

impl Default for CasesConfig {
    fn default() -> Self {
        let limits = QueryLimits::default();
        Self {
            default_page_size: limits.default_limit,
            max_page_size: limits.max_limit,
            export_source: "caseledger".to_string(),
        }
    }
}
