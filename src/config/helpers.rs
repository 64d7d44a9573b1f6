use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Read an environment variable, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_number_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match optional_env(key)? {
        Some(raw) => parse_number(key, &raw),
        None => Ok(default),
    }
}

pub(crate) fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a valid number: {}", raw.trim(), e),
        })
}
