//! Error types for caseledger.

use axum::http::StatusCode;

/// Configuration resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence failures, shared by every backend.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DatabaseError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Errors the server reported (syntax, bad input, permission) carry a
        // DbError; everything else is a transport/connection failure.
        match err.as_db_error() {
            Some(db) => DatabaseError::Query(db.message().to_string()),
            None => DatabaseError::Pool(err.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

#[cfg(feature = "libsql")]
impl From<libsql::Error> for DatabaseError {
    fn from(err: libsql::Error) -> Self {
        match err {
            libsql::Error::SqliteFailure(_, message) => DatabaseError::Query(message),
            other => DatabaseError::Pool(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

/// Failures surfaced by the recommendation query endpoint.
///
/// `BadRequest` covers filter-level problems: paging values out of range and
/// predicates the data source rejected. `Internal` covers everything the
/// caller cannot fix by changing the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl QueryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatabaseError> for QueryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Query(message) => QueryError::BadRequest(message),
            other => QueryError::Internal(other.to_string()),
        }
    }
}

/// Case export formatting failures.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("case record is missing")]
    MissingCase,

    #[error("case record is missing required field '{field}'")]
    MissingCaseField { field: String },

    #[error("{collection} entry {index} is not an object")]
    InvalidEntity { collection: String, index: usize },

    #[error("failed to write CSV: {0}")]
    Csv(String),

    #[error("failed to serialize JSON: {0}")]
    Json(String),
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err.to_string())
    }
}

/// HTTP gateway lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },
}
