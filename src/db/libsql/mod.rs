//! libSQL/Turso backend for the Database trait.
//!
//! Supports a local file database and an embedded replica synced from a
//! remote Turso database. Each operation opens a fresh connection from the
//! shared `libsql::Database` handle.

mod cases;
mod recommendations;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase};

use crate::db::{Database, EntityFields};
use crate::error::DatabaseError;

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL database: {e}")))?;
        tracing::info!(path = %path.display(), "Opened libSQL database");

        Ok(Self { db: Arc::new(db) })
    }

    /// Open an embedded replica of a remote database and sync it once.
    pub async fn new_remote_replica(
        path: &Path,
        url: &str,
        auth_token: &str,
    ) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = libsql::Builder::new_remote_replica(path, url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL replica: {e}")))?;
        db.sync()
            .await
            .map_err(|e| DatabaseError::Pool(format!("initial replica sync failed: {e}")))?;
        tracing::info!(path = %path.display(), url, "Opened libSQL embedded replica");

        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) async fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("failed to connect to libSQL: {e}")))
    }
}

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(libsql::Value::Text(text)) => Some(text),
        _ => None,
    }
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or_default()
}

/// Parse an RFC 3339 timestamp, or SQLite's `datetime('now')` format as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(DatabaseError::Serialization(format!(
        "invalid timestamp '{}'",
        raw
    )))
}

pub(crate) fn parse_uuid(raw: &str, field: &str) -> Result<uuid::Uuid, DatabaseError> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("invalid {} uuid: {}", field, e)))
}

/// Convert a cell into a JSON value. Blobs are base64-encoded; non-finite
/// reals become null.
pub(crate) fn value_to_json(value: libsql::Value) -> serde_json::Value {
    match value {
        libsql::Value::Null => serde_json::Value::Null,
        libsql::Value::Integer(n) => serde_json::Value::from(n),
        libsql::Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        libsql::Value::Text(text) => serde_json::Value::String(text),
        libsql::Value::Blob(bytes) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

/// Drain a result set into field maps keyed by column name, in column order.
pub(crate) async fn rows_to_entities(
    mut rows: libsql::Rows,
) -> Result<Vec<EntityFields>, DatabaseError> {
    let names: Vec<String> = (0..rows.column_count())
        .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
        .collect();

    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut fields = EntityFields::new();
        for (idx, name) in names.iter().enumerate() {
            let value = row.get_value(idx as i32)?;
            fields.insert(name.clone(), value_to_json(value));
        }
        out.push(fields);
    }
    Ok(out)
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute_batch(super::libsql_migrations::SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(format!("libSQL schema setup failed: {e}")))?;
        tracing::debug!("libSQL schema is up to date");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use libsql::params;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::LibSqlBackend;
    use crate::db::Database;

    /// Migrated backend on a temp file. Keep the `TempDir` alive for the test.
    pub(crate) async fn backend() -> (LibSqlBackend, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LibSqlBackend::new_local(&dir.path().join("cases.db"))
            .await
            .expect("open libsql");
        backend.run_migrations().await.expect("migrations");
        (backend, dir)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn insert_recommendation(
        backend: &LibSqlBackend,
        title: &str,
        content: &str,
        region: &str,
        parcel_ref: &str,
        status: &str,
        published_at: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let conn = backend.connect().await.expect("connect");
        conn.execute(
            "INSERT INTO compliance_recommendations \
             (id, title, content, region, priority, risk_rating, parcel_ref, status, published_at) \
             VALUES (?1, ?2, ?3, ?4, 'High', 'Medium', ?5, ?6, ?7)",
            params![
                id.to_string(),
                title,
                content,
                region,
                parcel_ref,
                status,
                published_at
            ],
        )
        .await
        .expect("insert recommendation");
        id
    }
}
