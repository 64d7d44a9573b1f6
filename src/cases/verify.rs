//! Read-only diagnostics run after schema setup and data import.

use serde::Serialize;

use crate::db::{CaseRecord, CaseStore, REQUIRED_CASE_COLUMNS};
use crate::error::DatabaseError;

pub const DEFAULT_IMPORT_SAMPLE: usize = 10;

/// Outcome of checking that the case table exposes every required column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub ok: bool,
    pub checked_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub error: Option<String>,
}

/// Row count and most recent cases after an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub total_cases: i64,
    pub recent: Vec<CaseRecord>,
}

/// Probe the required case columns with one narrow select. When it fails,
/// probe each column alone to name the missing ones.
pub async fn verify_schema(store: &dyn CaseStore) -> SchemaReport {
    let checked_columns: Vec<String> = REQUIRED_CASE_COLUMNS.iter().map(|c| c.to_string()).collect();

    let err = match store.probe_case_columns(REQUIRED_CASE_COLUMNS).await {
        Ok(()) => {
            tracing::info!(columns = checked_columns.len(), "Case schema verified");
            return SchemaReport {
                ok: true,
                checked_columns,
                missing_columns: Vec::new(),
                error: None,
            };
        }
        Err(err) => err,
    };

    let mut missing_columns = Vec::new();
    for column in REQUIRED_CASE_COLUMNS {
        match store.probe_case_columns(&[*column]).await {
            Ok(()) => {}
            Err(DatabaseError::Query(_)) => missing_columns.push(column.to_string()),
            // Connectivity failures say nothing about individual columns.
            Err(_) => break,
        }
    }

    tracing::warn!(
        missing = ?missing_columns,
        error = %err,
        "Case schema verification failed"
    );
    SchemaReport {
        ok: false,
        checked_columns,
        missing_columns,
        error: Some(err.to_string()),
    }
}

pub async fn verify_import(
    store: &dyn CaseStore,
    sample: usize,
) -> Result<ImportReport, DatabaseError> {
    let total_cases = store.count_cases().await?;
    let recent = store.list_recent_cases(sample).await?;
    tracing::info!(total_cases, sampled = recent.len(), "Import verification complete");
    Ok(ImportReport {
        total_cases,
        recent,
    })
}
