use async_trait::async_trait;
use libsql::params;
use uuid::Uuid;

use crate::db::{CaseRecord, CaseStore, EntityFields, RelatedCollection, case_probe_sql};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, get_i64, get_opt_text, get_text, parse_timestamp, parse_uuid, rows_to_entities,
};

const CASE_COLUMNS: &str =
    "id, case_number, title, status, case_type, priority, region, description, created_at";

fn row_to_case_record(row: &libsql::Row) -> Result<CaseRecord, DatabaseError> {
    Ok(CaseRecord {
        id: parse_uuid(&get_text(row, 0), "case.id")?,
        case_number: get_text(row, 1),
        title: get_text(row, 2),
        status: get_text(row, 3),
        case_type: get_opt_text(row, 4),
        priority: get_opt_text(row, 5),
        region: get_opt_text(row, 6),
        description: get_opt_text(row, 7),
        created_at: parse_timestamp(&get_text(row, 8))?,
    })
}

#[async_trait]
impl CaseStore for LibSqlBackend {
    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_number = ?1 LIMIT 1"),
                params![case_number],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_case_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_related(
        &self,
        case_id: Uuid,
        collection: RelatedCollection,
    ) -> Result<Vec<EntityFields>, DatabaseError> {
        let conn = self.connect().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT * FROM {} WHERE case_id = ?1 ORDER BY created_at, id",
                    collection.table_name()
                ),
                params![case_id.to_string()],
            )
            .await?;
        rows_to_entities(rows).await
    }

    async fn count_cases(&self) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM cases", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(get_i64(&row, 0)),
            None => Ok(0),
        }
    }

    async fn list_recent_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CASE_COLUMNS} FROM cases ORDER BY created_at DESC, id ASC LIMIT ?1"
                ),
                params![limit],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_case_record(&row)?);
        }
        Ok(out)
    }

    async fn probe_case_columns(&self, columns: &[&str]) -> Result<(), DatabaseError> {
        let sql = case_probe_sql(columns)?;
        let conn = self.connect().await?;
        conn.query(&sql, ()).await?;
        Ok(())
    }
}
