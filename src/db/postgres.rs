//! PostgreSQL backend for the Database trait.
//!
//! Recommendation reads run as one statement: a `filtered` CTE feeds both the
//! exact count and the aggregated page, so the count and the rows come from
//! the same snapshot.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use secrecy::ExposeSecret;
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::{
    CaseRecord, CaseStore, Database, EntityFields, Predicate, RecommendationQuery,
    RecommendationRecord, RecommendationSlice, RecommendationStore, RelatedCollection,
    case_probe_sql, escape_like,
};
use crate::error::DatabaseError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const RECOMMENDATION_COLUMNS: &str =
    "id, title, content, region, priority, risk_rating, parcel_ref, status, published_at";

const CASE_COLUMNS: &str =
    "id, case_number, title, status, case_type, priority, region, description, created_at";

/// PostgreSQL database backend.
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Create a new PostgreSQL backend from configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| DatabaseError::Pool("DATABASE_URL is not set".to_string()))?;
        let pg_config: tokio_postgres::Config = url
            .expose_secret()
            .parse()
            .map_err(|e: tokio_postgres::Error| DatabaseError::Pool(e.to_string()))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Fail fast on unreachable servers instead of on the first request.
        let _ = pool.get().await?;
        tracing::info!(target = %config.display_target(), "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

/// A rendered recommendation read: SQL text, its text parameters in
/// placeholder order, then the page window bound as the final two parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecommendationSql {
    pub sql: String,
    pub params: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

pub(crate) fn build_recommendation_sql(query: &RecommendationQuery) -> RecommendationSql {
    let mut clauses = Vec::with_capacity(query.predicates.len());
    let mut params = Vec::with_capacity(query.predicates.len());

    for predicate in &query.predicates {
        let idx = params.len() + 1;
        match predicate {
            Predicate::Equals { column, value } => {
                clauses.push(format!("{} = ${idx}", column.as_str()));
                params.push(value.clone());
            }
            Predicate::Contains { column, value } => {
                clauses.push(format!("{} ILIKE ${idx} ESCAPE '\\'", column.as_str()));
                params.push(format!("%{}%", escape_like(value)));
            }
            Predicate::TextSearch { query } => {
                clauses.push(format!(
                    "search_vector @@ websearch_to_tsquery('english', ${idx})"
                ));
                params.push(query.clone());
            }
        }
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let order_by = |alias: &str| {
        query
            .order
            .iter()
            .map(|key| {
                format!(
                    "{alias}{} {}",
                    key.column.as_str(),
                    if key.descending { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let order_inner = order_by("");
    let order_agg = order_by("page.");

    let limit_idx = params.len() + 1;
    let offset_idx = params.len() + 2;

    let sql = format!(
        "WITH filtered AS (\
             SELECT {RECOMMENDATION_COLUMNS} FROM compliance_recommendations{where_clause}\
         ) \
         SELECT \
             (SELECT COUNT(*) FROM filtered) AS total_count, \
             COALESCE(\
                 (SELECT json_agg(page ORDER BY {order_agg}) \
                  FROM (SELECT * FROM filtered ORDER BY {order_inner} LIMIT ${limit_idx} OFFSET ${offset_idx}) page), \
                 '[]'::json\
             ) AS rows"
    );

    RecommendationSql {
        sql,
        params,
        limit: i64::from(query.limit),
        offset: i64::try_from(query.offset).unwrap_or(i64::MAX),
    }
}

fn row_to_case_record(row: &tokio_postgres::Row) -> CaseRecord {
    CaseRecord {
        id: row.get("id"),
        case_number: row.get("case_number"),
        title: row.get("title"),
        status: row.get("status"),
        case_type: row.get("case_type"),
        priority: row.get("priority"),
        region: row.get("region"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl RecommendationStore for PgBackend {
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationSlice, DatabaseError> {
        let rendered = build_recommendation_sql(query);
        let mut params: Vec<&(dyn ToSql + Sync)> = rendered
            .params
            .iter()
            .map(|value| value as &(dyn ToSql + Sync))
            .collect();
        params.push(&rendered.limit);
        params.push(&rendered.offset);

        let conn = self.conn().await?;
        let row = conn.query_one(&rendered.sql, &params).await?;

        let total_count: i64 = row.get("total_count");
        let rows_value: serde_json::Value = row.get("rows");
        let rows: Vec<RecommendationRecord> = serde_json::from_value(rows_value)?;

        Ok(RecommendationSlice {
            rows,
            total_count: u64::try_from(total_count).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl CaseStore for PgBackend {
    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_number = $1"),
                &[&case_number],
            )
            .await?;
        Ok(row.as_ref().map(row_to_case_record))
    }

    async fn list_related(
        &self,
        case_id: Uuid,
        collection: RelatedCollection,
    ) -> Result<Vec<EntityFields>, DatabaseError> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT row_to_json(t) FROM (\
                 SELECT * FROM {} WHERE case_id = $1 ORDER BY created_at, id\
             ) t",
            collection.table_name()
        );

        let mut entities = Vec::new();
        for row in conn.query(&sql, &[&case_id]).await? {
            let value: serde_json::Value = row.get(0);
            match value {
                serde_json::Value::Object(fields) => entities.push(fields),
                other => {
                    return Err(DatabaseError::Serialization(format!(
                        "{} row is not an object: {other}",
                        collection.table_name()
                    )));
                }
            }
        }
        Ok(entities)
    }

    async fn count_cases(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn.query_one("SELECT COUNT(*) FROM cases", &[]).await?;
        Ok(row.get(0))
    }

    async fn list_recent_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                &format!("SELECT {CASE_COLUMNS} FROM cases ORDER BY created_at DESC, id ASC LIMIT $1"),
                &[&limit],
            )
            .await?;
        Ok(rows.iter().map(row_to_case_record).collect())
    }

    async fn probe_case_columns(&self, columns: &[&str]) -> Result<(), DatabaseError> {
        let sql = case_probe_sql(columns)?;
        let conn = self.conn().await?;
        conn.query(&sql, &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.conn().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applied migration"
            );
        }
        Ok(())
    }
}
