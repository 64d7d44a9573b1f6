//! Database abstraction layer.
//!
//! Provides a backend-agnostic `Database` trait that unifies the read paths
//! the case service needs. Implementations:
//!
//! - `postgres` (default): Uses `deadpool-postgres` + `tokio-postgres`
//! - `libsql`: Uses libSQL (Turso's SQLite fork) for embedded/edge deployment
//! - `memory`: In-process store used as the test fake for the query builder
//!   and the gateway

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "libsql")]
pub mod libsql;

#[cfg(feature = "libsql")]
pub mod libsql_migrations;

pub mod memory;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// An ordered field map for a row whose shape the caller does not constrain.
pub type EntityFields = serde_json::Map<String, serde_json::Value>;

static SQL_IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("valid regex"));

/// Create a database backend from configuration, run migrations, and return it.
pub async fn connect_from_config(
    config: &crate::config::DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    let store = open_from_config(config).await?;
    store.run_migrations().await?;
    Ok(store)
}

/// Open the configured backend without touching its schema. Used by the
/// read-only diagnostics.
pub async fn open_from_config(
    config: &crate::config::DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    match config.backend {
        #[cfg(feature = "libsql")]
        crate::config::DatabaseBackend::LibSql => {
            use secrecy::ExposeSecret as _;

            let default_path = crate::config::default_libsql_path();
            let db_path = config.libsql_path.as_deref().unwrap_or(&default_path);

            let backend = if let Some(ref url) = config.libsql_url {
                let token = config.libsql_auth_token.as_ref().ok_or_else(|| {
                    DatabaseError::Pool(
                        "LIBSQL_AUTH_TOKEN required when LIBSQL_URL is set".to_string(),
                    )
                })?;
                libsql::LibSqlBackend::new_remote_replica(db_path, url, token.expose_secret())
                    .await?
            } else {
                libsql::LibSqlBackend::new_local(db_path).await?
            };
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "postgres")]
        crate::config::DatabaseBackend::Postgres => {
            Ok(Arc::new(postgres::PgBackend::new(config).await?))
        }
        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::Pool(format!(
            "Database backend '{}' is not compiled in. Enable the '{}' feature.",
            other.as_str(),
            other.as_str()
        ))),
    }
}

/// Publication state of a compliance recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationStatus {
    Published,
    Draft,
    Archived,
}

impl RecommendationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "Published",
            Self::Draft => "Draft",
            Self::Archived => "Archived",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "Published" => Some(Self::Published),
            "Draft" => Some(Self::Draft),
            "Archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Row of the denormalized compliance recommendations source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub region: Option<String>,
    pub priority: Option<String>,
    pub risk_rating: Option<String>,
    pub parcel_ref: Option<String>,
    pub status: RecommendationStatus,
    pub published_at: DateTime<Utc>,
}

impl RecommendationRecord {
    /// Text the search index is computed over, in index order.
    pub fn searchable_fields(&self) -> [Option<&str>; 4] {
        [
            Some(self.title.as_str()),
            self.content.as_deref(),
            self.region.as_deref(),
            self.parcel_ref.as_deref(),
        ]
    }
}

/// Columns of the recommendations source a query may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationColumn {
    Id,
    Status,
    Region,
    Priority,
    RiskRating,
    ParcelRef,
    PublishedAt,
}

impl RecommendationColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Status => "status",
            Self::Region => "region",
            Self::Priority => "priority",
            Self::RiskRating => "risk_rating",
            Self::ParcelRef => "parcel_ref",
            Self::PublishedAt => "published_at",
        }
    }
}

/// One restriction in a recommendation read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact match.
    Equals {
        column: RecommendationColumn,
        value: String,
    },
    /// Case-insensitive substring match. `value` is raw user text; backends
    /// escape their own wildcard characters.
    Contains {
        column: RecommendationColumn,
        value: String,
    },
    /// Full-text match against the backend's precomputed search index.
    TextSearch { query: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: RecommendationColumn,
    pub descending: bool,
}

/// A complete read request against the recommendations source: predicates
/// (all must hold), ordering, and the page window `[offset, offset + limit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationQuery {
    pub predicates: Vec<Predicate>,
    pub order: Vec<SortKey>,
    pub offset: u64,
    pub limit: u32,
}

/// One page of rows plus the exact count of rows matching the predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSlice {
    pub rows: Vec<RecommendationRecord>,
    pub total_count: u64,
}

/// A legal matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    pub case_number: String,
    pub title: String,
    pub status: String,
    pub case_type: Option<String>,
    pub priority: Option<String>,
    pub region: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entity collections scoped to a case by `case_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelatedCollection {
    Parties,
    Tasks,
    Events,
    Documents,
    LandParcels,
}

impl RelatedCollection {
    pub const ALL: [RelatedCollection; 5] = [
        Self::Parties,
        Self::Tasks,
        Self::Events,
        Self::Documents,
        Self::LandParcels,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Parties => "case_parties",
            Self::Tasks => "case_tasks",
            Self::Events => "case_events",
            Self::Documents => "case_documents",
            Self::LandParcels => "case_land_parcels",
        }
    }

    /// Name of the CSV output unit for this collection.
    pub fn export_name(self) -> &'static str {
        match self {
            Self::Parties => "parties",
            Self::Tasks => "tasks",
            Self::Events => "events",
            Self::Documents => "documents",
            Self::LandParcels => "land-parcels",
        }
    }

    /// Key of this collection in the JSON export document.
    pub fn json_key(self) -> &'static str {
        match self {
            Self::Parties => "parties",
            Self::Tasks => "tasks",
            Self::Events => "events",
            Self::Documents => "documents",
            Self::LandParcels => "landParcels",
        }
    }

    /// Documents carry opaque payloads and stay out of the CSV export.
    pub fn included_in_csv(self) -> bool {
        !matches!(self, Self::Documents)
    }
}

/// Columns every case table must expose.
pub const REQUIRED_CASE_COLUMNS: &[&str] = &[
    "id",
    "case_number",
    "title",
    "status",
    "case_type",
    "priority",
    "region",
    "description",
    "created_at",
];

/// True for lowercase SQL identifiers that are safe to splice into a statement.
pub fn is_sql_identifier(raw: &str) -> bool {
    SQL_IDENTIFIER_RE.is_match(raw)
}

/// Build `SELECT a, b FROM cases LIMIT 1` after validating every identifier.
pub(crate) fn case_probe_sql(columns: &[&str]) -> Result<String, DatabaseError> {
    if columns.is_empty() {
        return Err(DatabaseError::Query(
            "at least one column is required".to_string(),
        ));
    }
    if let Some(bad) = columns.iter().find(|c| !is_sql_identifier(c)) {
        return Err(DatabaseError::Query(format!(
            "invalid column identifier '{}'",
            bad
        )));
    }
    Ok(format!("SELECT {} FROM cases LIMIT 1", columns.join(", ")))
}

/// Escape `%`, `_` and `\` so user text matches literally inside `LIKE ... ESCAPE '\'`.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Normalize text for the search index: lowercase ASCII alphanumerics, with
/// every other run of characters collapsed to a single space.
pub fn normalize_search_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = true;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push(' ');
            prev_sep = true;
        }
    }

    out.trim().to_string()
}

/// Terms of a free-text query. Every term must occur in the index text.
pub fn search_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in normalize_search_text(query).split_whitespace() {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Index text for a set of searchable fields, as stored by the embedded
/// backend and computed by the in-memory store.
pub fn search_index_text(fields: &[Option<&str>]) -> String {
    let joined = fields
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    normalize_search_text(&joined)
}

// ==================== Sub-traits ====================
//
// Each sub-trait groups related persistence methods. The `Database` supertrait
// combines them, so `Arc<dyn Database>` consumers keep working while leaf
// consumers can depend on a single sub-trait.

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Run one read: predicates, order, page window and exact match count.
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationSlice, DatabaseError>;
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError>;
    /// Rows of one related collection, ordered by `created_at, id`.
    async fn list_related(
        &self,
        case_id: Uuid,
        collection: RelatedCollection,
    ) -> Result<Vec<EntityFields>, DatabaseError>;
    async fn count_cases(&self) -> Result<i64, DatabaseError>;
    /// Most recently created cases first.
    async fn list_recent_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, DatabaseError>;
    /// Narrow select of the given case columns; fails when any is missing.
    async fn probe_case_columns(&self, columns: &[&str]) -> Result<(), DatabaseError>;
}

/// Backend-agnostic database supertrait.
#[async_trait]
pub trait Database: RecommendationStore + CaseStore + Send + Sync {
    /// Run schema migrations for this backend.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}
