//! In-process store.
//!
//! Implements the same predicate capability set as the SQL backends
//! (equals, case-insensitive contains, full-text terms, ranged fetch with
//! exact count) over plain vectors. Used by unit tests and the gateway
//! integration tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{
    CaseRecord, CaseStore, Database, EntityFields, Predicate, RecommendationColumn,
    RecommendationQuery, RecommendationRecord, RecommendationSlice, RecommendationStore,
    RelatedCollection, SortKey, case_probe_sql, search_index_text, search_terms,
};
use crate::error::DatabaseError;

/// Failure the store reports instead of answering, for exercising error paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// The data source rejected the request.
    Rejected(String),
    /// The data source could not be reached.
    Unavailable(String),
}

impl InjectedFailure {
    fn to_error(&self) -> DatabaseError {
        match self {
            Self::Rejected(message) => DatabaseError::Query(message.clone()),
            Self::Unavailable(message) => DatabaseError::Pool(message.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCase {
    record: CaseRecord,
    related: HashMap<RelatedCollection, Vec<EntityFields>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    recommendations: RwLock<Vec<RecommendationRecord>>,
    cases: RwLock<Vec<StoredCase>>,
    failure: RwLock<Option<InjectedFailure>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_recommendation(&self, record: RecommendationRecord) {
        if let Ok(mut rows) = self.recommendations.write() {
            rows.push(record);
        }
    }

    pub fn insert_case(&self, record: CaseRecord) {
        if let Ok(mut cases) = self.cases.write() {
            cases.push(StoredCase {
                record,
                related: HashMap::new(),
            });
        }
    }

    /// Attach a related row to a case. Returns false when the case is unknown.
    pub fn insert_related(
        &self,
        case_id: Uuid,
        collection: RelatedCollection,
        fields: EntityFields,
    ) -> bool {
        let Ok(mut cases) = self.cases.write() else {
            return false;
        };
        match cases.iter_mut().find(|c| c.record.id == case_id) {
            Some(case) => {
                case.related.entry(collection).or_default().push(fields);
                true
            }
            None => false,
        }
    }

    /// Make every subsequent call fail with `failure` (or succeed again with `None`).
    pub fn set_failure(&self, failure: Option<InjectedFailure>) {
        if let Ok(mut slot) = self.failure.write() {
            *slot = failure;
        }
    }

    fn check_failure(&self) -> Result<(), DatabaseError> {
        let slot = self
            .failure
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;
        match slot.as_ref() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn column_text(record: &RecommendationRecord, column: RecommendationColumn) -> Option<String> {
    match column {
        RecommendationColumn::Id => Some(record.id.to_string()),
        RecommendationColumn::Status => Some(record.status.as_str().to_string()),
        RecommendationColumn::Region => record.region.clone(),
        RecommendationColumn::Priority => record.priority.clone(),
        RecommendationColumn::RiskRating => record.risk_rating.clone(),
        RecommendationColumn::ParcelRef => record.parcel_ref.clone(),
        RecommendationColumn::PublishedAt => Some(record.published_at.to_rfc3339()),
    }
}

fn matches(record: &RecommendationRecord, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Equals { column, value } => {
            column_text(record, *column).is_some_and(|v| &v == value)
        }
        Predicate::Contains { column, value } => {
            let needle = value.to_ascii_lowercase();
            column_text(record, *column)
                .is_some_and(|v| v.to_ascii_lowercase().contains(&needle))
        }
        Predicate::TextSearch { query } => {
            let index = search_index_text(&record.searchable_fields());
            search_terms(query)
                .iter()
                .all(|term| index.contains(term.as_str()))
        }
    }
}

fn compare(a: &RecommendationRecord, b: &RecommendationRecord, order: &[SortKey]) -> Ordering {
    for key in order {
        let ord = match key.column {
            RecommendationColumn::PublishedAt => a.published_at.cmp(&b.published_at),
            RecommendationColumn::Id => a.id.cmp(&b.id),
            other => column_text(a, other).cmp(&column_text(b, other)),
        };
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl RecommendationStore for InMemoryStore {
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationSlice, DatabaseError> {
        self.check_failure()?;
        let rows = self
            .recommendations
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;

        let mut matching: Vec<&RecommendationRecord> = rows
            .iter()
            .filter(|r| query.predicates.iter().all(|p| matches(r, p)))
            .collect();
        matching.sort_by(|a, b| compare(a, b, &query.order));

        let total_count = matching.len() as u64;
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(RecommendationSlice {
            rows: page,
            total_count,
        })
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn get_case_by_number(
        &self,
        case_number: &str,
    ) -> Result<Option<CaseRecord>, DatabaseError> {
        self.check_failure()?;
        let cases = self
            .cases
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;
        Ok(cases
            .iter()
            .find(|c| c.record.case_number == case_number)
            .map(|c| c.record.clone()))
    }

    async fn list_related(
        &self,
        case_id: Uuid,
        collection: RelatedCollection,
    ) -> Result<Vec<EntityFields>, DatabaseError> {
        self.check_failure()?;
        let cases = self
            .cases
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;
        Ok(cases
            .iter()
            .find(|c| c.record.id == case_id)
            .and_then(|c| c.related.get(&collection).cloned())
            .unwrap_or_default())
    }

    async fn count_cases(&self) -> Result<i64, DatabaseError> {
        self.check_failure()?;
        let cases = self
            .cases
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;
        Ok(cases.len() as i64)
    }

    async fn list_recent_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, DatabaseError> {
        self.check_failure()?;
        let cases = self
            .cases
            .read()
            .map_err(|e| DatabaseError::Pool(format!("store lock poisoned: {e}")))?;
        let mut records: Vec<CaseRecord> = cases.iter().map(|c| c.record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn probe_case_columns(&self, columns: &[&str]) -> Result<(), DatabaseError> {
        self.check_failure()?;
        case_probe_sql(columns)?;
        let known = serde_json::to_value(CaseRecord {
            id: Uuid::nil(),
            case_number: String::new(),
            title: String::new(),
            status: String::new(),
            case_type: None,
            priority: None,
            region: None,
            description: None,
            created_at: chrono::DateTime::<chrono::Utc>::default(),
        })?;
        match columns.iter().find(|c| known.get(**c).is_none()) {
            Some(missing) => Err(DatabaseError::Query(format!(
                "column cases.{missing} does not exist"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Database for InMemoryStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::{InMemoryStore, InjectedFailure};
    use crate::db::{
        CaseStore, Predicate, RecommendationColumn, RecommendationQuery, RecommendationRecord,
        RecommendationStatus, RecommendationStore, SortKey,
    };
    use crate::error::DatabaseError;

    fn rec(minute: u32, region: &str, parcel: &str) -> RecommendationRecord {
        RecommendationRecord {
            id: Uuid::new_v4(),
            title: format!("Finding {minute}"),
            content: Some("Culvert maintenance overdue".to_string()),
            region: Some(region.to_string()),
            priority: Some("High".to_string()),
            risk_rating: Some("Medium".to_string()),
            parcel_ref: Some(parcel.to_string()),
            status: RecommendationStatus::Published,
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap(),
        }
    }

    fn query(predicates: Vec<Predicate>) -> RecommendationQuery {
        RecommendationQuery {
            predicates,
            order: vec![SortKey {
                column: RecommendationColumn::PublishedAt,
                descending: true,
            }],
            offset: 0,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn contains_is_case_insensitive() {
        let store = InMemoryStore::new();
        store.insert_recommendation(rec(1, "North", "APN-100-22"));
        store.insert_recommendation(rec(2, "North", "apn-300-01"));

        let slice = store
            .fetch_recommendations(&query(vec![Predicate::Contains {
                column: RecommendationColumn::ParcelRef,
                value: "APN-3".to_string(),
            }]))
            .await
            .expect("fetch");

        assert_eq!(slice.total_count, 1);
        assert_eq!(slice.rows[0].parcel_ref.as_deref(), Some("apn-300-01"));
    }

    #[tokio::test]
    async fn contains_folds_ascii_like_sqlite_lower() {
        let store = InMemoryStore::new();
        store.insert_recommendation(rec(1, "North", "ÄPN-1"));

        for (needle, expected) in [("ÄPN-1", 1), ("Äpn-1", 1), ("äpn-1", 0)] {
            let slice = store
                .fetch_recommendations(&query(vec![Predicate::Contains {
                    column: RecommendationColumn::ParcelRef,
                    value: needle.to_string(),
                }]))
                .await
                .expect("fetch");
            assert_eq!(slice.total_count, expected, "{needle}");
        }
    }

    #[tokio::test]
    async fn text_search_requires_every_term() {
        let store = InMemoryStore::new();
        store.insert_recommendation(rec(1, "North", "A"));

        let hit = store
            .fetch_recommendations(&query(vec![Predicate::TextSearch {
                query: "CULVERT overdue".to_string(),
            }]))
            .await
            .expect("fetch");
        assert_eq!(hit.total_count, 1);

        let miss = store
            .fetch_recommendations(&query(vec![Predicate::TextSearch {
                query: "culvert wetland".to_string(),
            }]))
            .await
            .expect("fetch");
        assert_eq!(miss.total_count, 0);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_database_errors() {
        let store = InMemoryStore::new();
        store.set_failure(Some(InjectedFailure::Rejected("bad predicate".to_string())));
        let err = store
            .fetch_recommendations(&query(Vec::new()))
            .await
            .expect_err("must fail");
        assert!(matches!(err, DatabaseError::Query(_)));

        store.set_failure(Some(InjectedFailure::Unavailable("down".to_string())));
        let err = store.count_cases().await.expect_err("must fail");
        assert!(matches!(err, DatabaseError::Pool(_)));

        store.set_failure(None);
        assert_eq!(store.count_cases().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn probe_reports_unknown_columns() {
        let store = InMemoryStore::new();
        store
            .probe_case_columns(&["id", "case_number", "created_at"])
            .await
            .expect("known columns");
        let err = store
            .probe_case_columns(&["id", "court"])
            .await
            .expect_err("unknown column");
        assert!(err.to_string().contains("cases.court"));
    }
}
