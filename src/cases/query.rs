//! Recommendation query builder.
//!
//! Translates optional filter criteria into a single read against the
//! recommendations source: only `Published` rows, equality/substring/full-text
//! predicates for the criteria that are present, newest first, one page, and
//! the exact number of matching rows.

use serde::{Deserialize, Serialize};

use crate::db::{
    Predicate, RecommendationColumn, RecommendationQuery, RecommendationRecord,
    RecommendationStatus, RecommendationStore, SortKey,
};
use crate::error::QueryError;

pub use crate::db::{search_index_text, search_terms};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Paging bounds applied while building a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_SIZE,
            max_limit: MAX_PAGE_SIZE,
        }
    }
}

/// Request-scoped filter criteria. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecommendationFilter {
    pub region: Option<String>,
    pub priority: Option<String>,
    pub risk_rating: Option<String>,
    pub parcel_ref: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// One page of published recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationPage {
    pub rows: Vec<RecommendationRecord>,
    pub total_count: u64,
    pub limit: u32,
    pub offset: u64,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RecommendationFilter {
    pub fn effective_limit(&self, limits: &QueryLimits) -> u32 {
        self.limit.unwrap_or(limits.default_limit)
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    /// Build the read request. Pure; the only failure is an out-of-range limit.
    pub fn build_query(&self, limits: &QueryLimits) -> Result<RecommendationQuery, QueryError> {
        let limit = self.effective_limit(limits);
        if limit == 0 || limit > limits.max_limit {
            return Err(QueryError::BadRequest(format!(
                "'limit' must be between 1 and {}",
                limits.max_limit
            )));
        }

        let mut predicates = vec![Predicate::Equals {
            column: RecommendationColumn::Status,
            value: RecommendationStatus::Published.as_str().to_string(),
        }];

        let equalities = [
            (RecommendationColumn::Region, &self.region),
            (RecommendationColumn::Priority, &self.priority),
            (RecommendationColumn::RiskRating, &self.risk_rating),
        ];
        for (column, value) in equalities {
            if let Some(value) = present(value) {
                predicates.push(Predicate::Equals {
                    column,
                    value: value.to_string(),
                });
            }
        }

        if let Some(parcel_ref) = present(&self.parcel_ref) {
            predicates.push(Predicate::Contains {
                column: RecommendationColumn::ParcelRef,
                value: parcel_ref.to_string(),
            });
        }

        if let Some(search) = present(&self.search) {
            predicates.push(Predicate::TextSearch {
                query: search.to_string(),
            });
        }

        Ok(RecommendationQuery {
            predicates,
            order: vec![
                SortKey {
                    column: RecommendationColumn::PublishedAt,
                    descending: true,
                },
                SortKey {
                    column: RecommendationColumn::Id,
                    descending: false,
                },
            ],
            offset: self.effective_offset(),
            limit,
        })
    }
}

/// Run a filtered, paginated read. Exactly one store call; no retries.
pub async fn search_recommendations(
    store: &dyn RecommendationStore,
    filter: &RecommendationFilter,
    limits: &QueryLimits,
) -> Result<RecommendationPage, QueryError> {
    let query = filter.build_query(limits)?;
    tracing::debug!(
        predicates = query.predicates.len(),
        limit = query.limit,
        offset = query.offset,
        "Querying recommendations"
    );

    let slice = store.fetch_recommendations(&query).await?;

    Ok(RecommendationPage {
        rows: slice.rows,
        total_count: slice.total_count,
        limit: query.limit,
        offset: query.offset,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::{QueryLimits, RecommendationFilter, search_recommendations};
    use crate::db::memory::{InMemoryStore, InjectedFailure};
    use crate::db::{
        Predicate, RecommendationColumn, RecommendationRecord, RecommendationStatus,
    };
    use crate::error::QueryError;

    fn status_only() -> Predicate {
        Predicate::Equals {
            column: RecommendationColumn::Status,
            value: "Published".to_string(),
        }
    }

    #[test]
    fn empty_filter_restricts_to_published_with_defaults() {
        let query = RecommendationFilter::default()
            .build_query(&QueryLimits::default())
            .expect("query");

        assert_eq!(query.predicates, vec![status_only()]);
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert_eq!(query.order[0].column, RecommendationColumn::PublishedAt);
        assert!(query.order[0].descending);
        assert_eq!(query.order[1].column, RecommendationColumn::Id);
    }

    #[test]
    fn every_present_criterion_adds_its_predicate() {
        let filter = RecommendationFilter {
            region: Some("North".to_string()),
            priority: Some("High".to_string()),
            risk_rating: Some("Severe".to_string()),
            parcel_ref: Some("apn-12".to_string()),
            search: Some("culvert repair".to_string()),
            limit: Some(10),
            offset: Some(20),
        };
        let query = filter.build_query(&QueryLimits::default()).expect("query");

        assert_eq!(
            query.predicates,
            vec![
                status_only(),
                Predicate::Equals {
                    column: RecommendationColumn::Region,
                    value: "North".to_string(),
                },
                Predicate::Equals {
                    column: RecommendationColumn::Priority,
                    value: "High".to_string(),
                },
                Predicate::Equals {
                    column: RecommendationColumn::RiskRating,
                    value: "Severe".to_string(),
                },
                Predicate::Contains {
                    column: RecommendationColumn::ParcelRef,
                    value: "apn-12".to_string(),
                },
                Predicate::TextSearch {
                    query: "culvert repair".to_string(),
                },
            ]
        );
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 20);
    }

    #[test]
    fn blank_criteria_are_ignored() {
        let filter = RecommendationFilter {
            region: Some("   ".to_string()),
            search: Some(String::new()),
            ..Default::default()
        };
        let query = filter.build_query(&QueryLimits::default()).expect("query");
        assert_eq!(query.predicates, vec![status_only()]);
    }

    #[test]
    fn limit_outside_bounds_is_a_bad_request() {
        let limits = QueryLimits {
            default_limit: 50,
            max_limit: 100,
        };
        for limit in [0, 101] {
            let filter = RecommendationFilter {
                limit: Some(limit),
                ..Default::default()
            };
            let err = filter.build_query(&limits).expect_err("must reject");
            assert_eq!(
                err,
                QueryError::BadRequest("'limit' must be between 1 and 100".to_string())
            );
        }
    }

    fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let regions = ["North", "South", "East"];
        for i in 0..30u32 {
            store.insert_recommendation(RecommendationRecord {
                id: Uuid::new_v4(),
                title: format!("Finding {i}"),
                content: Some(if i % 2 == 0 {
                    "Stormwater culvert blocked".to_string()
                } else {
                    "Fence line encroachment".to_string()
                }),
                region: Some(regions[(i % 3) as usize].to_string()),
                priority: Some(if i % 4 == 0 { "High" } else { "Low" }.to_string()),
                risk_rating: Some("Medium".to_string()),
                parcel_ref: Some(format!("APN-{:03}", i)),
                status: if i % 5 == 0 {
                    RecommendationStatus::Draft
                } else {
                    RecommendationStatus::Published
                },
                // Pairs share a timestamp so the id tie-break is exercised.
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::TimeDelta::hours(i64::from(i / 2)),
            });
        }
        store
    }

    #[tokio::test]
    async fn results_hold_every_criterion_and_count_ignores_window() {
        let store = seeded_store();
        let filter = RecommendationFilter {
            region: Some("North".to_string()),
            search: Some("culvert".to_string()),
            limit: Some(2),
            ..Default::default()
        };

        let page = search_recommendations(&store, &filter, &QueryLimits::default())
            .await
            .expect("page");

        // i in 0..30 with i % 3 == 0, i even, i % 5 != 0: 6, 12, 18, 24
        assert_eq!(page.total_count, 4);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.limit, 2);
        for row in &page.rows {
            assert_eq!(row.status, RecommendationStatus::Published);
            assert_eq!(row.region.as_deref(), Some("North"));
            assert!(row.content.as_deref().unwrap_or_default().contains("culvert"));
        }
        assert!(page.rows[0].published_at >= page.rows[1].published_at);
    }

    #[tokio::test]
    async fn consecutive_pages_are_disjoint_and_ordered() {
        let store = seeded_store();
        let limits = QueryLimits::default();
        let page = |offset| RecommendationFilter {
            limit: Some(10),
            offset: Some(offset),
            ..Default::default()
        };

        let first = search_recommendations(&store, &page(0), &limits)
            .await
            .expect("first");
        let second = search_recommendations(&store, &page(10), &limits)
            .await
            .expect("second");
        let all = search_recommendations(
            &store,
            &RecommendationFilter {
                limit: Some(20),
                ..Default::default()
            },
            &limits,
        )
        .await
        .expect("all");

        assert_eq!(first.total_count, 24);
        assert!(first.rows.iter().all(|r| !second.rows.contains(r)));
        let concatenated: Vec<_> = first.rows.iter().chain(second.rows.iter()).collect();
        let expected: Vec<_> = all.rows.iter().collect();
        assert_eq!(concatenated, expected);
    }

    #[tokio::test]
    async fn final_page_may_be_short() {
        let store = seeded_store();
        let filter = RecommendationFilter {
            limit: Some(10),
            offset: Some(20),
            ..Default::default()
        };
        let page = search_recommendations(&store, &filter, &QueryLimits::default())
            .await
            .expect("page");
        assert_eq!(page.rows.len(), 4);
        assert_eq!(page.total_count, 24);
        assert_eq!(page.offset, 20);
    }

    #[tokio::test]
    async fn parcel_filter_is_case_insensitive_substring() {
        let store = seeded_store();
        let filter = RecommendationFilter {
            parcel_ref: Some("apn-01".to_string()),
            ..Default::default()
        };
        let page = search_recommendations(&store, &filter, &QueryLimits::default())
            .await
            .expect("page");
        // APN-010 .. APN-019 minus drafts 010 and 015
        assert_eq!(page.total_count, 8);
        assert!(
            page.rows
                .iter()
                .all(|r| r.parcel_ref.as_deref().unwrap_or_default().starts_with("APN-01"))
        );
    }

    #[tokio::test]
    async fn store_failures_are_classified() {
        let store = seeded_store();
        store.set_failure(Some(InjectedFailure::Rejected(
            "invalid tsquery".to_string(),
        )));
        let err = search_recommendations(
            &store,
            &RecommendationFilter::default(),
            &QueryLimits::default(),
        )
        .await
        .expect_err("rejected");
        assert_eq!(err, QueryError::BadRequest("invalid tsquery".to_string()));

        store.set_failure(Some(InjectedFailure::Unavailable(
            "connection reset".to_string(),
        )));
        let err = search_recommendations(
            &store,
            &RecommendationFilter::default(),
            &QueryLimits::default(),
        )
        .await
        .expect_err("unavailable");
        assert!(matches!(err, QueryError::Internal(ref m) if m.contains("connection reset")));
    }
}
