use async_trait::async_trait;

use crate::db::{
    Predicate, RecommendationQuery, RecommendationRecord, RecommendationSlice,
    RecommendationStatus, RecommendationStore, escape_like, search_terms,
};
use crate::error::DatabaseError;

use super::{LibSqlBackend, get_i64, get_opt_text, get_text, parse_timestamp, parse_uuid};

const RECOMMENDATION_COLUMNS: &str =
    "id, title, content, region, priority, risk_rating, parcel_ref, status, published_at";

/// A rendered recommendation read: shared `WHERE` clause and its parameters,
/// used by both the count and the page statements.
#[derive(Debug, Clone)]
pub(crate) struct RecommendationSql {
    pub count_sql: String,
    pub page_sql: String,
    pub params: Vec<libsql::Value>,
    pub limit: i64,
    pub offset: i64,
}

pub(crate) fn build_recommendation_sql(query: &RecommendationQuery) -> RecommendationSql {
    let mut clauses = Vec::new();
    let mut params: Vec<libsql::Value> = Vec::new();

    for predicate in &query.predicates {
        match predicate {
            Predicate::Equals { column, value } => {
                params.push(libsql::Value::Text(value.clone()));
                clauses.push(format!("{} = ?{}", column.as_str(), params.len()));
            }
            Predicate::Contains { column, value } => {
                // SQLite's lower() folds ASCII only; fold the needle the same way.
                params.push(libsql::Value::Text(format!(
                    "%{}%",
                    escape_like(&value.to_ascii_lowercase())
                )));
                clauses.push(format!(
                    "lower({}) LIKE ?{} ESCAPE '\\'",
                    column.as_str(),
                    params.len()
                ));
            }
            Predicate::TextSearch { query } => {
                let terms = search_terms(query);
                if terms.is_empty() {
                    // Nothing searchable (punctuation only): matches nothing,
                    // like an empty tsquery.
                    clauses.push("0".to_string());
                }
                for term in terms {
                    params.push(libsql::Value::Text(format!("%{term}%")));
                    clauses.push(format!("search_text LIKE ?{}", params.len()));
                }
            }
        }
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let order_by = query
        .order
        .iter()
        .map(|key| {
            format!(
                "{} {}",
                key.column.as_str(),
                if key.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let limit_idx = params.len() + 1;
    let offset_idx = params.len() + 2;

    RecommendationSql {
        count_sql: format!("SELECT COUNT(*) FROM compliance_recommendations{where_clause}"),
        page_sql: format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM compliance_recommendations{where_clause} \
             ORDER BY {order_by} LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        ),
        params,
        limit: i64::from(query.limit),
        offset: i64::try_from(query.offset).unwrap_or(i64::MAX),
    }
}

fn row_to_recommendation(row: &libsql::Row) -> Result<RecommendationRecord, DatabaseError> {
    let status_raw = get_text(row, 7);
    let status = RecommendationStatus::from_db_value(&status_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid recommendation status '{}'", status_raw))
    })?;
    Ok(RecommendationRecord {
        id: parse_uuid(&get_text(row, 0), "recommendation.id")?,
        title: get_text(row, 1),
        content: get_opt_text(row, 2),
        region: get_opt_text(row, 3),
        priority: get_opt_text(row, 4),
        risk_rating: get_opt_text(row, 5),
        parcel_ref: get_opt_text(row, 6),
        status,
        published_at: parse_timestamp(&get_text(row, 8))?,
    })
}

#[async_trait]
impl RecommendationStore for LibSqlBackend {
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationSlice, DatabaseError> {
        let rendered = build_recommendation_sql(query);
        let conn = self.connect().await?;

        // Count and page in one read transaction so both see the same rows.
        let tx = conn.transaction().await?;

        let mut count_rows = tx
            .query(
                &rendered.count_sql,
                libsql::params_from_iter(rendered.params.clone()),
            )
            .await?;
        let total_count = match count_rows.next().await? {
            Some(row) => get_i64(&row, 0),
            None => 0,
        };

        let mut page_params = rendered.params.clone();
        page_params.push(libsql::Value::Integer(rendered.limit));
        page_params.push(libsql::Value::Integer(rendered.offset));
        let mut rows = tx
            .query(&rendered.page_sql, libsql::params_from_iter(page_params))
            .await?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_recommendation(&row)?);
        }
        tx.commit().await?;

        Ok(RecommendationSlice {
            rows: out,
            total_count: u64::try_from(total_count).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::build_recommendation_sql;
    use crate::db::libsql::test_support::{backend, insert_recommendation};
    use crate::db::{
        Predicate, RecommendationColumn, RecommendationQuery, RecommendationStore, SortKey,
    };

    fn query(predicates: Vec<Predicate>, offset: u64, limit: u32) -> RecommendationQuery {
        RecommendationQuery {
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
            offset,
            limit,
        }
    }

    fn texts(params: &[libsql::Value]) -> Vec<&str> {
        params
            .iter()
            .map(|value| match value {
                libsql::Value::Text(text) => text.as_str(),
                other => panic!("expected text param, got {other:?}"),
            })
            .collect()
    }

    fn published() -> Predicate {
        Predicate::Equals {
            column: RecommendationColumn::Status,
            value: "Published".to_string(),
        }
    }

    #[test]
    fn text_search_adds_one_clause_per_term() {
        let rendered = build_recommendation_sql(&query(
            vec![
                published(),
                Predicate::TextSearch {
                    query: "Flood, ZONE".to_string(),
                },
            ],
            0,
            10,
        ));
        assert!(rendered.count_sql.ends_with(
            "WHERE status = ?1 AND search_text LIKE ?2 AND search_text LIKE ?3"
        ));
        assert!(rendered.page_sql.contains("LIMIT ?4 OFFSET ?5"));
        assert_eq!(texts(&rendered.params), vec!["Published", "%flood%", "%zone%"]);
    }

    #[test]
    fn contains_lowercases_and_escapes() {
        let rendered = build_recommendation_sql(&query(
            vec![Predicate::Contains {
                column: RecommendationColumn::ParcelRef,
                value: "APN_7".to_string(),
            }],
            0,
            10,
        ));
        assert!(rendered.count_sql.contains("lower(parcel_ref) LIKE ?1 ESCAPE '\\'"));
        assert_eq!(texts(&rendered.params), vec!["%apn\\_7%"]);
    }

    #[tokio::test]
    async fn fetch_filters_orders_and_counts() {
        let (backend, _dir) = backend().await;
        insert_recommendation(
            &backend,
            "Culvert inspection",
            "Blocked stormwater culvert",
            "North",
            "APN-100",
            "Published",
            "2024-02-01T00:00:00Z",
        )
        .await;
        insert_recommendation(
            &backend,
            "Fence survey",
            "Boundary fence encroaches on easement",
            "North",
            "APN-200",
            "Published",
            "2024-03-01T00:00:00Z",
        )
        .await;
        insert_recommendation(
            &backend,
            "Culvert draft",
            "Culvert notes",
            "North",
            "APN-300",
            "Draft",
            "2024-04-01T00:00:00Z",
        )
        .await;

        let all = backend
            .fetch_recommendations(&query(vec![published()], 0, 10))
            .await
            .expect("fetch all");
        assert_eq!(all.total_count, 2);
        assert_eq!(all.rows[0].title, "Fence survey");
        assert_eq!(all.rows[1].title, "Culvert inspection");

        let culvert = backend
            .fetch_recommendations(&query(
                vec![
                    published(),
                    Predicate::TextSearch {
                        query: "CULVERT".to_string(),
                    },
                ],
                0,
                10,
            ))
            .await
            .expect("search");
        assert_eq!(culvert.total_count, 1);
        assert_eq!(culvert.rows[0].parcel_ref.as_deref(), Some("APN-100"));

        let windowed = backend
            .fetch_recommendations(&query(vec![published()], 1, 1))
            .await
            .expect("window");
        assert_eq!(windowed.total_count, 2);
        assert_eq!(windowed.rows.len(), 1);
        assert_eq!(windowed.rows[0].title, "Culvert inspection");
    }

    #[tokio::test]
    async fn parcel_filter_treats_wildcards_literally() {
        let (backend, _dir) = backend().await;
        insert_recommendation(
            &backend,
            "A",
            "x",
            "South",
            "LOT_9",
            "Published",
            "2024-01-01T00:00:00Z",
        )
        .await;
        insert_recommendation(
            &backend,
            "B",
            "x",
            "South",
            "LOTX9",
            "Published",
            "2024-01-02T00:00:00Z",
        )
        .await;

        let slice = backend
            .fetch_recommendations(&query(
                vec![Predicate::Contains {
                    column: RecommendationColumn::ParcelRef,
                    value: "lot_9".to_string(),
                }],
                0,
                10,
            ))
            .await
            .expect("fetch");
        assert_eq!(slice.total_count, 1);
        assert_eq!(slice.rows[0].parcel_ref.as_deref(), Some("LOT_9"));
    }

    #[tokio::test]
    async fn parcel_filter_matches_non_ascii_references() {
        let (backend, _dir) = backend().await;
        insert_recommendation(
            &backend,
            "Umlaut parcel",
            "x",
            "North",
            "ÄPN-1",
            "Published",
            "2024-01-01T00:00:00Z",
        )
        .await;

        for needle in ["ÄPN-1", "Äpn-1", "Ä"] {
            let slice = backend
                .fetch_recommendations(&query(
                    vec![Predicate::Contains {
                        column: RecommendationColumn::ParcelRef,
                        value: needle.to_string(),
                    }],
                    0,
                    10,
                ))
                .await
                .expect("fetch");
            assert_eq!(slice.total_count, 1, "{needle}");
            assert_eq!(slice.rows[0].parcel_ref.as_deref(), Some("ÄPN-1"));
        }
    }

    #[test]
    fn contains_folds_only_ascii() {
        let rendered = build_recommendation_sql(&query(
            vec![Predicate::Contains {
                column: RecommendationColumn::ParcelRef,
                value: "ÄPN-1".to_string(),
            }],
            0,
            10,
        ));
        assert_eq!(texts(&rendered.params), vec!["%Äpn-1%"]);
    }
}
