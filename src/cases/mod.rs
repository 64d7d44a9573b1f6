//! Case-facing operations: recommendation queries, case export and the
//! post-import diagnostics.

pub mod export;
pub mod query;
pub mod verify;

pub use export::{CaseBundle, ExportFormat, ExportOptions, ExportOutput, export_case};
pub use query::{QueryLimits, RecommendationFilter, RecommendationPage, search_recommendations};
pub use verify::{ImportReport, SchemaReport, verify_import, verify_schema};

use crate::db::{CaseStore, RelatedCollection};
use crate::error::DatabaseError;

/// Fetch a case by number together with all of its related collections.
pub async fn load_case_bundle(
    store: &dyn CaseStore,
    case_number: &str,
) -> Result<CaseBundle, DatabaseError> {
    let case = store
        .get_case_by_number(case_number)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "case".to_string(),
            id: case_number.to_string(),
        })?;

    let mut related = Vec::with_capacity(RelatedCollection::ALL.len());
    for collection in RelatedCollection::ALL {
        let rows = store.list_related(case.id, collection).await?;
        related.push((collection, rows));
    }

    let bundle = CaseBundle::from_records(&case, related)?;
    tracing::debug!(
        case_number,
        parties = bundle.parties.len(),
        tasks = bundle.tasks.len(),
        events = bundle.events.len(),
        documents = bundle.documents.len(),
        land_parcels = bundle.land_parcels.len(),
        "Loaded case bundle"
    );
    Ok(bundle)
}


#[cfg(test)]
mod tests {
    use super::load_case_bundle;
    use super::test_support::seeded_case_store;
    use crate::db::memory::InjectedFailure;
    use crate::error::DatabaseError;

    #[tokio::test]
    async fn bundle_holds_case_and_collections() {
        let (store, case_id) = seeded_case_store();
        let bundle = load_case_bundle(&store, "CV-2024-001")
            .await
            .expect("bundle");

        let case = bundle.case.as_ref().expect("case");
        assert_eq!(case["id"], case_id.to_string());
        assert_eq!(case["title"], "Smith v. Jones");
        assert_eq!(bundle.parties.len(), 2);
        assert_eq!(bundle.events.len(), 1);
        assert!(bundle.tasks.is_empty());
        assert!(bundle.documents.is_empty());
        assert!(bundle.land_parcels.is_empty());
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let (store, _) = seeded_case_store();
        let err = load_case_bundle(&store, "CV-0000-000")
            .await
            .expect_err("missing");
        let DatabaseError::NotFound { entity, id } = err else {
            panic!("expected NotFound");
        };
        assert_eq!(entity, "case");
        assert_eq!(id, "CV-0000-000");
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let (store, _) = seeded_case_store();
        store.set_failure(Some(InjectedFailure::Unavailable("pool closed".to_string())));
        let err = load_case_bundle(&store, "CV-2024-001")
            .await
            .expect_err("failure");
        assert!(matches!(err, DatabaseError::Pool(_)));
    }
}
