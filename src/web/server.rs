//! Axum HTTP server for the recommendation query and case export APIs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::cases::export::{CASE_INFO_TABLE, ExportFile, ExportOptions, ExportOutput};
use crate::cases::{ExportFormat, RecommendationFilter, export_case, load_case_bundle};
use crate::config::CasesConfig;
use crate::db::{Database, RelatedCollection};
use crate::error::{DatabaseError, GatewayError};

use super::types::{
    ApiError, ExportManifestResponse, ExportQuery, HealthResponse, RecommendationsQuery,
    RecommendationsResponse,
};

/// Shared state for all handlers.
pub struct GatewayState {
    /// Case and recommendation store.
    pub store: Arc<dyn Database>,
    /// Paging bounds and export metadata.
    pub cases: CasesConfig,
    /// Shutdown signal sender.
    pub shutdown_tx: tokio::sync::RwLock<Option<oneshot::Sender<()>>>,
    /// Server startup time for uptime calculation.
    pub startup_time: Instant,
}

impl GatewayState {
    pub fn new(store: Arc<dyn Database>, cases: CasesConfig) -> Self {
        Self {
            store,
            cases,
            shutdown_tx: tokio::sync::RwLock::new(None),
            startup_time: Instant::now(),
        }
    }

    /// Signal the server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

/// Build the router with every route and layer, bound to `state`.
pub fn router(addr: SocketAddr, state: Arc<GatewayState>) -> Router {
    let api = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/recommendations", get(recommendations_handler))
        .route(
            "/api/cases/{case_number}/export",
            get(case_export_handler),
        );

    // Only same-host origins; the API carries no credentials of its own.
    let cors = CorsLayer::new()
        .allow_origin([
            format!("http://{}:{}", addr.ip(), addr.port())
                .parse()
                .expect("valid origin"),
            format!("http://localhost:{}", addr.port())
                .parse()
                .expect("valid origin"),
        ])
        .allow_methods([axum::http::Method::GET])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]));

    api.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                header::HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                header::HeaderValue::from_static("nosniff"),
            ))
            .layer(cors),
    )
    .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
) -> Result<SocketAddr, GatewayError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::StartupFailed {
                name: "gateway".to_string(),
                reason: format!("Failed to bind to {}: {}", addr, e),
            })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::StartupFailed {
            name: "gateway".to_string(),
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let app = router(bound_addr, state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Web gateway shutting down");
            })
            .await
        {
            tracing::error!("Web gateway server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Web gateway listening");
    Ok(bound_addr)
}

// --- Health ---

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_secs: state.startup_time.elapsed().as_secs(),
    })
}

// --- Recommendations ---

fn parse_paging(key: &str, raw: Option<&str>) -> Result<Option<u64>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
            if value.bytes().all(|b| b.is_ascii_digit()) {
                ApiError::bad_request(format!("'{key}' is out of range"))
            } else {
                ApiError::bad_request(format!("'{key}' must be a non-negative integer"))
            }
        }),
    }
}

async fn recommendations_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let filter = RecommendationFilter {
        // Oversized limits saturate so the range check reports the bound.
        limit: parse_paging("limit", query.limit.as_deref())?
            .map(|limit| u32::try_from(limit).unwrap_or(u32::MAX)),
        offset: parse_paging("offset", query.offset.as_deref())?,
        region: query.region,
        priority: query.priority,
        risk_rating: query.risk_rating,
        parcel_ref: query.parcel_ref,
        search: query.search,
    };

    let page = crate::cases::search_recommendations(
        state.store.as_ref(),
        &filter,
        &state.cases.query_limits(),
    )
    .await
    .map_err(|e| {
        match &e {
            crate::error::QueryError::BadRequest(message) => {
                tracing::debug!(error = %message, "Rejected recommendation query");
            }
            crate::error::QueryError::Internal(message) => {
                tracing::error!(error = %message, "Recommendation query failed");
            }
        }
        ApiError::from(e)
    })?;

    Ok(Json(RecommendationsResponse {
        data: page.rows,
        count: page.total_count,
        limit: page.limit,
        offset: page.offset,
    }))
}

// --- Case export ---

fn csv_table_names() -> Vec<&'static str> {
    std::iter::once(CASE_INFO_TABLE)
        .chain(
            RelatedCollection::ALL
                .iter()
                .filter(|c| c.included_in_csv())
                .map(|c| c.export_name()),
        )
        .collect()
}

fn attachment(file: ExportFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.content,
    )
        .into_response()
}

async fn case_export_handler(
    State(state): State<Arc<GatewayState>>,
    Path(case_number): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = match query.format.as_deref().map(str::trim) {
        None | Some("") => ExportFormat::Json,
        Some(raw) => ExportFormat::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!("unknown export format '{raw}'; expected csv or json"))
        })?,
    };

    let table = query
        .table
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(table) = table {
        if format != ExportFormat::Csv {
            return Err(ApiError::bad_request(
                "'table' is only valid with format=csv",
            ));
        }
        let known = csv_table_names();
        if !known.iter().any(|name| *name == table) {
            return Err(ApiError::bad_request(format!(
                "unknown table '{table}'; expected one of {}",
                known.join(", ")
            )));
        }
    }

    let bundle = load_case_bundle(state.store.as_ref(), &case_number)
        .await
        .map_err(|e| match e {
            DatabaseError::NotFound { .. } => {
                ApiError::not_found(format!("case '{case_number}' not found"))
            }
            other => {
                tracing::error!(case_number = %case_number, error = %other, "Failed to load case");
                ApiError::internal(other.to_string())
            }
        })?;

    let options = ExportOptions::new(state.cases.export_source.clone());
    let output = export_case(&bundle, format, &options).map_err(|e| {
        tracing::error!(case_number = %case_number, error = %e, "Failed to format case export");
        ApiError::internal(e.to_string())
    })?;

    match output {
        ExportOutput::Json(file) => Ok(attachment(file)),
        ExportOutput::Csv(files) => match table {
            Some(table) => files
                .into_iter()
                .find(|f| f.name == table)
                .map(attachment)
                .ok_or_else(|| {
                    ApiError::not_found(format!(
                        "table '{table}' is empty for case '{case_number}'"
                    ))
                }),
            None => Ok((
                StatusCode::OK,
                Json(ExportManifestResponse {
                    case_number,
                    files,
                }),
            )
                .into_response()),
        },
    }
}
