//! Request and response DTOs for the HTTP gateway.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::cases::export::ExportFile;
use crate::db::RecommendationRecord;
use crate::error::QueryError;

// --- Health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

// --- Recommendations ---

/// Raw query-string parameters. Paging values stay strings so malformed
/// numbers surface as a JSON 400 instead of axum's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    pub region: Option<String>,
    pub priority: Option<String>,
    pub risk_rating: Option<String>,
    pub parcel_ref: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub data: Vec<RecommendationRecord>,
    pub count: u64,
    pub limit: u32,
    pub offset: u64,
}

// --- Case export ---

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportManifestResponse {
    pub case_number: String,
    pub files: Vec<ExportFile>,
}

// --- Errors ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error rendered as `{"error": "..."}` with the given status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
