pub mod edges;
pub mod nodes;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A failed query, reported as HTTP 500 with `{"error", "details"}`.
#[derive(Debug)]
pub struct ApiError {
    error: &'static str,
    details: String,
}

impl ApiError {
    pub fn new(error: &'static str, details: impl ToString) -> Self {
        Self {
            error,
            details: details.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = self.error, details = %self.details, "database error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.error, "details": self.details })),
        )
            .into_response()
    }
}
