//! Error types surfaced to HTTP clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures a request handler can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Injected downstream failure used to exercise error-rate dashboards.
    #[error("simulated downstream error")]
    Simulated,

    /// Work task was cancelled before finishing (runtime shutting down).
    #[error("work interrupted")]
    Interrupted,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Simulated => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServiceError::Simulated => "simulated",
            ServiceError::Interrupted => "interrupted",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.code() }))).into_response()
    }
}
