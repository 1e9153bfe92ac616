//! Endpoint handlers.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::ServiceError;
use crate::http::server::AppState;
use crate::observability::metrics::CONTENT_TYPE;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkResult {
    pub result: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { ok: true })
}

/// Simulated work with latency and an occasional failure.
pub async fn work(State(state): State<AppState>) -> Result<Json<WorkResult>, ServiceError> {
    state.workload.run_to_completion().await?;
    Ok(Json(WorkResult { result: "ok" }))
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.metrics.render())
}
