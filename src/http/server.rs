//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener and drain on shutdown

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::RedMetrics;
use crate::workload::{OutcomeSource, RandomOutcome, Workload};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<RedMetrics>,
    pub workload: Workload,
}

impl AppState {
    pub fn new(metrics: Arc<RedMetrics>, source: Arc<dyn OutcomeSource>) -> Self {
        Self {
            workload: Workload::new(metrics.clone(), source),
            metrics,
        }
    }
}

/// HTTP server for the demo service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a server with a fresh registry and random outcomes.
    pub fn new(config: ServiceConfig) -> Self {
        let state = AppState::new(Arc::new(RedMetrics::new()), Arc::new(RandomOutcome));
        Self::with_state(config, state)
    }

    /// Create a server around existing state (shared registry, injected outcomes).
    pub fn with_state(config: ServiceConfig, state: AppState) -> Self {
        let router = build_router(state);
        Self { router, config }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            configured_address = %self.config.listener.bind_address,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.notified())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/work", get(handlers::work))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
