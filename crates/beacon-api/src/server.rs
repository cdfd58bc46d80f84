//! API server wiring.
//!
//! Provides health, ready, and ingestion endpoints.

use std::sync::Arc;

use axum::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use beacon_core::storage::StorageBackend;
use beacon_ingest::canonicalize::Canonicalizer;
use beacon_ingest::stitch::{IdentityStitcher, StitchQueue};
use beacon_ingest::writer::EventWriter;
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::identity::SessionStore;
use crate::routes::api_v1_routes;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
}

/// Shared application state.
///
/// One long-lived instance per server; there is no process-global state.
pub struct AppState {
    /// Request canonicalizer.
    pub canonicalizer: Canonicalizer,
    /// Idempotent event writer.
    pub writer: EventWriter,
    /// Bounded stitch dispatch queue.
    pub stitch: StitchQueue,
    /// Authenticated-session lookup.
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    /// Builds the application state over a storage backend, spawning the
    /// stitch worker. The returned join handle completes once all state
    /// clones are dropped and the queue drains.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        sessions: Arc<dyn SessionStore>,
        config: &ApiConfig,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (stitch, stitch_worker) = StitchQueue::spawn(
            IdentityStitcher::new(backend.clone()),
            config.stitch_queue_capacity,
        );
        let state = Arc::new(Self {
            canonicalizer: Canonicalizer::new(config.metadata_byte_ceiling),
            writer: EventWriter::new(backend),
            stitch,
            sessions,
        });
        (state, stitch_worker)
    }
}

/// Builds the full router.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/openapi.json", get(openapi_spec))
        .nest("/api/v1", api_v1_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any)),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: true })
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(crate::openapi::openapi())
}

/// Runs the server until shutdown.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn run(
    config: &ApiConfig,
    backend: Arc<dyn StorageBackend>,
    sessions: Arc<dyn SessionStore>,
) -> beacon_core::Result<()> {
    let (state, _stitch_worker) = AppState::new(backend, sessions, config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| beacon_core::Error::storage_with_source("bind listener", e))?;
    tracing::info!(addr = %config.bind_addr, "beacon api listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| beacon_core::Error::storage_with_source("serve", e))
}
