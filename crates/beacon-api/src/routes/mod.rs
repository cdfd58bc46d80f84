//! HTTP route handlers.

pub mod events;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// `/api/v1` ingestion routes.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    events::routes()
}
