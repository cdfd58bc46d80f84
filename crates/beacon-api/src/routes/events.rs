//! Event ingestion routes.
//!
//! ## Routes
//!
//! - `POST /events/app-open` - App-open ping (middleware producer)
//! - `POST /events/page-view` - Page-view ping (may trigger stitching)
//! - `POST /events`           - Generic tracking for conversion kinds
//!
//! All three are idempotent under retry. Expected skips (above all
//! `no_identity`, an everyday outcome under ad-blocking) return a
//! success-shaped body, never a 4xx.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;

use beacon_core::event::SourceChannel;
use beacon_core::identity::IdentitySnapshot;
use beacon_ingest::canonicalize::{CanonicalizeOutcome, RawEvent, SkipReason};
use beacon_ingest::stitch::StitchObservation;
use beacon_ingest::writer::WriteOutcome;
use beacon_ingest::metrics;

use crate::error::ApiError;
use crate::identity::resolve_identity;
use crate::server::AppState;

/// App-open ping body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AppOpenRequest {
    /// Optional page path the app was opened on.
    pub path: Option<String>,
}

/// Page-view ping body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PageViewRequest {
    /// Path of the viewed page. Required.
    pub path: String,
}

/// Generic tracking body for conversion kinds fired by trusted server code.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackEventRequest {
    /// Canonical kind name or legacy alias.
    pub kind: String,
    /// Optional page path context.
    pub path: Option<String>,
    /// Optional producer metadata.
    pub metadata: Option<serde_json::Value>,
    /// Optional producer-claimed occurrence time.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Optional acting-user email, normalized and stored for downstream
    /// test-account exclusion.
    pub user_email: Option<String>,
}

/// Ingestion response.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    /// Always true for expected outcomes.
    pub success: bool,
    /// True when a new row was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked: Option<bool>,
    /// True when the request was an expected no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    /// Machine-readable skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Identifier of the stored row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl TrackResponse {
    fn tracked(event_id: String) -> Self {
        Self {
            success: true,
            tracked: Some(true),
            skipped: None,
            reason: None,
            event_id: Some(event_id),
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self {
            success: true,
            tracked: None,
            skipped: Some(true),
            reason: Some(reason.as_str().to_string()),
            event_id: None,
        }
    }
}

/// Creates event ingestion routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/app-open", post(app_open))
        .route("/events/page-view", post(page_view))
        .route("/events", post(track_event))
}

/// App-open ping.
///
/// POST /api/v1/events/app-open
#[utoipa::path(
    post,
    path = "/api/v1/events/app-open",
    tag = "events",
    request_body = AppOpenRequest,
    responses(
        (status = 200, description = "Tracked or skipped", body = TrackResponse),
        (status = 500, description = "Storage failure (safe to retry)"),
    )
)]
pub(crate) async fn app_open(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AppOpenRequest>,
) -> Result<Json<TrackResponse>, ApiError> {
    let identity = resolve_identity(&headers, &state.sessions).await?;
    let raw = RawEvent {
        kind: "app_opened".to_string(),
        page_path: req.path,
        ..RawEvent::default()
    };
    ingest(&state, &identity, &raw, SourceChannel::ServerMiddleware).await
}

/// Page-view ping.
///
/// POST /api/v1/events/page-view
#[utoipa::path(
    post,
    path = "/api/v1/events/page-view",
    tag = "events",
    request_body = PageViewRequest,
    responses(
        (status = 200, description = "Tracked or skipped", body = TrackResponse),
        (status = 400, description = "Missing required path"),
        (status = 500, description = "Storage failure (safe to retry)"),
    )
)]
pub(crate) async fn page_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PageViewRequest>,
) -> Result<Json<TrackResponse>, ApiError> {
    if req.path.trim().is_empty() {
        // A blank required field is a caller bug: reject, don't skip.
        return Err(ApiError::bad_request("path is required"));
    }

    let identity = resolve_identity(&headers, &state.sessions).await?;
    let raw = RawEvent {
        kind: "page_viewed".to_string(),
        page_path: Some(req.path),
        ..RawEvent::default()
    };
    ingest(&state, &identity, &raw, SourceChannel::ServerPageview).await
}

/// Generic conversion tracking.
///
/// POST /api/v1/events
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "events",
    request_body = TrackEventRequest,
    responses(
        (status = 200, description = "Tracked or skipped", body = TrackResponse),
        (status = 500, description = "Storage failure (safe to retry)"),
    )
)]
pub(crate) async fn track_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TrackEventRequest>,
) -> Result<Json<TrackResponse>, ApiError> {
    let identity = resolve_identity(&headers, &state.sessions).await?;
    let raw = RawEvent {
        kind: req.kind,
        page_path: req.path,
        metadata: req.metadata,
        occurred_at: req.occurred_at,
        user_email: req.user_email,
        ..RawEvent::default()
    };
    ingest(&state, &identity, &raw, SourceChannel::Client).await
}

/// Shared ingestion path: dispatch a stitch observation when the request
/// carried both identities, then canonicalize and write idempotently.
async fn ingest(
    state: &AppState,
    identity: &IdentitySnapshot,
    raw: &RawEvent,
    channel: SourceChannel,
) -> Result<Json<TrackResponse>, ApiError> {
    let now = Utc::now();

    // The pair co-occurred whether or not a row ends up stored; an
    // expected skip still widens the stitch window. Fire-and-forget: a
    // stitch failure must be invisible to the client.
    if let (Some(user_id), Some(anonymous_id)) =
        (identity.user_id.clone(), identity.anonymous_id.clone())
    {
        state.stitch.enqueue(StitchObservation {
            user_id,
            anonymous_id,
            observed_at: raw.occurred_at.unwrap_or(now),
        });
    }

    let outcome = state.canonicalizer.canonicalize(raw, identity, channel, now);
    let event = match outcome {
        CanonicalizeOutcome::Ok(event) => event,
        CanonicalizeOutcome::Skip(reason) => {
            metrics::record_skip(reason.as_str());
            return Ok(Json(TrackResponse::skipped(reason)));
        }
    };

    let span = beacon_core::observability::ingest_span(
        "track",
        event.kind.as_str(),
        channel.as_str(),
    );
    let response = match state.writer.write(&event).instrument(span).await? {
        WriteOutcome::Inserted { event_id } => TrackResponse::tracked(event_id.to_string()),
        WriteOutcome::Skipped(reason) => TrackResponse::skipped(reason),
    };

    Ok(Json(response))
}
