//! `OpenAPI` (3.1) specification generation for `beacon-api`.
//!
//! Used to generate the client beacon snippet bindings and to detect
//! breaking API changes in CI.

use utoipa::OpenApi;

/// `OpenAPI` documentation for the Beacon ingestion API (`/api/v1/*`).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Beacon API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Event ingestion API"
    ),
    paths(
        crate::routes::events::app_open,
        crate::routes::events::page_view,
        crate::routes::events::track_event,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::routes::events::AppOpenRequest,
            crate::routes::events::PageViewRequest,
            crate::routes::events::TrackEventRequest,
            crate::routes::events::TrackResponse,
        )
    ),
    tags(
        (name = "events", description = "Event ingestion"),
    ),
)]
pub struct ApiDoc;

/// Returns the generated `OpenAPI` spec.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Returns the generated `OpenAPI` spec serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen).
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_contains_all_routes() {
        let json = openapi_json().expect("spec serializes");
        assert!(json.contains("/api/v1/events/app-open"));
        assert!(json.contains("/api/v1/events/page-view"));
        assert!(json.contains("\"/api/v1/events\""));
    }
}
