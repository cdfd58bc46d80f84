//! Observability infrastructure for Beacon.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers used by the API server and the CLI.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `beacon_ingest=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for an ingestion operation with standard fields.
#[must_use]
pub fn ingest_span(operation: &str, kind: &str, channel: &str) -> Span {
    tracing::info_span!("ingest", op = operation, kind = kind, channel = channel)
}

/// Creates a span for a batch job run.
#[must_use]
pub fn job_span(job: &str, dry_run: bool) -> Span {
    tracing::info_span!("job", job = job, dry_run = dry_run)
}
