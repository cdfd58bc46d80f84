//! # beacon-api
//!
//! HTTP ingestion surface for the Beacon pipeline.
//!
//! Two idempotent ping endpoints (`app-open`, `page-view`) plus a generic
//! tracking endpoint for conversion kinds fired by trusted server code.
//! Identity is resolved once per request from an anonymous-id
//! header/cookie and an authenticated-session lookup, and the same
//! immutable snapshot flows through the whole pipeline.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod identity;
pub mod openapi;
pub mod routes;
pub mod server;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use identity::{SessionStore, StaticSessionStore, resolve_identity};
pub use server::{AppState, build_router};
