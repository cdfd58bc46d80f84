//! # beacon-ingest
//!
//! The Beacon event pipeline: canonicalization, deterministic
//! deduplication, idempotent persistence, identity stitching, and the
//! offline backfill/repair jobs.
//!
//! ## Pipeline
//!
//! ```text
//! resolved identity ──▶ Canonicalizer ──▶ EventWriter ──▶ storage
//!                            │                 (DoesNotExist insert)
//!                            └──▶ StitchQueue ──▶ IdentityStitcher
//!                                 (fire-and-forget, bounded)
//! ```
//!
//! Every stage is stateless; the storage layer's conditional write is the
//! only synchronization primitive. Expected outcomes (no identity,
//! duplicate delivery) are values, not errors.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonicalize;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod stitch;
pub mod store;
pub mod writer;

pub use canonicalize::{CanonicalizeOutcome, Canonicalizer, RawEvent, SkipReason};
pub use error::{IngestError, Result};
pub use stitch::{IdentityStitcher, StitchObservation, StitchQueue};
pub use store::EventStore;
pub use writer::{EventWriter, WriteOutcome};
