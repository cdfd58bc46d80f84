//! # beacon-core
//!
//! Core abstractions for the Beacon event pipeline.
//!
//! This crate provides the foundational types used across all Beacon
//! components:
//!
//! - **Identifiers**: deterministic and random event IDs
//! - **Event Model**: canonical events, identity snapshots, identity links
//! - **Metadata**: size-bounded, schema-validated metadata maps
//! - **Storage Traits**: conditional-write storage abstraction
//! - **Error Types**: shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `beacon-core` is the only crate allowed to define shared primitives.
//! The ingestion pipeline, HTTP surface, and CLI all build on the contracts
//! defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod id;
pub mod identity;
pub mod metadata;
pub mod observability;
pub mod storage;
pub mod store_paths;

pub use error::{Error, Result};
pub use event::{CanonicalEvent, EventKind, SourceChannel};
pub use id::EventId;
pub use identity::{AnonymousId, IdentityLink, IdentitySnapshot, UserId};
pub use metadata::{MetadataMap, MetadataValue};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use beacon_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::event::{CanonicalEvent, EventKind, SourceChannel};
    pub use crate::id::EventId;
    pub use crate::identity::{AnonymousId, IdentityLink, IdentitySnapshot, UserId};
    pub use crate::metadata::{MetadataMap, MetadataValue};
    pub use crate::storage::{
        LocalFsBackend, MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
}
