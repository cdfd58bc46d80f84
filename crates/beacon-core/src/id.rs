//! Event identifiers.
//!
//! Beacon uses two identifier shapes, both opaque strings:
//!
//! - **Deterministic**: derived from `(kind, identity, UTC day)` for event
//!   kinds that are deduplicated per identity per day. Two producers that
//!   observe the same logical occurrence compute the identical ID, so the
//!   storage layer's uniqueness guarantee collapses the race to one row.
//! - **Random**: ULID-backed, for kinds where every submission is its own
//!   occurrence. Lexicographically sortable by creation time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use ulid::Ulid;

use crate::event::EventKind;

/// Placeholder identity key when neither identity dimension is present.
///
/// Only reachable from offline tooling; the live path rejects
/// identity-less events before an ID is ever computed.
const UNKNOWN_IDENTITY: &str = "unknown";

/// A unique identifier for a canonical event.
///
/// Compares and sorts as an opaque string. The deterministic form is 32
/// lowercase hex characters (truncated SHA-256); the random form is a
/// lowercase ULID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Derives the deterministic ID for a daily-deduplicated occurrence.
    ///
    /// The ID is the first 16 bytes of
    /// `SHA-256(kind ":" identity_key ":" iso_date)`, hex-encoded. Stable
    /// for identical inputs across processes and time.
    #[must_use]
    pub fn deterministic(kind: EventKind, identity_key: &str, day: NaiveDate) -> Self {
        let key = if identity_key.is_empty() {
            UNKNOWN_IDENTITY
        } else {
            identity_key
        };
        let input = format!("{}:{}:{}", kind.as_str(), key, day.format("%Y-%m-%d"));
        let digest = Sha256::digest(input.as_bytes());

        let mut hex = String::with_capacity(32);
        for byte in &digest[..16] {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Generates a random event ID.
    #[must_use]
    pub fn random() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    /// Wraps a previously-stored identifier.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 19).expect("valid date")
    }

    #[test]
    fn test_deterministic_id_is_stable() {
        let a = EventId::deterministic(EventKind::AppOpened, "u1", day());
        let b = EventId::deterministic(EventKind::AppOpened, "u1", day());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deterministic_id_varies_by_input() {
        let base = EventId::deterministic(EventKind::AppOpened, "u1", day());

        let other_kind = EventId::deterministic(EventKind::ProductOpened, "u1", day());
        let other_identity = EventId::deterministic(EventKind::AppOpened, "u2", day());
        let other_day = EventId::deterministic(
            EventKind::AppOpened,
            "u1",
            NaiveDate::from_ymd_opt(2026, 2, 20).expect("valid date"),
        );

        assert_ne!(base, other_kind);
        assert_ne!(base, other_identity);
        assert_ne!(base, other_day);
    }

    #[test]
    fn test_empty_identity_falls_back_to_unknown() {
        let empty = EventId::deterministic(EventKind::AppOpened, "", day());
        let unknown = EventId::deterministic(EventKind::AppOpened, "unknown", day());
        assert_eq!(empty, unknown);
    }

    #[test]
    fn test_random_ids_are_unique() {
        let a = EventId::random();
        let b = EventId::random();
        assert_ne!(a, b);
    }
}
