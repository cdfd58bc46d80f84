//! Event canonicalization.
//!
//! Pure function from a raw ingestion request to either a fully-populated
//! [`CanonicalEvent`] or a machine-readable skip reason. No I/O happens
//! here, which is what makes the validation rules independently testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use beacon_core::event::{CanonicalEvent, EventKind, SourceChannel};
use beacon_core::id::EventId;
use beacon_core::identity::IdentitySnapshot;
use beacon_core::metadata::{DEFAULT_BYTE_CEILING, MetadataMap};

/// A raw ingestion request, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    /// Raw kind name (canonical or legacy alias).
    pub kind: String,
    /// Raw page path or full URL.
    pub page_path: Option<String>,
    /// Raw email, if the producer knows it.
    pub user_email: Option<String>,
    /// Raw metadata payload.
    pub metadata: Option<serde_json::Value>,
    /// Producer-claimed occurrence time; defaults to the ingestion time.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Machine-readable reason an event was skipped rather than stored.
///
/// Skips are expected outcomes and are always reported inside a
/// success-shaped response, never as request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither identity dimension was present. The most common skip:
    /// ad-blocking and cookie rejection make this an everyday outcome.
    NoIdentity,
    /// A field the kind requires was absent or blank.
    MissingRequiredField,
    /// The kind was not a known canonical kind or legacy alias.
    InvalidKind,
    /// A row for this logical occurrence already exists.
    Duplicate,
}

impl SkipReason {
    /// Returns the wire name of this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoIdentity => "no_identity",
            Self::MissingRequiredField => "missing_required_field",
            Self::InvalidKind => "invalid_kind",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of canonicalization.
#[derive(Debug, Clone)]
pub enum CanonicalizeOutcome {
    /// The event is valid and ready to write.
    Ok(Box<CanonicalEvent>),
    /// The event was skipped with the given reason.
    Skip(SkipReason),
}

/// Validates and normalizes raw ingestion requests.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    metadata_byte_ceiling: usize,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self {
            metadata_byte_ceiling: DEFAULT_BYTE_CEILING,
        }
    }
}

impl Canonicalizer {
    /// Creates a canonicalizer with the given metadata byte ceiling.
    #[must_use]
    pub fn new(metadata_byte_ceiling: usize) -> Self {
        Self {
            metadata_byte_ceiling,
        }
    }

    /// Canonicalizes a raw event against an immutable identity snapshot.
    ///
    /// `now` is the ingestion time; it becomes the occurrence time when the
    /// producer did not claim one.
    #[must_use]
    pub fn canonicalize(
        &self,
        raw: &RawEvent,
        identity: &IdentitySnapshot,
        channel: SourceChannel,
        now: DateTime<Utc>,
    ) -> CanonicalizeOutcome {
        let Some((kind, legacy)) = EventKind::parse_aliased(&raw.kind) else {
            return CanonicalizeOutcome::Skip(SkipReason::InvalidKind);
        };

        if identity.is_empty() {
            return CanonicalizeOutcome::Skip(SkipReason::NoIdentity);
        }

        let page_path = raw.page_path.as_deref().and_then(normalize_path);
        if kind == EventKind::PageViewed && page_path.is_none() {
            return CanonicalizeOutcome::Skip(SkipReason::MissingRequiredField);
        }

        let occurred_at = raw.occurred_at.unwrap_or(now);

        let mut metadata = MetadataMap::sanitize(raw.metadata.as_ref(), self.metadata_byte_ceiling);
        if let Some(legacy_kind) = legacy {
            metadata.insert_str("legacy_kind", legacy_kind);
        }

        let id = if kind.daily_dedup() {
            // The snapshot is non-empty here, so a dedup key exists.
            let key = identity.dedup_key().unwrap_or_default();
            EventId::deterministic(kind, key, occurred_at.date_naive())
        } else {
            EventId::random()
        };

        CanonicalizeOutcome::Ok(Box::new(CanonicalEvent {
            id,
            kind,
            occurred_at,
            user_id: identity.user_id.clone(),
            anonymous_id: identity.anonymous_id.clone(),
            user_email: raw.user_email.as_deref().and_then(normalize_email),
            page_path,
            source_channel: channel,
            metadata,
        }))
    }
}

/// Normalizes a page path or full URL to a bare path.
///
/// Strips scheme/host, query, and fragment, and trailing slashes except
/// for the root, so trivially different URLs do not fragment counts.
#[must_use]
pub fn normalize_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Accept either a pathname or a full URL.
    let after_host = if let Some(scheme_end) = trimmed.find("://") {
        let rest = &trimmed[scheme_end + 3..];
        rest.find('/').map_or("/", |i| &rest[i..])
    } else {
        trimmed
    };

    let without_query = after_host
        .split_once('?')
        .map_or(after_host, |(path, _)| path);
    let without_fragment = without_query
        .split_once('#')
        .map_or(without_query, |(path, _)| path);

    let stripped = without_fragment.trim_end_matches('/');
    if stripped.is_empty() {
        return Some("/".to_string());
    }
    if stripped.starts_with('/') {
        Some(stripped.to_string())
    } else {
        Some(format!("/{stripped}"))
    }
}

fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
