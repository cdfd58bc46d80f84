//! The canonical event model.
//!
//! A canonical event is the single, deduplicated, validated representation
//! of a user activity occurrence. Rows are created once by the idempotent
//! writer and never mutated; only the offline repair job may delete rows,
//! and only when a strictly earlier row for the same logical occurrence
//! exists.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::id::EventId;
use crate::identity::{AnonymousId, UserId};
use crate::metadata::MetadataMap;

/// Enumerated canonical event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The app shell was opened (at most one row per identity per day).
    AppOpened,
    /// A product surface was opened (at most one row per identity per day).
    ProductOpened,
    /// A page was viewed. Every view is its own row.
    PageViewed,
    /// A call-to-action was clicked.
    CtaClicked,
    /// A signup was completed.
    SignupCompleted,
    /// A paid subscription started.
    SubscriptionStarted,
    /// A paid subscription was cancelled.
    SubscriptionCancelled,
    /// A trial started.
    TrialStarted,
}

impl EventKind {
    /// All known kinds, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::AppOpened,
        Self::ProductOpened,
        Self::PageViewed,
        Self::CtaClicked,
        Self::SignupCompleted,
        Self::SubscriptionStarted,
        Self::SubscriptionCancelled,
        Self::TrialStarted,
    ];

    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppOpened => "app_opened",
            Self::ProductOpened => "product_opened",
            Self::PageViewed => "page_viewed",
            Self::CtaClicked => "cta_clicked",
            Self::SignupCompleted => "signup_completed",
            Self::SubscriptionStarted => "subscription_started",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::TrialStarted => "trial_started",
        }
    }

    /// Returns true for kinds deduplicated to one row per identity per
    /// UTC calendar day.
    ///
    /// Daily-dedup kinds get deterministic IDs; everything else gets a
    /// random ID because repeated submissions are distinct occurrences.
    #[must_use]
    pub fn daily_dedup(self) -> bool {
        matches!(self, Self::AppOpened | Self::ProductOpened)
    }

    /// Parses a raw kind name, mapping legacy producer names to their
    /// canonical kind.
    ///
    /// Returns the kind and, when a legacy alias matched, the original
    /// name so it can be preserved in metadata for auditability.
    #[must_use]
    pub fn parse_aliased(raw: &str) -> Option<(Self, Option<&'static str>)> {
        let value = raw.trim();
        if let Ok(kind) = value.parse::<Self>() {
            return Some((kind, None));
        }
        match value {
            "signup" => Some((Self::SignupCompleted, Some("signup"))),
            // Trial conversions count as subscription starts downstream.
            "trial_converted" => Some((Self::SubscriptionStarted, Some("trial_converted"))),
            "dashboard_opened" => Some((Self::ProductOpened, Some("dashboard_opened"))),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown event kind '{s}'")))
    }
}

/// The producer that delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceChannel {
    /// Client-side beacon (can be blocked by the browser).
    Client,
    /// Server-side middleware ping on app open.
    ServerMiddleware,
    /// Server-side page-view ping.
    ServerPageview,
    /// Offline backfill job.
    Backfill,
}

impl SourceChannel {
    /// Returns the wire name of this channel.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::ServerMiddleware => "server_middleware",
            Self::ServerPageview => "server_pageview",
            Self::Backfill => "backfill",
        }
    }
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-validated canonical event, ready to persist.
///
/// Invariant: at least one of `user_id` / `anonymous_id` is present. The
/// canonicalizer enforces this; rows that would violate it are skipped
/// before an ID is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Deterministic or random identifier (see [`EventId`]).
    pub id: EventId,
    /// Event type.
    pub kind: EventKind,
    /// Occurrence time, UTC. Immutable once written.
    pub occurred_at: DateTime<Utc>,
    /// Authenticated identity, if present.
    pub user_id: Option<UserId>,
    /// Anonymous identity, if present.
    pub anonymous_id: Option<AnonymousId>,
    /// Normalized email, used only for test-account exclusion downstream.
    pub user_email: Option<String>,
    /// Normalized page path context.
    pub page_path: Option<String>,
    /// Producer that delivered the event.
    pub source_channel: SourceChannel,
    /// Size-bounded structured payload.
    pub metadata: MetadataMap,
}

impl CanonicalEvent {
    /// Returns the UTC calendar day of the occurrence.
    #[must_use]
    pub fn occurred_day(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }

    /// Returns the identity key the event is deduplicated under.
    ///
    /// Prefers `user_id`; falls back to `anonymous_id`.
    #[must_use]
    pub fn dedup_key(&self) -> Option<&str> {
        self.user_id
            .as_ref()
            .map(UserId::as_str)
            .or_else(|| self.anonymous_id.as_ref().map(AnonymousId::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("page_view".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_legacy_aliases() {
        assert_eq!(
            EventKind::parse_aliased("signup"),
            Some((EventKind::SignupCompleted, Some("signup")))
        );
        assert_eq!(
            EventKind::parse_aliased("trial_converted"),
            Some((EventKind::SubscriptionStarted, Some("trial_converted")))
        );
        assert_eq!(
            EventKind::parse_aliased(" app_opened "),
            Some((EventKind::AppOpened, None))
        );
        assert_eq!(EventKind::parse_aliased("made_up"), None);
    }

    #[test]
    fn test_daily_dedup_set() {
        assert!(EventKind::AppOpened.daily_dedup());
        assert!(EventKind::ProductOpened.daily_dedup());
        assert!(!EventKind::PageViewed.daily_dedup());
        assert!(!EventKind::SubscriptionStarted.daily_dedup());
    }

    #[test]
    fn test_row_is_full_eq() {
        // Deduplication and repair compare whole rows; the type must
        // satisfy total equality, not just PartialEq.
        fn assert_eq_bound<T: Eq>() {}
        assert_eq_bound::<CanonicalEvent>();
        assert_eq_bound::<MetadataMap>();
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&EventKind::AppOpened).unwrap();
        assert_eq!(json, "\"app_opened\"");
        let json = serde_json::to_string(&SourceChannel::ServerMiddleware).unwrap();
        assert_eq!(json, "\"server_middleware\"");
    }
}
