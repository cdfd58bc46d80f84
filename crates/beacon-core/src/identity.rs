//! Identity primitives: user/anonymous IDs, per-request snapshots, and
//! the identity-link row that stitches the two spaces together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

fn validate_identity(raw: &str, field: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::InvalidId {
            message: format!("{field} cannot be empty"),
        });
    }
    if raw.len() > 128 {
        return Err(Error::InvalidId {
            message: format!("{field} exceeds 128 characters"),
        });
    }
    if raw.chars().any(char::is_control) || raw.contains('/') {
        return Err(Error::InvalidId {
            message: format!("{field} contains forbidden characters"),
        });
    }
    Ok(())
}

/// An authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID from a raw value, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` if the value is empty after trimming,
    /// longer than 128 characters, or contains control characters or `/`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        validate_identity(trimmed, "user_id")?;
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pre-authentication browser identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymousId(String);

impl AnonymousId {
    /// Creates an anonymous ID from a raw token, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` under the same rules as [`UserId::new`].
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        validate_identity(trimmed, "anonymous_id")?;
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable identity snapshot for a single ingestion request.
///
/// Both dimensions are resolved once, at the start of the request, and the
/// same snapshot flows through canonicalization, the write, and the stitch.
/// Re-resolving mid-request could observe a half-authenticated state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    /// Authenticated identity, if a valid session was present.
    pub user_id: Option<UserId>,
    /// Anonymous identity, if the client supplied a token.
    pub anonymous_id: Option<AnonymousId>,
}

impl IdentitySnapshot {
    /// Creates a snapshot from optional resolved identities.
    #[must_use]
    pub fn new(user_id: Option<UserId>, anonymous_id: Option<AnonymousId>) -> Self {
        Self {
            user_id,
            anonymous_id,
        }
    }

    /// Returns true if neither identity dimension is present.
    ///
    /// A common, valid outcome: first visit before a token is issued, or a
    /// client that blocks the anonymous cookie.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.anonymous_id.is_none()
    }

    /// Returns true if both identity dimensions are present.
    ///
    /// This is the trigger condition for identity stitching.
    #[must_use]
    pub fn is_joint(&self) -> bool {
        self.user_id.is_some() && self.anonymous_id.is_some()
    }

    /// Returns the identity key used for deterministic event IDs.
    ///
    /// Prefers the authenticated identity, falls back to the anonymous one.
    /// Returns `None` when the snapshot is empty.
    #[must_use]
    pub fn dedup_key(&self) -> Option<&str> {
        self.user_id
            .as_ref()
            .map(UserId::as_str)
            .or_else(|| self.anonymous_id.as_ref().map(AnonymousId::as_str))
    }
}

/// A stored association between an anonymous identity and an authenticated
/// identity, with the observed co-occurrence window.
///
/// Unique per (`user_id`, `anonymous_id`) pair. The window only widens:
/// `first_seen_at` monotonically decreases, `last_seen_at` monotonically
/// increases, and `first_seen_at <= last_seen_at` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    /// Authenticated identity.
    pub user_id: UserId,
    /// Anonymous identity.
    pub anonymous_id: AnonymousId,
    /// Earliest joint observation.
    pub first_seen_at: DateTime<Utc>,
    /// Latest joint observation.
    pub last_seen_at: DateTime<Utc>,
}

impl IdentityLink {
    /// Creates a link from a first joint observation.
    #[must_use]
    pub fn new(user_id: UserId, anonymous_id: AnonymousId, observed_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            anonymous_id,
            first_seen_at: observed_at,
            last_seen_at: observed_at,
        }
    }

    /// Widens the window to include another observation time.
    ///
    /// Commutative and idempotent: any ordering or repetition of
    /// observations converges to the same window.
    pub fn widen(&mut self, observed_at: DateTime<Utc>) {
        if observed_at < self.first_seen_at {
            self.first_seen_at = observed_at;
        }
        if observed_at > self.last_seen_at {
            self.last_seen_at = observed_at;
        }
    }

    /// Merges another link for the same pair into this one.
    pub fn merge(&mut self, other: &Self) {
        self.widen(other.first_seen_at);
        self.widen(other.last_seen_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_identity_validation() {
        assert!(UserId::new("  u1  ").is_ok());
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert!(AnonymousId::new("a/b").is_err());
        assert!(AnonymousId::new("a\u{0}b").is_err());
        assert!(UserId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_snapshot_dedup_key_prefers_user() {
        let snapshot = IdentitySnapshot::new(
            Some(UserId::new("u1").unwrap()),
            Some(AnonymousId::new("a1").unwrap()),
        );
        assert_eq!(snapshot.dedup_key(), Some("u1"));
        assert!(snapshot.is_joint());
        assert!(!snapshot.is_empty());

        let anon_only = IdentitySnapshot::new(None, Some(AnonymousId::new("a1").unwrap()));
        assert_eq!(anon_only.dedup_key(), Some("a1"));
        assert!(!anon_only.is_joint());

        let empty = IdentitySnapshot::default();
        assert!(empty.is_empty());
        assert_eq!(empty.dedup_key(), None);
    }

    #[test]
    fn test_link_widening_is_monotonic() {
        let mut link = IdentityLink::new(
            UserId::new("u1").unwrap(),
            AnonymousId::new("a1").unwrap(),
            at(12),
        );

        link.widen(at(15));
        assert_eq!(link.first_seen_at, at(12));
        assert_eq!(link.last_seen_at, at(15));

        link.widen(at(9));
        assert_eq!(link.first_seen_at, at(9));
        assert_eq!(link.last_seen_at, at(15));

        // Repeat observations are no-ops.
        link.widen(at(12));
        assert_eq!(link.first_seen_at, at(9));
        assert_eq!(link.last_seen_at, at(15));
    }

    #[test]
    fn test_merge_converges_regardless_of_order() {
        let user = UserId::new("u1").unwrap();
        let anon = AnonymousId::new("a1").unwrap();
        let observations = [at(14), at(8), at(20), at(8), at(11)];

        let mut forward = IdentityLink::new(user.clone(), anon.clone(), observations[0]);
        for t in &observations[1..] {
            forward.widen(*t);
        }

        let mut reverse = IdentityLink::new(user, anon, *observations.last().unwrap());
        for t in observations.iter().rev().skip(1) {
            reverse.widen(*t);
        }

        assert_eq!(forward.first_seen_at, at(8));
        assert_eq!(forward.last_seen_at, at(20));
        assert_eq!(forward.first_seen_at, reverse.first_seen_at);
        assert_eq!(forward.last_seen_at, reverse.last_seen_at);
    }
}
