//! Idempotent event writer.
//!
//! INVARIANT: writes are append-only with a `DoesNotExist` precondition.
//! The precondition, not application logic, resolves concurrent duplicate
//! delivery: two uncoordinated producers computing the same deterministic
//! ID race to a single stored row, and the loser gets a normal
//! `Skipped(Duplicate)` outcome.
//!
//! The pre-existence check before the insert is a latency optimization for
//! the common retry case. It is **not** atomic with the insert and carries
//! no correctness weight.

use bytes::Bytes;
use std::sync::Arc;

use beacon_core::event::CanonicalEvent;
use beacon_core::id::EventId;
use beacon_core::identity::{AnonymousId, UserId};
use beacon_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use beacon_core::store_paths;

use crate::canonicalize::SkipReason;
use crate::error::Result;
use crate::metrics;

/// Outcome of an idempotent write attempt.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// A new row was stored.
    Inserted {
        /// The stored event's identifier.
        event_id: EventId,
    },
    /// The write was a no-op with the given reason.
    Skipped(SkipReason),
}

impl WriteOutcome {
    /// Returns true if a new row was stored.
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Persists canonical events exactly once per logical occurrence.
#[derive(Clone)]
pub struct EventWriter {
    storage: Arc<dyn StorageBackend>,
}

impl EventWriter {
    /// Creates a new event writer.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Attempts to persist a canonical event.
    ///
    /// Returns `Inserted` when a new row was stored, `Skipped(Duplicate)`
    /// when a row for the same logical occurrence already exists.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Storage` for transient backend failures; the
    /// caller may retry because the whole path is idempotent.
    pub async fn write(&self, event: &CanonicalEvent) -> Result<WriteOutcome> {
        if event.kind.daily_dedup() && self.existing_row_for_day(event).await? {
            metrics::record_skip(SkipReason::Duplicate.as_str());
            return Ok(WriteOutcome::Skipped(SkipReason::Duplicate));
        }

        let path = store_paths::event_path(event.kind, event.occurred_day(), &event.id);
        let payload = Bytes::from(serde_json::to_vec(event)?);

        match self
            .storage
            .put(&path, payload, WritePrecondition::DoesNotExist)
            .await?
        {
            WriteResult::Success { .. } => {
                tracing::debug!(
                    event_id = %event.id,
                    kind = %event.kind,
                    channel = %event.source_channel,
                    "canonical event inserted"
                );
                metrics::record_insert(event.kind.as_str(), event.source_channel.as_str());
                Ok(WriteOutcome::Inserted {
                    event_id: event.id.clone(),
                })
            }
            WriteResult::PreconditionFailed { .. } => {
                // A concurrent producer won the race. This is success.
                tracing::debug!(event_id = %event.id, "duplicate write collapsed");
                metrics::record_skip(SkipReason::Duplicate.as_str());
                Ok(WriteOutcome::Skipped(SkipReason::Duplicate))
            }
        }
    }

    /// Fast existence check scoped to the event's day and identity.
    ///
    /// Covers both identity dimensions: a session can switch identity
    /// mid-day, so the user-keyed and anon-keyed deterministic IDs both
    /// need checking.
    async fn existing_row_for_day(&self, event: &CanonicalEvent) -> Result<bool> {
        let day = event.occurred_day();

        for key in [
            event.user_id.as_ref().map(UserId::as_str),
            event.anonymous_id.as_ref().map(AnonymousId::as_str),
        ]
        .into_iter()
        .flatten()
        {
            let candidate = EventId::deterministic(event.kind, key, day);
            let path = store_paths::event_path(event.kind, day, &candidate);
            if self.storage.head(&path).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::event::{EventKind, SourceChannel};
    use beacon_core::identity::IdentitySnapshot;
    use beacon_core::metadata::MetadataMap;
    use beacon_core::storage::MemoryBackend;
    use chrono::{TimeZone, Utc};

    fn event_for(identity: &IdentitySnapshot, kind: EventKind) -> CanonicalEvent {
        let occurred_at = Utc.with_ymd_and_hms(2026, 2, 19, 9, 0, 0).unwrap();
        let id = if kind.daily_dedup() {
            EventId::deterministic(kind, identity.dedup_key().unwrap(), occurred_at.date_naive())
        } else {
            EventId::random()
        };
        CanonicalEvent {
            id,
            kind,
            occurred_at,
            user_id: identity.user_id.clone(),
            anonymous_id: identity.anonymous_id.clone(),
            user_email: None,
            page_path: Some("/home".into()),
            source_channel: SourceChannel::ServerMiddleware,
            metadata: MetadataMap::new(),
        }
    }

    fn anon(id: &str) -> IdentitySnapshot {
        IdentitySnapshot::new(None, Some(AnonymousId::new(id).unwrap()))
    }

    #[tokio::test]
    async fn test_first_write_inserts() {
        let writer = EventWriter::new(Arc::new(MemoryBackend::new()));
        let event = event_for(&anon("a1"), EventKind::AppOpened);

        let outcome = writer.write(&event).await.expect("write");
        assert!(outcome.is_inserted());
    }

    #[tokio::test]
    async fn test_repeat_write_skips_as_duplicate() {
        let writer = EventWriter::new(Arc::new(MemoryBackend::new()));
        let event = event_for(&anon("a1"), EventKind::AppOpened);

        writer.write(&event).await.expect("first write");
        let outcome = writer.write(&event).await.expect("second write");
        assert!(matches!(
            outcome,
            WriteOutcome::Skipped(SkipReason::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_mid_day_identity_switch_is_caught_by_precheck() {
        let backend = Arc::new(MemoryBackend::new());
        let writer = EventWriter::new(backend);

        // Morning: anonymous only.
        let morning = event_for(&anon("a1"), EventKind::AppOpened);
        writer.write(&morning).await.expect("morning write");

        // Afternoon: the session authenticated; the deterministic id now
        // keys off the user, but the anon-keyed row already covers today.
        let joint = IdentitySnapshot::new(
            Some(UserId::new("u1").unwrap()),
            Some(AnonymousId::new("a1").unwrap()),
        );
        let afternoon = event_for(&joint, EventKind::AppOpened);
        let outcome = writer.write(&afternoon).await.expect("afternoon write");
        assert!(matches!(
            outcome,
            WriteOutcome::Skipped(SkipReason::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_non_dedup_kind_always_inserts() {
        let writer = EventWriter::new(Arc::new(MemoryBackend::new()));

        let first = event_for(&anon("a1"), EventKind::PageViewed);
        let second = event_for(&anon("a1"), EventKind::PageViewed);

        assert!(writer.write(&first).await.expect("write").is_inserted());
        assert!(writer.write(&second).await.expect("write").is_inserted());
    }
}
