//! Read-side helpers over the event store.
//!
//! The batch jobs and tests need to scan (kind, day) partitions and group
//! rows by identity. These helpers keep that logic in one place; the write
//! path lives in [`crate::writer`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use beacon_core::event::{CanonicalEvent, EventKind};
use beacon_core::storage::StorageBackend;
use beacon_core::store_paths;

use crate::error::Result;

/// Identity dimension a stored row is keyed by during repair grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdentityDimension {
    /// Rows grouped by authenticated `user_id`.
    User,
    /// Rows grouped by `anonymous_id`.
    Anonymous,
}

/// Read access to stored canonical events.
#[derive(Clone)]
pub struct EventStore {
    storage: Arc<dyn StorageBackend>,
}

impl EventStore {
    /// Creates a new event store over the given backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.storage.clone()
    }

    /// Loads every event in one (kind, day) partition, sorted by
    /// occurrence time then ID for deterministic processing.
    ///
    /// # Errors
    ///
    /// Returns a storage error if listing or reading fails, or a
    /// serialization error for a corrupt row.
    pub async fn list_day(&self, kind: EventKind, day: NaiveDate) -> Result<Vec<CanonicalEvent>> {
        let prefix = store_paths::event_day_prefix(kind, day);
        let objects = self.storage.list(&prefix).await?;

        let mut events = Vec::with_capacity(objects.len());
        for object in objects {
            let bytes = self.storage.get(&object.path).await?;
            let event: CanonicalEvent = serde_json::from_slice(&bytes)?;
            events.push(event);
        }
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }

    /// Deletes a stored event row.
    ///
    /// Only the repair job calls this, and only for rows proven to be
    /// duplicates of an earlier row.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub async fn delete(&self, event: &CanonicalEvent) -> Result<()> {
        let path = store_paths::event_path(event.kind, event.occurred_day(), &event.id);
        self.storage.delete(&path).await?;
        Ok(())
    }

    /// Groups a day's events by the given identity dimension.
    ///
    /// Rows missing that dimension are excluded. Within each group the
    /// input order (occurrence time, then ID) is preserved.
    #[must_use]
    pub fn group_by_identity<'a>(
        events: &'a [CanonicalEvent],
        dimension: IdentityDimension,
    ) -> BTreeMap<&'a str, Vec<&'a CanonicalEvent>> {
        let mut groups: BTreeMap<&str, Vec<&CanonicalEvent>> = BTreeMap::new();
        for event in events {
            let key = match dimension {
                IdentityDimension::User => event.user_id.as_ref().map(|u| u.as_str()),
                IdentityDimension::Anonymous => event.anonymous_id.as_ref().map(|a| a.as_str()),
            };
            if let Some(key) = key {
                groups.entry(key).or_default().push(event);
            }
        }
        groups
    }
}
