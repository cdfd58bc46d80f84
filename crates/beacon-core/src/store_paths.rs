//! Storage key layout for the event store.
//!
//! Layout:
//!
//! ```text
//! events/{kind}/{day}/{event_id}.json   one object per canonical event
//! links/{user_id}/{anonymous_id}.json   one object per identity link
//! jobs/{job_name}/checkpoint.json       batch job resume checkpoints
//! ```
//!
//! Day partitioning makes the batch jobs' day scans a single prefix list,
//! and the deterministic event ID inside the day partition is the
//! uniqueness key the conditional write enforces.

use chrono::NaiveDate;

use crate::event::EventKind;
use crate::id::EventId;
use crate::identity::{AnonymousId, UserId};

/// Prefix for canonical event objects.
pub const EVENTS_PREFIX: &str = "events";

/// Prefix for identity link objects.
pub const LINKS_PREFIX: &str = "links";

/// Prefix for batch job checkpoints.
pub const JOBS_PREFIX: &str = "jobs";

/// Formats a UTC calendar day as its partition segment (`YYYY-MM-DD`).
#[must_use]
pub fn day_segment(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Returns the object path for a canonical event.
#[must_use]
pub fn event_path(kind: EventKind, day: NaiveDate, id: &EventId) -> String {
    format!("{EVENTS_PREFIX}/{}/{}/{id}.json", kind.as_str(), day_segment(day))
}

/// Returns the list prefix for one (kind, day) partition.
#[must_use]
pub fn event_day_prefix(kind: EventKind, day: NaiveDate) -> String {
    format!("{EVENTS_PREFIX}/{}/{}/", kind.as_str(), day_segment(day))
}

/// Returns the object path for an identity link.
#[must_use]
pub fn link_path(user_id: &UserId, anonymous_id: &AnonymousId) -> String {
    format!("{LINKS_PREFIX}/{user_id}/{anonymous_id}.json")
}

/// Returns the checkpoint path for a named batch job.
#[must_use]
pub fn job_checkpoint_path(job_name: &str) -> String {
    format!("{JOBS_PREFIX}/{job_name}/checkpoint.json")
}
