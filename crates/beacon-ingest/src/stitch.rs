//! Identity stitching.
//!
//! When a single request carries both an anonymous and an authenticated
//! identity, the pair is recorded in a link row whose observation window
//! only ever widens. The upsert is a CAS loop: read the current row with
//! its version, merge, write back with `MatchesVersion`. The merge is
//! commutative and idempotent, so any interleaving of concurrent observers
//! converges to the same final row.
//!
//! Stitching is fire-and-forget with respect to the ingestion request: the
//! triggering event is already durably recorded, so stitch failures are
//! logged and counted but never propagated to the caller. The bounded
//! [`StitchQueue`] makes the dispatch observable instead of a bare
//! unawaited call.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use beacon_core::identity::{AnonymousId, IdentityLink, UserId};
use beacon_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use beacon_core::store_paths;

use crate::error::{IngestError, Result};
use crate::metrics;

/// CAS attempts before a single observation is abandoned.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Delivery attempts the queue worker makes per observation.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Consecutive worker failures before the streak is surfaced at error level.
const FAILURE_STREAK_ALERT: u32 = 10;

/// Maintains the identity link table.
#[derive(Clone)]
pub struct IdentityStitcher {
    storage: Arc<dyn StorageBackend>,
}

impl IdentityStitcher {
    /// Creates a new stitcher.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Records a joint observation of the pair at `observed_at`.
    ///
    /// Upserts the link row, widening `first_seen_at`/`last_seen_at` to
    /// cover the observation. Running this any number of times, in any
    /// order, converges to min/max of all observed times.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend fails, or an internal error
    /// if the CAS loop exhausts its attempts under pathological contention.
    pub async fn observe(
        &self,
        user_id: &UserId,
        anonymous_id: &AnonymousId,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = store_paths::link_path(user_id, anonymous_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let (link, precondition) = match self.storage.get_with_meta(&path).await {
                Ok((bytes, meta)) => {
                    let mut link: IdentityLink = serde_json::from_slice(&bytes)?;
                    if link.first_seen_at <= observed_at && observed_at <= link.last_seen_at {
                        // Window already covers this observation.
                        return Ok(());
                    }
                    link.widen(observed_at);
                    (link, WritePrecondition::MatchesVersion(meta.version))
                }
                Err(e) if e.is_not_found() => (
                    IdentityLink::new(user_id.clone(), anonymous_id.clone(), observed_at),
                    WritePrecondition::DoesNotExist,
                ),
                Err(e) => return Err(e.into()),
            };

            let payload = Bytes::from(serde_json::to_vec(&link)?);
            match self.storage.put(&path, payload, precondition).await? {
                WriteResult::Success { .. } => {
                    tracing::debug!(
                        user_id = %user_id,
                        anonymous_id = %anonymous_id,
                        "identity link widened"
                    );
                    return Ok(());
                }
                WriteResult::PreconditionFailed { .. } => {
                    // A concurrent observer updated the row; re-read and merge.
                }
            }
        }

        Err(IngestError::internal(format!(
            "identity link CAS exhausted after {MAX_CAS_ATTEMPTS} attempts for {path}"
        )))
    }
}

/// One pending joint observation.
#[derive(Debug, Clone)]
pub struct StitchObservation {
    /// Authenticated identity.
    pub user_id: UserId,
    /// Anonymous identity.
    pub anonymous_id: AnonymousId,
    /// Observation time.
    pub observed_at: DateTime<Utc>,
}

/// Bounded background queue for stitch observations.
///
/// `enqueue` never blocks the ingestion request: a full queue drops the
/// observation with a warning and a counter. The worker owns its own
/// failure-streak state, so alerting behavior is testable and safe under
/// multiple concurrent server instances.
#[derive(Clone)]
pub struct StitchQueue {
    sender: mpsc::Sender<StitchObservation>,
}

impl StitchQueue {
    /// Spawns the worker task and returns the queue handle plus the join
    /// handle for graceful shutdown (drop all queue clones, then await).
    #[must_use]
    pub fn spawn(stitcher: IdentityStitcher, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = tokio::spawn(worker_loop(stitcher, receiver));
        (Self { sender }, handle)
    }

    /// Enqueues an observation without blocking.
    ///
    /// Returns true if accepted, false if the queue was full and the
    /// observation was dropped.
    pub fn enqueue(&self, observation: StitchObservation) -> bool {
        match self.sender.try_send(observation) {
            Ok(()) => {
                metrics::record_stitch_enqueued();
                true
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    user_id = %dropped.user_id,
                    anonymous_id = %dropped.anonymous_id,
                    "stitch queue full, observation dropped"
                );
                metrics::record_stitch_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("stitch queue closed, observation dropped");
                metrics::record_stitch_dropped();
                false
            }
        }
    }
}

async fn worker_loop(stitcher: IdentityStitcher, mut receiver: mpsc::Receiver<StitchObservation>) {
    let mut failure_streak: u32 = 0;

    while let Some(observation) = receiver.recv().await {
        let mut delivered = false;
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            match stitcher
                .observe(
                    &observation.user_id,
                    &observation.anonymous_id,
                    observation.observed_at,
                )
                .await
            {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(e) if attempt < MAX_DELIVERY_ATTEMPTS => {
                    tracing::debug!(error = %e, attempt, "stitch attempt failed, retrying");
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        user_id = %observation.user_id,
                        anonymous_id = %observation.anonymous_id,
                        "stitch observation abandoned"
                    );
                    metrics::record_stitch_failure();
                }
            }
        }

        if delivered {
            failure_streak = 0;
        } else {
            failure_streak += 1;
            if failure_streak >= FAILURE_STREAK_ALERT {
                tracing::error!(
                    failure_streak,
                    "identity stitching is failing persistently"
                );
            }
        }
    }

    tracing::debug!("stitch queue drained, worker exiting");
}
