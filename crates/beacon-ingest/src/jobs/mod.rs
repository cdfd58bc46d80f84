//! Offline batch jobs: gap backfill and duplicate repair.
//!
//! Both jobs are operator-triggered, carry a mandatory dry-run mode, are
//! idempotent (re-running a converged window produces zero changes), and
//! are concurrent-safe with the live ingestion path because they use the
//! same deterministic identifier scheme and the same conditional-write
//! uniqueness guarantee.
//!
//! Jobs process days oldest-first and checkpoint after each fully-processed
//! day, so a truncated run (time-boxed via `max_duration`, or aborted on a
//! storage failure) resumes instead of re-scanning. A checkpoint is scoped
//! to the window that wrote it and is cleared once that window completes;
//! a later run over a different window (an older one included) always
//! scans its full range. Dry runs never read or write checkpoints.

mod backfill;
mod repair;
#[cfg(test)]
mod tests;

pub use backfill::GapBackfill;
pub use repair::DuplicateRepair;

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use beacon_core::storage::{StorageBackend, WritePrecondition};
use beacon_core::store_paths;

use crate::error::Result;

/// Options common to both batch jobs.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Report the would-be effect without mutating storage.
    pub dry_run: bool,
    /// Number of days in the window, ending at `end_day` inclusive.
    pub lookback_days: u32,
    /// Last day of the window. Defaults to the current UTC day.
    pub end_day: Option<NaiveDate>,
    /// Wall-clock budget; the run stops cleanly when exceeded.
    pub max_duration: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            lookback_days: 7,
            end_day: None,
            max_duration: None,
        }
    }
}

impl JobOptions {
    /// Returns the inclusive day window `[start, end]`.
    #[must_use]
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let end = self.end_day.unwrap_or_else(|| Utc::now().date_naive());
        let span = i64::from(self.lookback_days.max(1)) - 1;
        (end - ChronoDuration::days(span), end)
    }
}

/// Structured summary of a batch job run, sufficient to audit a production
/// run before committing to a live pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job name.
    pub job: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Days fully processed.
    pub days_scanned: u32,
    /// Stored rows examined.
    pub rows_examined: u64,
    /// Rows mutated (synthesized or deleted); would-be counts in a dry run.
    pub rows_mutated: u64,
    /// Rows or groups that needed no action.
    pub rows_skipped: u64,
    /// Non-fatal errors encountered.
    pub errors: Vec<String>,
    /// True if the whole window was processed.
    pub completed: bool,
    /// First unprocessed day when the run stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_day: Option<NaiveDate>,
}

impl JobReport {
    /// Creates an empty report for the named job.
    #[must_use]
    pub fn new(job: impl Into<String>, dry_run: bool) -> Self {
        Self {
            job: job.into(),
            dry_run,
            days_scanned: 0,
            rows_examined: 0,
            rows_mutated: 0,
            rows_skipped: 0,
            errors: Vec::new(),
            completed: false,
            resume_day: None,
        }
    }
}

/// Persistent per-job resume marker, valid only for the window it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCheckpoint {
    /// Job name the checkpoint belongs to.
    pub job: String,
    /// First day of the window the interrupted run was processing.
    pub window_start: NaiveDate,
    /// Last day of that window.
    pub window_end: NaiveDate,
    /// Last day fully processed by a live (non-dry) run.
    pub last_completed_day: NaiveDate,
    /// When the checkpoint was written.
    pub updated_at: DateTime<Utc>,
}

impl JobCheckpoint {
    /// True if the checkpoint was written by a run over exactly this
    /// window. A checkpoint from any other window must not shrink the
    /// range a run scans.
    #[must_use]
    pub fn covers(&self, window: (NaiveDate, NaiveDate)) -> bool {
        (self.window_start, self.window_end) == window
    }
}

/// Loads the checkpoint for a job, if one exists.
///
/// # Errors
///
/// Returns a storage error if reading fails; a missing or corrupt
/// checkpoint is treated as absent (the job re-scans, which is safe).
pub async fn load_checkpoint(
    storage: &Arc<dyn StorageBackend>,
    job: &str,
) -> Result<Option<JobCheckpoint>> {
    let path = store_paths::job_checkpoint_path(job);
    match storage.get(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Stores the checkpoint for a job. Never called in dry-run mode.
///
/// # Errors
///
/// Returns a storage error if the write fails.
pub async fn save_checkpoint(
    storage: &Arc<dyn StorageBackend>,
    job: &str,
    window: (NaiveDate, NaiveDate),
    last_completed_day: NaiveDate,
) -> Result<()> {
    let checkpoint = JobCheckpoint {
        job: job.to_string(),
        window_start: window.0,
        window_end: window.1,
        last_completed_day,
        updated_at: Utc::now(),
    };
    let path = store_paths::job_checkpoint_path(job);
    let payload = Bytes::from(serde_json::to_vec(&checkpoint)?);
    storage.put(&path, payload, WritePrecondition::None).await?;
    Ok(())
}

/// Removes the checkpoint for a job once its window has fully completed,
/// so the marker cannot shrink a later run over a different window.
///
/// # Errors
///
/// Returns a storage error if the delete fails.
pub async fn clear_checkpoint(storage: &Arc<dyn StorageBackend>, job: &str) -> Result<()> {
    let path = store_paths::job_checkpoint_path(job);
    storage.delete(&path).await?;
    Ok(())
}

/// Iterates the days of `[start, end]` inclusive, oldest first.
pub(crate) fn days_in(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

