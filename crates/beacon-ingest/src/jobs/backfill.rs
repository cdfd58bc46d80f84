//! Gap backfill: reconstruct missing daily canonical events.
//!
//! A page view is a strong signal the app was open, but the `app_opened`
//! producer (client beacon or middleware ping) can fail to fire. For each
//! day in the window, any identity with `page_viewed` rows but no
//! `app_opened` row gets one synthesized, timestamped at the earliest page
//! view of that day and tagged `source_channel = backfill`.
//!
//! The synthesized event uses the same deterministic identifier as the
//! live path, so if live ingestion races the backfill window the
//! conditional write, not job logic, prevents duplication.

use std::collections::BTreeMap;
use std::time::Instant;

use beacon_core::event::{CanonicalEvent, EventKind, SourceChannel};
use beacon_core::id::EventId;
use beacon_core::identity::{AnonymousId, UserId};
use beacon_core::observability::job_span;
use beacon_core::store_paths;

use crate::error::Result;
use crate::jobs::{
    JobOptions, JobReport, clear_checkpoint, days_in, load_checkpoint, save_checkpoint,
};
use crate::metrics;
use crate::store::EventStore;
use crate::writer::{EventWriter, WriteOutcome};

/// Job name used for checkpoints and reporting.
pub const JOB_NAME: &str = "gap_backfill";

/// Reconstructs missing `app_opened` events from page views.
pub struct GapBackfill {
    store: EventStore,
    writer: EventWriter,
    options: JobOptions,
}

impl GapBackfill {
    /// Creates the job over the given store.
    #[must_use]
    pub fn new(store: EventStore, options: JobOptions) -> Self {
        let writer = EventWriter::new(store.backend());
        Self {
            store,
            writer,
            options,
        }
    }

    /// Runs the job over its window and returns the audit report.
    ///
    /// Storage failures abort the run; the returned report still carries
    /// everything committed so far plus the day to resume from.
    ///
    /// # Errors
    ///
    /// Returns an error only if the checkpoint itself cannot be read.
    pub async fn run(&self) -> Result<JobReport> {
        let span = job_span(JOB_NAME, self.options.dry_run);
        let _guard = span.enter();

        let started = Instant::now();
        let mut report = JobReport::new(JOB_NAME, self.options.dry_run);
        let (window_start, end) = self.options.window();

        // Resume an interrupted live run over this same window. Any other
        // checkpoint is ignored so old windows stay fully repairable.
        let start = if self.options.dry_run {
            window_start
        } else {
            match load_checkpoint(&self.store.backend(), JOB_NAME).await? {
                Some(checkpoint)
                    if checkpoint.covers((window_start, end))
                        && checkpoint.last_completed_day < end =>
                {
                    checkpoint.last_completed_day.succ_opt().unwrap_or(end)
                }
                _ => window_start,
            }
        };

        for day in days_in(start, end) {
            if let Some(budget) = self.options.max_duration {
                if started.elapsed() >= budget {
                    tracing::info!(%day, "max duration reached, stopping");
                    report.resume_day = Some(day);
                    return Ok(report);
                }
            }

            match self.process_day(day, &mut report).await {
                Ok(()) => {
                    report.days_scanned += 1;
                    if !self.options.dry_run {
                        save_checkpoint(&self.store.backend(), JOB_NAME, (window_start, end), day)
                            .await?;
                    }
                }
                Err(e) => {
                    tracing::error!(%day, error = %e, "backfill day failed, aborting");
                    report.errors.push(format!("{day}: {e}"));
                    report.resume_day = Some(day);
                    return Ok(report);
                }
            }
        }

        if !self.options.dry_run {
            clear_checkpoint(&self.store.backend(), JOB_NAME).await?;
        }
        report.completed = true;
        tracing::info!(
            days = report.days_scanned,
            synthesized = report.rows_mutated,
            skipped = report.rows_skipped,
            dry_run = report.dry_run,
            "gap backfill finished"
        );
        Ok(report)
    }

    async fn process_day(&self, day: chrono::NaiveDate, report: &mut JobReport) -> Result<()> {
        let page_views = self.store.list_day(EventKind::PageViewed, day).await?;
        report.rows_examined += page_views.len() as u64;
        metrics::record_job_progress(JOB_NAME, page_views.len() as u64, 0);

        // Earliest page view per identity; rows arrive sorted by time.
        let mut earliest: BTreeMap<&str, &CanonicalEvent> = BTreeMap::new();
        for view in &page_views {
            if let Some(key) = view.dedup_key() {
                earliest.entry(key).or_insert(view);
            }
        }

        for (key, view) in earliest {
            if self.covered(view, day).await? {
                report.rows_skipped += 1;
                continue;
            }

            if self.options.dry_run {
                tracing::info!(
                    identity = key,
                    %day,
                    occurred_at = %view.occurred_at,
                    "would synthesize app_opened"
                );
                report.rows_mutated += 1;
                continue;
            }

            let event = synthesize_app_open(view, key, day);
            match self.writer.write(&event).await? {
                WriteOutcome::Inserted { .. } => {
                    metrics::record_job_progress(JOB_NAME, 0, 1);
                    report.rows_mutated += 1;
                }
                // Live ingestion raced us inside the window. The
                // constraint held; nothing was duplicated.
                WriteOutcome::Skipped(_) => report.rows_skipped += 1,
            }
        }
        Ok(())
    }

    /// Returns true if any `app_opened` row already covers this identity
    /// and day, in either identity dimension.
    async fn covered(&self, view: &CanonicalEvent, day: chrono::NaiveDate) -> Result<bool> {
        let backend = self.store.backend();
        for key in [
            view.user_id.as_ref().map(UserId::as_str),
            view.anonymous_id.as_ref().map(AnonymousId::as_str),
        ]
        .into_iter()
        .flatten()
        {
            let id = EventId::deterministic(EventKind::AppOpened, key, day);
            let path = store_paths::event_path(EventKind::AppOpened, day, &id);
            if backend.head(&path).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn synthesize_app_open(view: &CanonicalEvent, key: &str, day: chrono::NaiveDate) -> CanonicalEvent {
    let mut metadata = beacon_core::metadata::MetadataMap::new();
    metadata.insert_str("backfilled_from", EventKind::PageViewed.as_str());

    CanonicalEvent {
        id: EventId::deterministic(EventKind::AppOpened, key, day),
        kind: EventKind::AppOpened,
        occurred_at: view.occurred_at,
        user_id: view.user_id.clone(),
        anonymous_id: view.anonymous_id.clone(),
        user_email: view.user_email.clone(),
        page_path: view.page_path.clone(),
        source_channel: SourceChannel::Backfill,
        metadata,
    }
}
