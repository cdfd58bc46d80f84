//! Duplicate repair: purge rows that predate the dedup guarantee.
//!
//! Before deterministic identifiers, retries and multiple producers could
//! store the same logical occurrence several times. For each (kind,
//! identity, day) group this job keeps the row with the earliest
//! `occurred_at` (ties broken by lowest identifier) and deletes the rest.
//!
//! Grouping runs separately per identity dimension (`user_id` rows, then
//! `anonymous_id` rows), because a user may carry both kinds of rows from
//! before identity resolution matured.

use std::collections::HashSet;
use std::time::Instant;

use beacon_core::event::EventKind;
use beacon_core::id::EventId;
use beacon_core::observability::job_span;

use crate::error::Result;
use crate::jobs::{
    JobOptions, JobReport, clear_checkpoint, days_in, load_checkpoint, save_checkpoint,
};
use crate::metrics;
use crate::store::{EventStore, IdentityDimension};

/// Removes historical duplicate rows for one event kind.
pub struct DuplicateRepair {
    store: EventStore,
    kind: EventKind,
    options: JobOptions,
}

impl DuplicateRepair {
    /// Creates the job for the given kind.
    #[must_use]
    pub fn new(store: EventStore, kind: EventKind, options: JobOptions) -> Self {
        Self {
            store,
            kind,
            options,
        }
    }

    fn job_name(&self) -> String {
        format!("duplicate_repair_{}", self.kind.as_str())
    }

    /// Runs the job over its window and returns the audit report.
    ///
    /// Storage failures abort the run; the report carries the committed
    /// counts and the day to resume from.
    ///
    /// # Errors
    ///
    /// Returns an error only if the checkpoint itself cannot be read.
    pub async fn run(&self) -> Result<JobReport> {
        let job = self.job_name();
        let span = job_span(&job, self.options.dry_run);
        let _guard = span.enter();

        let started = Instant::now();
        let mut report = JobReport::new(&job, self.options.dry_run);
        let (window_start, end) = self.options.window();

        // Resume an interrupted live run over this same window only.
        let start = if self.options.dry_run {
            window_start
        } else {
            match load_checkpoint(&self.store.backend(), &job).await? {
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
                        save_checkpoint(&self.store.backend(), &job, (window_start, end), day)
                            .await?;
                    }
                }
                Err(e) => {
                    tracing::error!(%day, error = %e, "repair day failed, aborting");
                    report.errors.push(format!("{day}: {e}"));
                    report.resume_day = Some(day);
                    return Ok(report);
                }
            }
        }

        if !self.options.dry_run {
            clear_checkpoint(&self.store.backend(), &job).await?;
        }
        report.completed = true;
        tracing::info!(
            days = report.days_scanned,
            deleted = report.rows_mutated,
            dry_run = report.dry_run,
            "duplicate repair finished"
        );
        Ok(report)
    }

    async fn process_day(&self, day: chrono::NaiveDate, report: &mut JobReport) -> Result<()> {
        // Rows arrive sorted by (occurred_at, id): the keeper is always
        // the first surviving row of a group.
        let rows = self.store.list_day(self.kind, day).await?;
        report.rows_examined += rows.len() as u64;
        metrics::record_job_progress(&self.job_name(), rows.len() as u64, 0);

        let mut deleted: HashSet<EventId> = HashSet::new();

        for dimension in [IdentityDimension::User, IdentityDimension::Anonymous] {
            let groups = EventStore::group_by_identity(&rows, dimension);
            for (identity, members) in groups {
                let survivors: Vec<_> = members
                    .into_iter()
                    .filter(|e| !deleted.contains(&e.id))
                    .collect();

                if survivors.len() <= 1 {
                    report.rows_skipped += survivors.len() as u64;
                    continue;
                }

                for duplicate in &survivors[1..] {
                    if self.options.dry_run {
                        tracing::info!(
                            identity,
                            %day,
                            event_id = %duplicate.id,
                            "would delete duplicate row"
                        );
                    } else {
                        self.store.delete(duplicate).await?;
                        metrics::record_job_progress(&self.job_name(), 0, 1);
                    }
                    deleted.insert(duplicate.id.clone());
                    report.rows_mutated += 1;
                }
                report.rows_skipped += 1;
            }
        }
        Ok(())
    }
}
