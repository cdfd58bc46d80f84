//! Pipeline metrics.
//!
//! Counters complement the structured logging already in place; they are
//! emitted through the `metrics` facade and picked up by whatever recorder
//! the host process installs.

use metrics::{counter, describe_counter};

/// Events inserted counter.
pub const EVENTS_INSERTED: &str = "beacon_events_inserted_total";

/// Events skipped counter.
pub const EVENTS_SKIPPED: &str = "beacon_events_skipped_total";

/// Stitch observations enqueued counter.
pub const STITCH_ENQUEUED: &str = "beacon_stitch_enqueued_total";

/// Stitch observations dropped (queue full) counter.
pub const STITCH_DROPPED: &str = "beacon_stitch_dropped_total";

/// Stitch write failures counter.
pub const STITCH_FAILURES: &str = "beacon_stitch_failures_total";

/// Batch job rows examined counter.
pub const JOB_ROWS_EXAMINED: &str = "beacon_job_rows_examined_total";

/// Batch job rows mutated counter.
pub const JOB_ROWS_MUTATED: &str = "beacon_job_rows_mutated_total";

/// Registers all pipeline metric descriptions.
///
/// Call once at application startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(EVENTS_INSERTED, "Total canonical events inserted");
    describe_counter!(EVENTS_SKIPPED, "Total ingestion requests skipped");
    describe_counter!(STITCH_ENQUEUED, "Total stitch observations enqueued");
    describe_counter!(STITCH_DROPPED, "Total stitch observations dropped");
    describe_counter!(STITCH_FAILURES, "Total stitch write failures");
    describe_counter!(JOB_ROWS_EXAMINED, "Total rows examined by batch jobs");
    describe_counter!(JOB_ROWS_MUTATED, "Total rows mutated by batch jobs");
}

/// Records an inserted event.
pub fn record_insert(kind: &str, channel: &str) {
    let labels = [
        ("kind", kind.to_string()),
        ("channel", channel.to_string()),
    ];
    counter!(EVENTS_INSERTED, &labels).increment(1);
}

/// Records a skipped ingestion request.
pub fn record_skip(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(EVENTS_SKIPPED, &labels).increment(1);
}

/// Records stitch queue activity.
pub fn record_stitch_enqueued() {
    counter!(STITCH_ENQUEUED).increment(1);
}

/// Records a dropped stitch observation.
pub fn record_stitch_dropped() {
    counter!(STITCH_DROPPED).increment(1);
}

/// Records a failed stitch write.
pub fn record_stitch_failure() {
    counter!(STITCH_FAILURES).increment(1);
}

/// Records batch job progress.
pub fn record_job_progress(job: &str, examined: u64, mutated: u64) {
    let labels = [("job", job.to_string())];
    counter!(JOB_ROWS_EXAMINED, &labels).increment(examined);
    counter!(JOB_ROWS_MUTATED, &labels).increment(mutated);
}
