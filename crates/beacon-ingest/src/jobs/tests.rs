//! Unit tests for the batch jobs against the in-memory backend.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use beacon_core::event::{CanonicalEvent, EventKind, SourceChannel};
use beacon_core::id::EventId;
use beacon_core::identity::{AnonymousId, UserId};
use beacon_core::metadata::MetadataMap;
use beacon_core::storage::{MemoryBackend, StorageBackend};

use crate::jobs::{DuplicateRepair, GapBackfill, JobOptions, save_checkpoint};
use crate::store::EventStore;
use crate::writer::EventWriter;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 19).unwrap()
}

#[test]
fn test_window_is_inclusive() {
    let options = JobOptions {
        lookback_days: 3,
        end_day: Some(day()),
        ..JobOptions::default()
    };
    let (start, end) = options.window();
    assert_eq!(start, NaiveDate::from_ymd_opt(2026, 2, 17).unwrap());
    assert_eq!(end, day());
    assert_eq!(crate::jobs::days_in(start, end).count(), 3);
}

#[test]
fn test_zero_lookback_still_covers_end_day() {
    let options = JobOptions {
        lookback_days: 0,
        end_day: Some(day()),
        ..JobOptions::default()
    };
    let (start, end) = options.window();
    assert_eq!(start, end);
}

fn options(dry_run: bool) -> JobOptions {
    JobOptions {
        dry_run,
        lookback_days: 1,
        end_day: Some(day()),
        max_duration: None,
    }
}

fn page_view(anon: &str, hour: u32, minute: u32) -> CanonicalEvent {
    CanonicalEvent {
        id: EventId::random(),
        kind: EventKind::PageViewed,
        occurred_at: Utc.with_ymd_and_hms(2026, 2, 19, hour, minute, 0).unwrap(),
        user_id: None,
        anonymous_id: Some(AnonymousId::new(anon).unwrap()),
        user_email: None,
        page_path: Some("/tarot".into()),
        source_channel: SourceChannel::ServerPageview,
        metadata: MetadataMap::new(),
    }
}

fn app_open_row(id: EventId, user: Option<&str>, anon: Option<&str>, hour: u32) -> CanonicalEvent {
    CanonicalEvent {
        id,
        kind: EventKind::AppOpened,
        occurred_at: Utc.with_ymd_and_hms(2026, 2, 19, hour, 0, 0).unwrap(),
        user_id: user.map(|u| UserId::new(u).unwrap()),
        anonymous_id: anon.map(|a| AnonymousId::new(a).unwrap()),
        user_email: None,
        page_path: None,
        source_channel: SourceChannel::Client,
        metadata: MetadataMap::new(),
    }
}

fn app_open_row_on(on: NaiveDate, id: EventId, anon: Option<&str>, hour: u32) -> CanonicalEvent {
    let occurred_at = on
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_local_timezone(Utc)
        .unwrap();
    CanonicalEvent {
        occurred_at,
        ..app_open_row(id, None, anon, hour)
    }
}

async fn seed(backend: &Arc<MemoryBackend>, events: &[CanonicalEvent]) {
    // Seed directly, bypassing the writer's dedup, to model the
    // pre-guarantee era the repair job exists for.
    for event in events {
        let path = beacon_core::store_paths::event_path(
            event.kind,
            event.occurred_day(),
            &event.id,
        );
        backend
            .put(
                &path,
                bytes::Bytes::from(serde_json::to_vec(event).unwrap()),
                beacon_core::storage::WritePrecondition::None,
            )
            .await
            .expect("seed");
    }
}

fn store(backend: &Arc<MemoryBackend>) -> EventStore {
    EventStore::new(backend.clone() as Arc<dyn StorageBackend>)
}

#[tokio::test]
async fn test_backfill_dry_run_reports_without_writing() {
    let backend = Arc::new(MemoryBackend::new());
    let views: Vec<_> = [9, 10, 11, 14, 20]
        .iter()
        .map(|h| page_view("a1", *h, 0))
        .collect();
    seed(&backend, &views).await;

    let job = GapBackfill::new(store(&backend), options(true));
    let report = job.run().await.expect("run");

    assert!(report.completed);
    assert_eq!(report.rows_examined, 5);
    // One identity, one missing app_open: one would-be synthesis.
    assert_eq!(report.rows_mutated, 1);

    // Dry run wrote nothing.
    let stored = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_backfill_synthesizes_at_earliest_page_view() {
    let backend = Arc::new(MemoryBackend::new());
    let views: Vec<_> = [14, 9, 20].iter().map(|h| page_view("a1", *h, 30)).collect();
    seed(&backend, &views).await;

    let job = GapBackfill::new(store(&backend), options(false));
    let report = job.run().await.expect("run");
    assert_eq!(report.rows_mutated, 1);

    let stored = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert_eq!(stored.len(), 1);
    let synthesized = &stored[0];
    assert_eq!(
        synthesized.occurred_at,
        Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap()
    );
    assert_eq!(synthesized.source_channel, SourceChannel::Backfill);
    assert_eq!(
        synthesized.id,
        EventId::deterministic(EventKind::AppOpened, "a1", day())
    );
}

#[tokio::test]
async fn test_backfill_over_covered_window_is_a_noop() {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &[page_view("a1", 9, 0)]).await;

    // Live path already recorded the app open.
    let writer = EventWriter::new(backend.clone() as Arc<dyn StorageBackend>);
    let live = app_open_row(
        EventId::deterministic(EventKind::AppOpened, "a1", day()),
        None,
        Some("a1"),
        8,
    );
    writer.write(&live).await.expect("live write");

    let job = GapBackfill::new(store(&backend), options(false));
    let report = job.run().await.expect("run");
    assert_eq!(report.rows_mutated, 0);
    assert_eq!(report.rows_skipped, 1);

    // Idempotence: a second run also changes nothing.
    let again = GapBackfill::new(store(&backend), options(false))
        .run()
        .await
        .expect("rerun");
    assert_eq!(again.rows_mutated, 0);
}

#[tokio::test]
async fn test_repair_keeps_earliest_row() {
    let backend = Arc::new(MemoryBackend::new());
    // Three pre-dedup rows for the same identity and day, random ids.
    let rows = vec![
        app_open_row(EventId::random(), None, Some("a1"), 12),
        app_open_row(EventId::random(), None, Some("a1"), 7),
        app_open_row(EventId::random(), None, Some("a1"), 18),
    ];
    let earliest_time = Utc.with_ymd_and_hms(2026, 2, 19, 7, 0, 0).unwrap();
    seed(&backend, &rows).await;

    let job = DuplicateRepair::new(store(&backend), EventKind::AppOpened, options(false));
    let report = job.run().await.expect("run");
    assert_eq!(report.rows_examined, 3);
    assert_eq!(report.rows_mutated, 2);

    let remaining = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].occurred_at, earliest_time);

    // Converged: rerun deletes nothing.
    let again = DuplicateRepair::new(store(&backend), EventKind::AppOpened, options(false))
        .run()
        .await
        .expect("rerun");
    assert_eq!(again.rows_mutated, 0);
}

#[tokio::test]
async fn test_repair_ties_break_by_lowest_id() {
    let backend = Arc::new(MemoryBackend::new());
    let rows = vec![
        app_open_row(EventId::from_string("bbb"), None, Some("a1"), 9),
        app_open_row(EventId::from_string("aaa"), None, Some("a1"), 9),
    ];
    seed(&backend, &rows).await;

    DuplicateRepair::new(store(&backend), EventKind::AppOpened, options(false))
        .run()
        .await
        .expect("run");

    let remaining = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, EventId::from_string("aaa"));
}

#[tokio::test]
async fn test_repair_handles_both_identity_dimensions() {
    let backend = Arc::new(MemoryBackend::new());
    // Pre-maturity data: one user-keyed row and one anon-keyed row per
    // duplicate pair, plus a joint row.
    let rows = vec![
        app_open_row(EventId::from_string("r1"), Some("u1"), None, 8),
        app_open_row(EventId::from_string("r2"), Some("u1"), None, 10),
        app_open_row(EventId::from_string("r3"), None, Some("a1"), 9),
        app_open_row(EventId::from_string("r4"), None, Some("a1"), 11),
    ];
    seed(&backend, &rows).await;

    let report = DuplicateRepair::new(store(&backend), EventKind::AppOpened, options(false))
        .run()
        .await
        .expect("run");
    assert_eq!(report.rows_mutated, 2);

    let remaining = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    let ids: Vec<_> = remaining.iter().map(|e| e.id.as_str().to_string()).collect();
    assert!(ids.contains(&"r1".to_string()));
    assert!(ids.contains(&"r3".to_string()));
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_repair_dry_run_deletes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let rows = vec![
        app_open_row(EventId::random(), None, Some("a1"), 9),
        app_open_row(EventId::random(), None, Some("a1"), 10),
    ];
    seed(&backend, &rows).await;

    let report = DuplicateRepair::new(store(&backend), EventKind::AppOpened, options(true))
        .run()
        .await
        .expect("run");
    assert_eq!(report.rows_mutated, 1);
    assert!(report.dry_run);

    let remaining = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_completed_run_clears_checkpoint_and_rerun_rescans() {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &[page_view("a1", 9, 0)]).await;

    let live = JobOptions {
        dry_run: false,
        lookback_days: 3,
        end_day: Some(day()),
        max_duration: None,
    };
    let report = GapBackfill::new(store(&backend), live.clone())
        .run()
        .await
        .expect("run");
    assert!(report.completed);
    assert_eq!(report.days_scanned, 3);
    assert_eq!(report.rows_mutated, 1);

    // Completion removes the resume marker.
    let marker = beacon_core::store_paths::job_checkpoint_path(super::backfill::JOB_NAME);
    assert!(backend.head(&marker).await.expect("head").is_none());

    // A rerun scans the whole window again and converges with no writes.
    let rerun = GapBackfill::new(store(&backend), live).run().await.expect("rerun");
    assert!(rerun.completed);
    assert_eq!(rerun.days_scanned, 3);
    assert_eq!(rerun.rows_mutated, 0);
}

#[tokio::test]
async fn test_interrupted_run_resumes_within_its_window() {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &[page_view("a1", 9, 0)]).await;
    let dyn_backend = backend.clone() as Arc<dyn StorageBackend>;

    // An earlier live run over this window stopped after Feb 18.
    let window = (NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(), day());
    save_checkpoint(
        &dyn_backend,
        super::backfill::JOB_NAME,
        window,
        NaiveDate::from_ymd_opt(2026, 2, 18).unwrap(),
    )
    .await
    .expect("save checkpoint");

    let live = JobOptions {
        dry_run: false,
        lookback_days: 3,
        end_day: Some(day()),
        max_duration: None,
    };
    let report = GapBackfill::new(store(&backend), live).run().await.expect("run");
    assert!(report.completed);
    // Only the remaining day of the window is scanned.
    assert_eq!(report.days_scanned, 1);
    assert_eq!(report.rows_mutated, 1);
}

#[tokio::test]
async fn test_checkpoint_from_newer_window_does_not_block_older_window() {
    let backend = Arc::new(MemoryBackend::new());
    let old_day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
    seed(
        &backend,
        &[
            app_open_row_on(old_day, EventId::random(), Some("a1"), 9),
            app_open_row_on(old_day, EventId::random(), Some("a1"), 14),
        ],
    )
    .await;

    // A truncated run over a recent window left its marker behind.
    let dyn_backend = backend.clone() as Arc<dyn StorageBackend>;
    save_checkpoint(
        &dyn_backend,
        "duplicate_repair_app_opened",
        (NaiveDate::from_ymd_opt(2026, 2, 18).unwrap(), day()),
        NaiveDate::from_ymd_opt(2026, 2, 18).unwrap(),
    )
    .await
    .expect("save checkpoint");

    // Historical drift is repaired offline: the older window must be
    // scanned in full despite the newer marker.
    let live = JobOptions {
        dry_run: false,
        lookback_days: 2,
        end_day: Some(NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()),
        max_duration: None,
    };
    let report = DuplicateRepair::new(store(&backend), EventKind::AppOpened, live)
        .run()
        .await
        .expect("run");
    assert!(report.completed);
    assert_eq!(report.days_scanned, 2);
    assert_eq!(report.rows_mutated, 1);

    let remaining = store(&backend)
        .list_day(EventKind::AppOpened, old_day)
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_dry_run_ignores_checkpoints() {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &[page_view("a1", 9, 0)]).await;

    // A marker claiming the whole window is done must not shrink an audit.
    let dyn_backend = backend.clone() as Arc<dyn StorageBackend>;
    let window = (NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(), day());
    save_checkpoint(&dyn_backend, super::backfill::JOB_NAME, window, day())
        .await
        .expect("save checkpoint");

    let audit = JobOptions {
        dry_run: true,
        lookback_days: 3,
        end_day: Some(day()),
        max_duration: None,
    };
    let report = GapBackfill::new(store(&backend), audit).run().await.expect("run");
    assert!(report.completed);
    assert_eq!(report.days_scanned, 3);
    assert_eq!(report.rows_mutated, 1);
}

#[tokio::test]
async fn test_max_duration_time_boxes_the_run() {
    let backend = Arc::new(MemoryBackend::new());
    seed(&backend, &[page_view("a1", 9, 0)]).await;

    let live = JobOptions {
        dry_run: false,
        lookback_days: 3,
        end_day: Some(day()),
        max_duration: Some(std::time::Duration::ZERO),
    };
    let report = GapBackfill::new(store(&backend), live).run().await.expect("run");

    // An exhausted budget stops before the first day and names it.
    assert!(!report.completed);
    assert_eq!(report.days_scanned, 0);
    assert_eq!(
        report.resume_day,
        Some(NaiveDate::from_ymd_opt(2026, 2, 17).unwrap())
    );

    let stored = store(&backend)
        .list_day(EventKind::AppOpened, day())
        .await
        .expect("list");
    assert!(stored.is_empty());
}
