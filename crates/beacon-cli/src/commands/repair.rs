//! Repair command - collapse duplicate rows for a daily-unique kind.

use anyhow::Result;
use clap::Args;

use beacon_core::event::EventKind;
use beacon_ingest::jobs::DuplicateRepair;
use beacon_ingest::store::EventStore;

use super::{open_backend, print_report, JobWindowArgs};
use crate::Config;

/// Arguments for the repair command.
#[derive(Debug, Args)]
pub struct RepairArgs {
    /// Event kind to repair. Must be one of the daily-unique kinds.
    #[arg(long)]
    pub kind: EventKind,

    /// Window and safety flags.
    #[command(flatten)]
    pub window: JobWindowArgs,
}

/// Execute the repair command.
///
/// # Errors
///
/// Returns an error if the kind is not daily-unique, storage cannot be
/// opened, or the job fails before producing a report.
pub async fn execute(args: RepairArgs, config: &Config) -> Result<()> {
    if !args.kind.daily_dedup() {
        anyhow::bail!(
            "kind '{}' is not daily-unique; nothing to repair",
            args.kind.as_str()
        );
    }

    let backend = open_backend(config)?;
    let store = EventStore::new(backend);

    let job = DuplicateRepair::new(store, args.kind, args.window.options());
    let report = job.run().await?;

    print_report(&report, config)
}
