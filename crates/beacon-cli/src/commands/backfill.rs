//! Backfill command - synthesize missing app-open rows.

use anyhow::Result;
use clap::Args;

use beacon_ingest::jobs::GapBackfill;
use beacon_ingest::store::EventStore;

use super::{open_backend, print_report, JobWindowArgs};
use crate::Config;

/// Arguments for the backfill command.
#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Window and safety flags.
    #[command(flatten)]
    pub window: JobWindowArgs,
}

/// Execute the backfill command.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or the job fails before
/// producing a report.
pub async fn execute(args: BackfillArgs, config: &Config) -> Result<()> {
    let backend = open_backend(config)?;
    let store = EventStore::new(backend);

    let job = GapBackfill::new(store, args.window.options());
    let report = job.run().await?;

    print_report(&report, config)
}
