//! CLI command implementations.

pub mod backfill;
pub mod repair;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use owo_colors::OwoColorize;

use beacon_core::storage::{LocalFsBackend, StorageBackend};
use beacon_ingest::jobs::{JobOptions, JobReport};

use crate::{Config, OutputFormat};

/// Window and safety flags shared by both batch jobs.
#[derive(Debug, Args)]
pub struct JobWindowArgs {
    /// Number of days to scan, ending at --end-day inclusive.
    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Last day of the window (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long)]
    pub end_day: Option<NaiveDate>,

    /// Actually mutate storage. Without this flag the job is a dry run.
    #[arg(long)]
    pub live: bool,

    /// Wall-clock budget in seconds; the job checkpoints and stops cleanly
    /// when exceeded.
    #[arg(long)]
    pub max_duration: Option<u64>,
}

impl JobWindowArgs {
    /// Converts the flags into job options.
    #[must_use]
    pub fn options(&self) -> JobOptions {
        JobOptions {
            dry_run: !self.live,
            lookback_days: self.days,
            end_day: self.end_day,
            max_duration: self.max_duration.map(Duration::from_secs),
        }
    }
}

/// Opens the local storage backend rooted at the configured data dir.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or accessed.
pub fn open_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    let backend = LocalFsBackend::new(config.data_dir.clone())?;
    Ok(Arc::new(backend))
}

/// Prints a job report in the configured format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_report(report: &JobReport, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            if report.dry_run {
                println!("{} {}", report.job.bold(), "(dry run)".yellow());
            } else {
                println!("{}", report.job.bold());
            }
            println!();
            println!("  Days Scanned:  {}", report.days_scanned);
            println!("  Rows Examined: {}", report.rows_examined);
            if report.dry_run {
                println!("  Would Mutate:  {}", report.rows_mutated);
            } else {
                println!("  Rows Mutated:  {}", report.rows_mutated);
            }
            println!("  Rows Skipped:  {}", report.rows_skipped);
            if report.completed {
                println!("  Status:        {}", "completed".green());
            } else if let Some(resume) = report.resume_day {
                println!(
                    "  Status:        {} (resume from {resume})",
                    "stopped early".yellow()
                );
            } else {
                println!("  Status:        {}", "stopped early".yellow());
            }
            for error in &report.errors {
                eprintln!("  {} {error}", "error:".red());
            }
        }
    }
    Ok(())
}
