//! # beacon-cli
//!
//! Operator command-line interface for the Beacon batch jobs.
//!
//! ## Commands
//!
//! - `beacon backfill` - Synthesize app-open rows missing from historical days
//! - `beacon repair` - Collapse duplicate rows for a daily-unique kind
//!
//! ## Configuration
//!
//! - `BEACON_DATA_DIR` - Storage root directory (or `--data-dir`)
//!
//! Both jobs default to dry-run; pass `--live` to mutate storage.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Beacon CLI - batch job entrypoint for the event store.
#[derive(Debug, Parser)]
#[command(name = "beacon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Storage root directory.
    #[arg(long, env = "BEACON_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            data_dir: self.data_dir.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synthesize missing app-open rows from historical page views.
    Backfill(commands::backfill::BackfillArgs),
    /// Collapse duplicate rows for a daily-unique kind.
    Repair(commands::repair::RepairArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage root directory.
    pub data_dir: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}
