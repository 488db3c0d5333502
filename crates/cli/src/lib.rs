//! Command-line surface for the paperchase acquisition pipeline.
//!
//! The binary is a thin wrapper: argument parsing lives here, the commands
//! in [`commands`] load configuration and the manifest and call into
//! `paperchase-core`.

pub mod commands;
pub mod metrics;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::download::DownloadArgs;
use commands::export::ExportArgs;
use commands::stats::StatsArgs;

/// Default configuration file, used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "paperchase.toml";

/// Resumable multi-strategy PDF acquisition for bibliographic records.
#[derive(Debug, Parser)]
#[command(name = "paperchase", version, about)]
pub struct Cli {
    /// Configuration file (TOML). Environment variables prefixed
    /// `PAPERCHASE_` override its values.
    #[arg(long, short = 'c', global = true, env = "PAPERCHASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the download pipeline over every record.
    Download(DownloadArgs),
    /// Show download statistics from the manifest.
    Stats(StatsArgs),
    /// Export records that still lack a PDF to CSV for manual download.
    ExportRemaining(ExportArgs),
}
