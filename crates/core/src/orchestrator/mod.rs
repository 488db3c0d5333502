//! Acquisition pipeline.
//!
//! The pipeline owns the manifest for the duration of a run and drives the
//! phases in priority order:
//! - **Enrichment**: backfills DOIs, never changes status
//! - **Terminal phases**: one record at a time, outcome persisted per record
//! - **Search fallback**: paced and rotated by a per-phase rotation controller
//! - **Rescue phases**: repositories, URL transform retry and opt-in
//!   publisher routes, which only ever upgrade an entry

mod collaborators;
mod config;
mod runner;
mod types;

pub use collaborators::Collaborators;
pub use config::{RunMode, RunOptions};
pub use runner::{resolve_outcome, Pipeline, StopHandle};
pub use types::{PhaseReport, PipelineError, RotationSummary, RunReport};
