//! Types for the acquisition pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::{ManifestError, ManifestStats, Status};
use crate::rotation::{RotationMode, VpnError};
use crate::strategy::{EnrichmentReport, PhaseKind};

/// Errors that abort a run. Everything else is recorded per record.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Manifest could not be read or written.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Missing or invalid settings for the planned phases.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A collaborator client could not be constructed.
    #[error("failed to set up {component}: {message}")]
    Setup { component: String, message: String },

    /// VPN requested but unusable.
    #[error("VPN error: {0}")]
    Vpn(#[from] VpnError),
}

impl PipelineError {
    pub fn setup(component: impl Into<String>, error: impl std::fmt::Display) -> Self {
        PipelineError::Setup {
            component: component.into(),
            message: error.to_string(),
        }
    }

    pub fn is_corrupt_manifest(&self) -> bool {
        matches!(self, PipelineError::Manifest(ManifestError::Corrupt { .. }))
    }
}

/// What one phase did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    /// Records eligible at phase start.
    pub eligible: usize,
    pub processed: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub not_found: usize,
    /// Processed records whose entry was left as it was.
    pub unchanged: usize,
    /// The phase was planned but had no collaborator to run with.
    pub skipped: bool,
    /// The phase stopped early after repeated rate limiting.
    pub abandoned: bool,
}

impl PhaseReport {
    pub fn new(phase: PhaseKind) -> Self {
        Self {
            phase,
            eligible: 0,
            processed: 0,
            downloaded: 0,
            failed: 0,
            not_found: 0,
            unchanged: 0,
            skipped: false,
            abandoned: false,
        }
    }

    pub fn skipped(phase: PhaseKind) -> Self {
        Self {
            skipped: true,
            ..Self::new(phase)
        }
    }

    pub(crate) fn record(&mut self, new_status: Option<Status>) {
        self.processed += 1;
        match new_status {
            Some(Status::Downloaded) => self.downloaded += 1,
            Some(Status::Failed) => self.failed += 1,
            Some(Status::NotFound) => self.not_found += 1,
            Some(Status::Pending) | None => self.unchanged += 1,
        }
    }
}

/// Rotation activity during the search phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationSummary {
    pub mode: RotationMode,
    pub rotations: u32,
    pub failures: u32,
    pub last_location: Option<String>,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub phases: Vec<PhaseReport>,
    pub enrichment: Option<EnrichmentReport>,
    pub rotation: Option<RotationSummary>,
    /// Entries returned to `pending` by retry requests.
    pub reopened: usize,
    /// The run stopped early on a shutdown request.
    pub interrupted: bool,
    pub stats: ManifestStats,
}

impl RunReport {
    pub fn phase(&self, phase: PhaseKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_report_tally() {
        let mut report = PhaseReport::new(PhaseKind::SearchFallback);
        report.record(Some(Status::Downloaded));
        report.record(Some(Status::NotFound));
        report.record(None);
        assert_eq!(report.processed, 3);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::from(ConfigError::ValidationError("missing email".into()));
        assert_eq!(
            err.to_string(),
            "configuration error: Configuration validation failed: missing email"
        );

        let err = PipelineError::Manifest(ManifestError::Corrupt {
            location: "m.json".into(),
            reason: "eof".into(),
        });
        assert!(err.is_corrupt_manifest());
    }
}
