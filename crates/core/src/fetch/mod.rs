//! Fetch layer - strategy outcomes, retry policy, and PDF download.

mod download;
mod retry;

pub use download::{
    validate_pdf, ArtifactStore, Downloader, FetchError, HttpFetcher, PdfFetcher, PDF_MAGIC,
};
pub use retry::RetryPolicy;

use std::path::PathBuf;

use crate::manifest::Source;

/// Result of one strategy attempt for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A validated artifact was stored.
    Success {
        source: Source,
        resolved_url: String,
        artifact_path: PathBuf,
    },
    /// No candidate URL was located.
    NotFound,
    /// Network fault, timeout or rate limit. Eligible for retry.
    TransientFailure {
        reason: String,
        rate_limited: bool,
        url: Option<String>,
    },
    /// Content failed validation or the resource is gone.
    PermanentFailure { reason: String, url: Option<String> },
}

impl Outcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Outcome::TransientFailure {
            reason: reason.into(),
            rate_limited: false,
            url: None,
        }
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Outcome::TransientFailure {
            reason: reason.into(),
            rate_limited: true,
            url: None,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Outcome::PermanentFailure {
            reason: reason.into(),
            url: None,
        }
    }

    /// Attach the URL that was attempted to a failure outcome.
    pub fn with_url(self, attempted: impl Into<String>) -> Self {
        match self {
            Outcome::TransientFailure {
                reason,
                rate_limited,
                ..
            } => Outcome::TransientFailure {
                reason,
                rate_limited,
                url: Some(attempted.into()),
            },
            Outcome::PermanentFailure { reason, .. } => Outcome::PermanentFailure {
                reason,
                url: Some(attempted.into()),
            },
            other => other,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Outcome::TransientFailure { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Outcome::TransientFailure {
                rate_limited: true,
                ..
            }
        )
    }

    /// URL attempted by a failed outcome, if recorded.
    pub fn attempted_url(&self) -> Option<&str> {
        match self {
            Outcome::TransientFailure { url, .. } | Outcome::PermanentFailure { url, .. } => {
                url.as_deref()
            }
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::NotFound => "not_found",
            Outcome::TransientFailure {
                rate_limited: true, ..
            } => "rate_limited",
            Outcome::TransientFailure { .. } => "transient",
            Outcome::PermanentFailure { .. } => "permanent",
        }
    }
}
