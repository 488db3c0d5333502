//! External metadata and search providers.
//!
//! Every provider sits behind a small async trait so the strategies and the
//! orchestrator can be driven by the mocks in [`crate::testing`]. Concrete
//! clients talk to Semantic Scholar, Unpaywall, Google Scholar, Crossref and
//! the open repositories (CORE, Europe PMC, arXiv).

mod arxiv;
mod core_api;
mod crossref;
mod europepmc;
mod identifiers;
mod scholar;
mod semantic_scholar;
mod unpaywall;

pub use arxiv::{parse_feed, titles_match, ArxivClient, ArxivEntry};
pub use core_api::CoreClient;
pub use crossref::CrossrefClient;
pub use europepmc::EuropePmcClient;
pub use identifiers::{extract_doi, normalize_doi};
pub use scholar::{parse_results_page, ScholarPage, ScholarSearch};
pub use semantic_scholar::SemanticScholarClient;
pub use unpaywall::UnpaywallClient;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::Record;
use crate::fetch::Outcome;

/// Errors that can occur when calling an external provider.
#[derive(Debug, Error)]
pub enum LookupError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider signalled rate limiting (HTTP 429, CAPTCHA page).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// API returned an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Client not configured (missing contact address, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl LookupError {
    /// Convert into a strategy outcome.
    pub fn into_outcome(self) -> Outcome {
        match &self {
            LookupError::RateLimited(_) => Outcome::rate_limited(self.to_string()),
            LookupError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                Outcome::transient(self.to_string())
            }
            LookupError::Http(_) => Outcome::transient(self.to_string()),
            LookupError::Api { status, .. } if *status >= 500 => {
                Outcome::transient(self.to_string())
            }
            LookupError::Api { .. } | LookupError::Parse(_) | LookupError::NotConfigured(_) => {
                Outcome::permanent(self.to_string())
            }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LookupError::RateLimited(_))
    }
}

/// Resolves a record's known open-access PDF link.
pub trait OpenAccessResolver: Send + Sync {
    fn resolve(&self, record: &Record) -> Option<String>;
}

/// Uses the link carried by the record itself.
pub struct RecordLinkResolver;

impl OpenAccessResolver for RecordLinkResolver {
    fn resolve(&self, record: &Record) -> Option<String> {
        record
            .pdf_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }
}

/// Citation-graph batch lookup of external identifiers.
#[async_trait]
pub trait CitationGraph: Send + Sync {
    /// Look up DOIs for one batch of record identifiers. Records without a
    /// known DOI are absent from the result.
    async fn lookup_identifiers(
        &self,
        record_ids: &[String],
    ) -> Result<HashMap<String, String>, LookupError>;
}

/// Legal open-access lookup by DOI.
#[async_trait]
pub trait OaLookup: Send + Sync {
    /// Best open-access PDF URL for `doi`, if any.
    async fn lookup(&self, doi: &str) -> Result<Option<String>, LookupError>;
}

/// Title search returning the top result's PDF link.
#[async_trait]
pub trait TitleSearch: Send + Sync {
    /// PDF link of the best match for `title`, if one exists. Rate limiting
    /// is reported as [`LookupError::RateLimited`].
    async fn search(&self, title: &str) -> Result<Option<String>, LookupError>;
}

/// Publisher metadata lookup yielding candidate PDF links for a DOI.
#[async_trait]
pub trait PdfLocator: Send + Sync {
    async fn locate(&self, doi: &str) -> Result<Vec<String>, LookupError>;
}

/// Open repository search for a deposited copy of a work.
#[async_trait]
pub trait RepositorySearch: Send + Sync {
    /// PDF link for the work. Repositories that index DOIs try `doi` before
    /// falling back to `title`.
    async fn find_pdf(&self, doi: Option<&str>, title: &str)
        -> Result<Option<String>, LookupError>;
}
