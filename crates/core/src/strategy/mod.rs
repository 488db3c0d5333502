//! Acquisition strategies.
//!
//! Each phase of a run applies one [`Strategy`] to the records it deems
//! eligible. Strategies never touch the manifest: they return an
//! [`Outcome`](crate::fetch::Outcome) and the orchestrator decides what
//! becomes of the entry.

mod enrichment;
mod legal_oa;
mod open_access;
mod repository;
mod rescue;
mod search;
mod url_rules;
mod url_transform;

pub use enrichment::{EnrichmentReport, IdentifierEnricher};
pub use legal_oa::LegalOaLookup;
pub use open_access::OpenAccessDirect;
pub use repository::RepositoryRescue;
pub use rescue::{CrossrefRescue, InstitutionalProxyRescue};
pub use search::SearchFallback;
pub use url_rules::{matching_rules, transform_candidates};
pub use url_transform::UrlTransform;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::catalog::Record;
use crate::fetch::Outcome;
use crate::manifest::ManifestEntry;

/// Phases of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Enrichment,
    OpenAccess,
    LegalOa,
    UrlTransform,
    SearchFallback,
    #[serde(rename = "core")]
    CoreRepository,
    #[serde(rename = "europepmc")]
    EuropePmc,
    Arxiv,
    UrlTransformRetry,
    Crossref,
    InstitutionalProxy,
}

impl PhaseKind {
    pub const ORDER: [PhaseKind; 11] = [
        PhaseKind::Enrichment,
        PhaseKind::OpenAccess,
        PhaseKind::LegalOa,
        PhaseKind::UrlTransform,
        PhaseKind::SearchFallback,
        PhaseKind::CoreRepository,
        PhaseKind::EuropePmc,
        PhaseKind::Arxiv,
        PhaseKind::UrlTransformRetry,
        PhaseKind::Crossref,
        PhaseKind::InstitutionalProxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Enrichment => "enrichment",
            PhaseKind::OpenAccess => "open_access",
            PhaseKind::LegalOa => "legal_oa",
            PhaseKind::UrlTransform => "url_transform",
            PhaseKind::SearchFallback => "search_fallback",
            PhaseKind::CoreRepository => "core",
            PhaseKind::EuropePmc => "europepmc",
            PhaseKind::Arxiv => "arxiv",
            PhaseKind::UrlTransformRetry => "url_transform_retry",
            PhaseKind::Crossref => "crossref",
            PhaseKind::InstitutionalProxy => "institutional_proxy",
        }
    }

    /// Rescue phases run after search and may only upgrade an entry to
    /// `downloaded`.
    pub fn is_rescue(&self) -> bool {
        matches!(
            self,
            PhaseKind::CoreRepository
                | PhaseKind::EuropePmc
                | PhaseKind::Arxiv
                | PhaseKind::UrlTransformRetry
                | PhaseKind::Crossref
                | PhaseKind::InstitutionalProxy
        )
    }

    /// Open repository searches.
    pub fn is_repository(&self) -> bool {
        matches!(
            self,
            PhaseKind::CoreRepository | PhaseKind::EuropePmc | PhaseKind::Arxiv
        )
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One acquisition strategy.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn phase(&self) -> PhaseKind;

    /// Whether this strategy applies to the record in its current state.
    fn is_eligible(&self, record: &Record, entry: &ManifestEntry) -> bool;

    /// Attempt to acquire the record's PDF. A single attempt; the caller
    /// owns retries.
    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome;
}

/// Try `candidates` in order; the first success wins. Otherwise the last
/// failure is returned, or `NotFound` when there were no candidates.
pub(crate) async fn first_success<F, Fut>(candidates: &[String], mut download: F) -> Outcome
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Outcome>,
{
    let mut last = Outcome::NotFound;
    for candidate in candidates {
        let outcome = download(candidate.clone()).await;
        if outcome.is_success() {
            return outcome;
        }
        last = outcome;
    }
    last
}
