use async_trait::async_trait;
use tracing::debug;

use super::{first_success, transform_candidates, PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source, Status};

/// Rewrites a known landing-page URL into likely PDF endpoints.
pub struct UrlTransform {
    downloader: Downloader,
    phase: PhaseKind,
}

impl UrlTransform {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            downloader,
            phase: PhaseKind::UrlTransform,
        }
    }

    /// Second pass after search, over entries whose last recorded URL (often
    /// a search hit) failed.
    pub fn retry(downloader: Downloader) -> Self {
        Self {
            downloader,
            phase: PhaseKind::UrlTransformRetry,
        }
    }

    /// URL the rewrite starts from: the last URL recorded on the entry,
    /// else the record's own link.
    fn base_url<'a>(record: &'a Record, entry: &'a ManifestEntry) -> Option<&'a str> {
        entry
            .url
            .as_deref()
            .or(record.pdf_url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

#[async_trait]
impl Strategy for UrlTransform {
    fn phase(&self) -> PhaseKind {
        self.phase
    }

    fn is_eligible(&self, record: &Record, entry: &ManifestEntry) -> bool {
        let status_ok = match self.phase {
            PhaseKind::UrlTransformRetry => entry.status == Status::Failed,
            _ => matches!(entry.status, Status::Pending | Status::Failed),
        };
        status_ok
            && Self::base_url(record, entry)
                .map(|url| !transform_candidates(url).is_empty())
                .unwrap_or(false)
    }

    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome {
        let Some(base) = Self::base_url(record, entry) else {
            return Outcome::NotFound;
        };
        let candidates = transform_candidates(base);
        debug!(record = %record.id, base, candidates = candidates.len(), "Trying URL transforms");

        let outcome = first_success(&candidates, |url| async move {
            self.downloader
                .download(&record.id, &url, Source::UrlTransform, None)
                .await
        })
        .await;

        // Keep the pre-rewrite URL on failure so a later run rewrites the
        // same base again.
        if outcome.is_success() {
            outcome
        } else {
            outcome.with_url(base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{ArtifactStore, FetchError};
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::MockFetcher;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_failed_entry_rewritten() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            "https://europepmc.org/articles/PMC42?format=pdf",
            Err(FetchError::Status(404)),
        );
        fetcher.respond(
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC42/pdf/main.pdf",
            Ok(valid_pdf_bytes()),
        );
        let strategy = UrlTransform::new(Downloader::new(
            fetcher.clone(),
            ArtifactStore::new(dir.path()),
            1024,
        ));

        let record = Record::new("p", "P");
        let mut entry = ManifestEntry::pending_from(&record);
        entry.mark_failed(Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC42/".into()));
        assert!(strategy.is_eligible(&record, &entry));

        match strategy.attempt(&record, &entry).await {
            Outcome::Success {
                source,
                resolved_url,
                ..
            } => {
                assert_eq!(source, Source::UrlTransform);
                assert!(resolved_url.ends_with("/pdf/main.pdf"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_base_url() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let strategy = UrlTransform::new(Downloader::new(
            fetcher,
            ArtifactStore::new(dir.path()),
            1024,
        ));

        let record = Record::new("p", "P").with_pdf_url("https://www.mdpi.com/1/2/3");
        let entry = ManifestEntry::pending_from(&record);
        let outcome = strategy.attempt(&record, &entry).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempted_url(), Some("https://www.mdpi.com/1/2/3"));
    }

    #[test]
    fn test_not_eligible_without_matching_host() {
        let dir = TempDir::new().unwrap();
        let strategy = UrlTransform::new(Downloader::new(
            Arc::new(MockFetcher::new()),
            ArtifactStore::new(dir.path()),
            0,
        ));
        let record = Record::new("p", "P").with_pdf_url("https://example.org/paper");
        assert!(!strategy.is_eligible(&record, &ManifestEntry::pending_from(&record)));

        let mut done = ManifestEntry::pending_from(&record);
        done.mark_not_found();
        assert!(!strategy.is_eligible(&record, &done));
    }

    #[test]
    fn test_retry_pass_only_takes_failed_entries() {
        let dir = TempDir::new().unwrap();
        let strategy = UrlTransform::retry(Downloader::new(
            Arc::new(MockFetcher::new()),
            ArtifactStore::new(dir.path()),
            0,
        ));
        assert_eq!(strategy.phase(), PhaseKind::UrlTransformRetry);

        let record = Record::new("p", "P").with_pdf_url("https://www.mdpi.com/1/2/3");
        let pending = ManifestEntry::pending_from(&record);
        assert!(!strategy.is_eligible(&record, &pending));

        let mut failed = ManifestEntry::pending_from(&record);
        failed.mark_failed(Some("https://www.mdpi.com/4/5/6".into()));
        assert!(strategy.is_eligible(&record, &failed));
    }
}
