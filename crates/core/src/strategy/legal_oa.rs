use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source, Status};
use crate::providers::OaLookup;

/// Looks the record's DOI up in a legal open-access index and downloads the
/// returned copy.
pub struct LegalOaLookup {
    lookup: Arc<dyn OaLookup>,
    downloader: Downloader,
}

impl LegalOaLookup {
    pub fn new(lookup: Arc<dyn OaLookup>, downloader: Downloader) -> Self {
        Self { lookup, downloader }
    }
}

#[async_trait]
impl Strategy for LegalOaLookup {
    fn phase(&self) -> PhaseKind {
        PhaseKind::LegalOa
    }

    fn is_eligible(&self, _record: &Record, entry: &ManifestEntry) -> bool {
        entry.status == Status::Pending && entry.has_doi()
    }

    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome {
        let Some(doi) = entry.doi.as_deref() else {
            return Outcome::NotFound;
        };

        match self.lookup.lookup(doi).await {
            Ok(Some(url)) => {
                self.downloader
                    .download(&record.id, &url, Source::Unpaywall, None)
                    .await
            }
            Ok(None) => {
                debug!(record = %record.id, doi, "No legal open-access copy");
                Outcome::NotFound
            }
            Err(e) => e.into_outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ArtifactStore;
    use crate::providers::LookupError;
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::{MockFetcher, MockOaLookup};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<MockOaLookup>, Arc<MockFetcher>, LegalOaLookup) {
        let lookup = Arc::new(MockOaLookup::new());
        let fetcher = Arc::new(MockFetcher::new());
        let strategy = LegalOaLookup::new(
            lookup.clone(),
            Downloader::new(fetcher.clone(), ArtifactStore::new(dir.path()), 1024),
        );
        (lookup, fetcher, strategy)
    }

    #[tokio::test]
    async fn test_lookup_then_download() {
        let dir = TempDir::new().unwrap();
        let (lookup, fetcher, strategy) = setup(&dir);
        lookup.set("10.1/x", Ok(Some("https://repo.example/x.pdf".to_string())));
        fetcher.respond("https://repo.example/x.pdf", Ok(valid_pdf_bytes()));

        let record = Record::new("x", "X").with_doi("10.1/x");
        let entry = ManifestEntry::pending_from(&record);
        assert!(strategy.is_eligible(&record, &entry));

        match strategy.attempt(&record, &entry).await {
            Outcome::Success { source, .. } => assert_eq!(source, Source::Unpaywall),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(lookup.calls(), vec!["10.1/x".to_string()]);
    }

    #[tokio::test]
    async fn test_no_copy_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (_lookup, fetcher, strategy) = setup(&dir);

        let record = Record::new("x", "X").with_doi("10.1/none");
        let entry = ManifestEntry::pending_from(&record);
        assert_eq!(strategy.attempt(&record, &entry).await, Outcome::NotFound);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_maps_to_outcome() {
        let dir = TempDir::new().unwrap();
        let (lookup, _fetcher, strategy) = setup(&dir);
        lookup.set(
            "10.1/x",
            Err(LookupError::Api {
                status: 502,
                message: "bad gateway".into(),
            }),
        );

        let record = Record::new("x", "X").with_doi("10.1/x");
        let entry = ManifestEntry::pending_from(&record);
        assert!(strategy.attempt(&record, &entry).await.is_transient());
    }

    #[test]
    fn test_requires_doi() {
        let dir = TempDir::new().unwrap();
        let (_, _, strategy) = setup(&dir);
        let record = Record::new("x", "X");
        assert!(!strategy.is_eligible(&record, &ManifestEntry::pending_from(&record)));
    }
}
