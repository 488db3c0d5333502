use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::rescue::is_rescuable;
use super::{PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source};
use crate::providers::RepositorySearch;

/// Looks for a deposited copy in an open repository (CORE, Europe PMC,
/// arXiv) for entries earlier phases gave up on.
pub struct RepositoryRescue {
    phase: PhaseKind,
    source: Source,
    search: Arc<dyn RepositorySearch>,
    downloader: Downloader,
    /// The repository can only be searched by title.
    title_only: bool,
}

impl RepositoryRescue {
    pub fn core(search: Arc<dyn RepositorySearch>, downloader: Downloader) -> Self {
        Self {
            phase: PhaseKind::CoreRepository,
            source: Source::Core,
            search,
            downloader,
            title_only: false,
        }
    }

    pub fn europepmc(search: Arc<dyn RepositorySearch>, downloader: Downloader) -> Self {
        Self {
            phase: PhaseKind::EuropePmc,
            source: Source::EuropePmc,
            search,
            downloader,
            title_only: false,
        }
    }

    pub fn arxiv(search: Arc<dyn RepositorySearch>, downloader: Downloader) -> Self {
        Self {
            phase: PhaseKind::Arxiv,
            source: Source::Arxiv,
            search,
            downloader,
            title_only: true,
        }
    }
}

#[async_trait]
impl Strategy for RepositoryRescue {
    fn phase(&self) -> PhaseKind {
        self.phase
    }

    fn is_eligible(&self, record: &Record, entry: &ManifestEntry) -> bool {
        let has_title = !record.title.trim().is_empty();
        is_rescuable(entry) && (has_title || (!self.title_only && entry.has_doi()))
    }

    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome {
        let doi = if self.title_only {
            None
        } else {
            entry.doi.as_deref()
        };
        match self.search.find_pdf(doi, &record.title).await {
            Ok(Some(url)) => {
                self.downloader
                    .download(&record.id, &url, self.source, None)
                    .await
            }
            Ok(None) => {
                debug!(record = %record.id, phase = %self.phase, "No repository copy");
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
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::{MockFetcher, MockRepositorySearch};
    use tempfile::TempDir;

    fn failed(record: &Record) -> ManifestEntry {
        let mut entry = ManifestEntry::pending_from(record);
        entry.mark_failed(Some("https://publisher.example/landing".into()));
        entry
    }

    #[test]
    fn test_eligibility() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(
            Arc::new(MockFetcher::new()),
            ArtifactStore::new(dir.path()),
            1024,
        );
        let search = Arc::new(MockRepositorySearch::new());
        let core = RepositoryRescue::core(search.clone(), downloader.clone());
        let arxiv = RepositoryRescue::arxiv(search, downloader);

        let titled = Record::new("t", "Titled work");
        assert!(core.is_eligible(&titled, &failed(&titled)));
        assert!(!core.is_eligible(&titled, &ManifestEntry::pending_from(&titled)));

        let untitled = Record::new("u", "").with_doi("10.1/u");
        assert!(core.is_eligible(&untitled, &failed(&untitled)));
        assert!(!arxiv.is_eligible(&untitled, &failed(&untitled)));
    }

    #[tokio::test]
    async fn test_download_tagged_with_repository_source() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(MockRepositorySearch::new());
        search.set("Sahel rainfall", Ok(Some("https://core.ac.uk/download/9.pdf".into())));
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://core.ac.uk/download/9.pdf", Ok(valid_pdf_bytes()));
        let rescue = RepositoryRescue::europepmc(
            search.clone(),
            Downloader::new(fetcher, ArtifactStore::new(dir.path()), 1024),
        );

        let record = Record::new("s", "Sahel rainfall").with_doi("10.1/s");
        match rescue.attempt(&record, &failed(&record)).await {
            Outcome::Success { source, .. } => assert_eq!(source, Source::EuropePmc),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(
            search.calls(),
            vec![(Some("10.1/s".to_string()), "Sahel rainfall".to_string())]
        );
    }

    #[tokio::test]
    async fn test_arxiv_searches_by_title_only() {
        let dir = TempDir::new().unwrap();
        let search = Arc::new(MockRepositorySearch::new());
        let rescue = RepositoryRescue::arxiv(
            search.clone(),
            Downloader::new(
                Arc::new(MockFetcher::new()),
                ArtifactStore::new(dir.path()),
                1024,
            ),
        );

        let record = Record::new("a", "Preprint title").with_doi("10.1/a");
        let outcome = rescue.attempt(&record, &failed(&record)).await;
        assert_eq!(outcome, Outcome::NotFound);
        assert_eq!(search.calls(), vec![(None, "Preprint title".to_string())]);
    }
}
