use std::sync::Arc;

use async_trait::async_trait;

use super::{PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source, Status};
use crate::providers::OpenAccessResolver;

/// Downloads the open-access link the record already carries.
pub struct OpenAccessDirect {
    resolver: Arc<dyn OpenAccessResolver>,
    downloader: Downloader,
}

impl OpenAccessDirect {
    pub fn new(resolver: Arc<dyn OpenAccessResolver>, downloader: Downloader) -> Self {
        Self {
            resolver,
            downloader,
        }
    }
}

#[async_trait]
impl Strategy for OpenAccessDirect {
    fn phase(&self) -> PhaseKind {
        PhaseKind::OpenAccess
    }

    fn is_eligible(&self, record: &Record, entry: &ManifestEntry) -> bool {
        entry.status == Status::Pending && self.resolver.resolve(record).is_some()
    }

    async fn attempt(&self, record: &Record, _entry: &ManifestEntry) -> Outcome {
        match self.resolver.resolve(record) {
            Some(url) => {
                self.downloader
                    .download(&record.id, &url, Source::OpenAccess, None)
                    .await
            }
            None => Outcome::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ArtifactStore;
    use crate::providers::RecordLinkResolver;
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::MockFetcher;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_access_download() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://oa.example/a.pdf", Ok(valid_pdf_bytes()));
        let strategy = OpenAccessDirect::new(
            Arc::new(RecordLinkResolver),
            Downloader::new(fetcher.clone(), ArtifactStore::new(dir.path()), 1024),
        );

        let record = Record::new("a", "A").with_pdf_url("https://oa.example/a.pdf");
        let entry = ManifestEntry::pending_from(&record);
        assert!(strategy.is_eligible(&record, &entry));

        let outcome = strategy.attempt(&record, &entry).await;
        assert!(outcome.is_success());
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_requires_link_and_pending() {
        let dir = TempDir::new().unwrap();
        let strategy = OpenAccessDirect::new(
            Arc::new(RecordLinkResolver),
            Downloader::new(
                Arc::new(MockFetcher::new()),
                ArtifactStore::new(dir.path()),
                0,
            ),
        );

        let bare = Record::new("a", "A");
        assert!(!strategy.is_eligible(&bare, &ManifestEntry::pending_from(&bare)));

        let linked = Record::new("b", "B").with_pdf_url("https://x/b.pdf");
        let mut entry = ManifestEntry::pending_from(&linked);
        entry.mark_failed(None);
        assert!(!strategy.is_eligible(&linked, &entry));
    }
}
