//! Opt-in rescue strategies for entries earlier phases gave up on.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use super::{first_success, PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source, Status};
use crate::providers::PdfLocator;

pub(super) fn is_rescuable(entry: &ManifestEntry) -> bool {
    matches!(entry.status, Status::Failed | Status::NotFound)
}

/// Downloads publisher PDF links listed in Crossref metadata.
pub struct CrossrefRescue {
    locator: Arc<dyn PdfLocator>,
    downloader: Downloader,
}

impl CrossrefRescue {
    pub fn new(locator: Arc<dyn PdfLocator>, downloader: Downloader) -> Self {
        Self {
            locator,
            downloader,
        }
    }
}

#[async_trait]
impl Strategy for CrossrefRescue {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Crossref
    }

    fn is_eligible(&self, _record: &Record, entry: &ManifestEntry) -> bool {
        is_rescuable(entry) && entry.has_doi()
    }

    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome {
        let Some(doi) = entry.doi.as_deref() else {
            return Outcome::NotFound;
        };
        let links = match self.locator.locate(doi).await {
            Ok(links) => links,
            Err(e) => return e.into_outcome(),
        };
        debug!(record = %record.id, doi, links = links.len(), "Crossref links");

        first_success(&links, |url| async move {
            self.downloader
                .download(&record.id, &url, Source::Crossref, None)
                .await
        })
        .await
    }
}

/// Retries publisher URLs through an institutional proxy prefix.
pub struct InstitutionalProxyRescue {
    proxy_base: String,
    publisher_domains: Vec<String>,
    downloader: Downloader,
}

impl InstitutionalProxyRescue {
    pub fn new(
        proxy_base: impl Into<String>,
        publisher_domains: Vec<String>,
        downloader: Downloader,
    ) -> Self {
        Self {
            proxy_base: proxy_base.into(),
            publisher_domains,
            downloader,
        }
    }

    /// Proxied URL for the entry, if its publisher is covered.
    pub fn proxied_url(&self, entry: &ManifestEntry) -> Option<String> {
        let target = match entry.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => format!("https://doi.org/{}", entry.doi.as_deref()?),
        };
        let host = Url::parse(&target).ok()?.host_str()?.to_ascii_lowercase();
        self.publisher_domains
            .iter()
            .any(|domain| host.contains(domain.as_str()))
            .then(|| format!("{}{}", self.proxy_base, target))
    }
}

#[async_trait]
impl Strategy for InstitutionalProxyRescue {
    fn phase(&self) -> PhaseKind {
        PhaseKind::InstitutionalProxy
    }

    fn is_eligible(&self, _record: &Record, entry: &ManifestEntry) -> bool {
        is_rescuable(entry) && self.proxied_url(entry).is_some()
    }

    async fn attempt(&self, record: &Record, entry: &ManifestEntry) -> Outcome {
        match self.proxied_url(entry) {
            Some(url) => {
                self.downloader
                    .download(&record.id, &url, Source::InstitutionalProxy, None)
                    .await
            }
            None => Outcome::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstitutionalProxyConfig;
    use crate::fetch::ArtifactStore;
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::{MockFetcher, MockPdfLocator};
    use tempfile::TempDir;

    fn proxy(dir: &TempDir, fetcher: Arc<MockFetcher>) -> InstitutionalProxyRescue {
        InstitutionalProxyRescue::new(
            "https://login.proxy.example/login?url=",
            InstitutionalProxyConfig::default().publisher_domains,
            Downloader::new(fetcher, ArtifactStore::new(dir.path()), 1024),
        )
    }

    #[test]
    fn test_proxied_url_from_entry_or_doi() {
        let dir = TempDir::new().unwrap();
        let rescue = proxy(&dir, Arc::new(MockFetcher::new()));

        let record = Record::new("a", "A");
        let mut entry = ManifestEntry::pending_from(&record);
        entry.mark_failed(Some("https://link.springer.com/article/1".into()));
        assert_eq!(
            rescue.proxied_url(&entry).as_deref(),
            Some("https://login.proxy.example/login?url=https://link.springer.com/article/1")
        );

        let mut no_url = ManifestEntry::pending_from(&record.clone().with_doi("10.1/z"));
        no_url.mark_not_found();
        assert_eq!(
            rescue.proxied_url(&no_url).as_deref(),
            Some("https://login.proxy.example/login?url=https://doi.org/10.1/z")
        );

        let mut unknown = ManifestEntry::pending_from(&record);
        unknown.mark_failed(Some("https://example.org/a".into()));
        assert!(!rescue.is_eligible(&record, &unknown));
    }

    #[test]
    fn test_proxy_ignores_pending_and_downloaded() {
        let dir = TempDir::new().unwrap();
        let rescue = proxy(&dir, Arc::new(MockFetcher::new()));
        let record = Record::new("a", "A").with_doi("10.1/z");
        assert!(!rescue.is_eligible(&record, &ManifestEntry::pending_from(&record)));
    }

    #[tokio::test]
    async fn test_crossref_rescue_downloads_first_valid_link() {
        let dir = TempDir::new().unwrap();
        let locator = Arc::new(MockPdfLocator::new());
        locator.set(
            "10.1/c",
            Ok(vec![
                "https://pub.example/broken.pdf".into(),
                "https://pub.example/ok.pdf".into(),
            ]),
        );
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://pub.example/ok.pdf", Ok(valid_pdf_bytes()));
        let rescue = CrossrefRescue::new(
            locator,
            Downloader::new(fetcher, ArtifactStore::new(dir.path()), 1024),
        );

        let record = Record::new("c", "C").with_doi("10.1/c");
        let mut entry = ManifestEntry::pending_from(&record);
        entry.mark_not_found();
        assert!(rescue.is_eligible(&record, &entry));

        match rescue.attempt(&record, &entry).await {
            Outcome::Success {
                source,
                resolved_url,
                ..
            } => {
                assert_eq!(source, Source::Crossref);
                assert_eq!(resolved_url, "https://pub.example/ok.pdf");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
