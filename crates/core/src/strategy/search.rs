use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PhaseKind, Strategy};
use crate::catalog::Record;
use crate::fetch::{Downloader, Outcome};
use crate::manifest::{ManifestEntry, Source, Status};
use crate::providers::TitleSearch;

/// Searches by title and downloads the top result's PDF link.
///
/// This is the rate-limited phase: a search refusal comes back as a
/// rate-limited transient outcome for the rotation controller to handle.
pub struct SearchFallback {
    search: Arc<dyn TitleSearch>,
    downloader: Downloader,
    referer: Option<String>,
}

impl SearchFallback {
    pub fn new(search: Arc<dyn TitleSearch>, downloader: Downloader) -> Self {
        Self {
            search,
            downloader,
            referer: None,
        }
    }

    /// Send `referer` with artifact downloads.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

#[async_trait]
impl Strategy for SearchFallback {
    fn phase(&self) -> PhaseKind {
        PhaseKind::SearchFallback
    }

    fn is_eligible(&self, _record: &Record, entry: &ManifestEntry) -> bool {
        entry.status == Status::Pending
    }

    async fn attempt(&self, record: &Record, _entry: &ManifestEntry) -> Outcome {
        // Last resort: with nothing to search for the record is not found.
        if record.title.trim().is_empty() {
            warn!(record = %record.id, "Record has no title to search for");
            return Outcome::NotFound;
        }
        match self.search.search(&record.title).await {
            Ok(Some(url)) => {
                self.downloader
                    .download(
                        &record.id,
                        &url,
                        Source::GoogleScholar,
                        self.referer.as_deref(),
                    )
                    .await
            }
            Ok(None) => {
                debug!(record = %record.id, "Search found no PDF");
                Outcome::NotFound
            }
            Err(e) => e.into_outcome(),
        }
    }
}
