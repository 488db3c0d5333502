//! Mock PDF fetcher for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::fetch::{FetchError, PdfFetcher};

type FetchResult = Result<Vec<u8>, FetchError>;

/// Mock implementation of the PdfFetcher trait.
///
/// Responses are registered per URL. One-shot responses queued with
/// [`MockFetcher::respond_once`] are served before the standing response.
/// Unregistered URLs answer with HTTP 404.
///
/// # Example
///
/// ```rust,ignore
/// let fetcher = MockFetcher::new();
/// fetcher.respond("https://x/a.pdf", Ok(fixtures::valid_pdf_bytes()));
/// fetcher.respond_once("https://x/b.pdf", Err(FetchError::Timeout));
///
/// // ... run the pipeline ...
/// assert_eq!(fetcher.request_count("https://x/a.pdf"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, FetchResult>>,
    queued: Mutex<HashMap<String, VecDeque<FetchResult>>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standing response for `url`.
    pub fn respond(&self, url: &str, response: FetchResult) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// One-shot response for `url`, served before the standing one.
    pub fn respond_once(&self, url: &str, response: FetchResult) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every request made, as `(url, referer)`.
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl PdfFetcher for MockFetcher {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> FetchResult {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), referer.map(str::to_string)));

        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}
