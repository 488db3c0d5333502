//! PDF download, validation and artifact storage.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Outcome;
use crate::config::DownloadConfig;
use crate::manifest::Source;
use crate::metrics;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Errors from a single HTTP fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited (HTTP {0})")]
    RateLimited(u16),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Connection(_)
            | FetchError::RateLimited(_)
            | FetchError::Body(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::InvalidUrl(_) | FetchError::Client(_) => false,
        }
    }

    pub fn into_outcome(self, url: &str) -> Outcome {
        let outcome = match &self {
            FetchError::RateLimited(_) => Outcome::rate_limited(self.to_string()),
            e if e.is_transient() => Outcome::transient(self.to_string()),
            _ => Outcome::permanent(self.to_string()),
        };
        outcome.with_url(url)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connection(e.to_string())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else if e.is_body() || e.is_decode() {
            FetchError::Body(e.to_string())
        } else {
            FetchError::Connection(e.to_string())
        }
    }
}

/// Fetches raw bytes for a candidate PDF URL.
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    /// Fetch `url`. A single attempt; retries belong to the caller.
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher sending browser-like headers.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/pdf,text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Check PDF signature and minimum size.
pub fn validate_pdf(bytes: &[u8], min_size: u64) -> Result<(), String> {
    if bytes.is_empty() {
        return Err("empty response body".to_string());
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err("response is not a PDF".to_string());
    }
    if (bytes.len() as u64) < min_size {
        return Err(format!(
            "PDF too small ({} bytes, minimum {})",
            bytes.len(),
            min_size
        ));
    }
    Ok(())
}

/// Directory of downloaded artifacts, one file per record.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic artifact path for a record identifier.
    pub fn path_for(&self, record_id: &str) -> PathBuf {
        let name: String = record_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.pdf", name))
    }

    /// Atomically write the artifact for `record_id`.
    pub fn write(&self, record_id: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(record_id);
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &target)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(target)
    }
}

/// Fetch, validate and store one candidate URL.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn PdfFetcher>,
    artifacts: ArtifactStore,
    min_size: u64,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn PdfFetcher>, artifacts: ArtifactStore, min_size: u64) -> Self {
        Self {
            fetcher,
            artifacts,
            min_size,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Single-shot download of `url` for `record_id`.
    pub async fn download(
        &self,
        record_id: &str,
        url: &str,
        source: Source,
        referer: Option<&str>,
    ) -> Outcome {
        let start = Instant::now();
        debug!(record = record_id, url, "Downloading candidate");

        let bytes = match self.fetcher.fetch(url, referer).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(record = record_id, url, error = %e, "Fetch failed");
                metrics::DOWNLOADS_TOTAL.with_label_values(&["fetch_error"]).inc();
                return e.into_outcome(url);
            }
        };

        if let Err(reason) = validate_pdf(&bytes, self.min_size) {
            debug!(record = record_id, url, reason = %reason, "Rejected download");
            metrics::DOWNLOADS_TOTAL.with_label_values(&["invalid"]).inc();
            return Outcome::permanent(reason).with_url(url);
        }

        match self.artifacts.write(record_id, &bytes) {
            Ok(path) => {
                metrics::DOWNLOADS_TOTAL.with_label_values(&["success"]).inc();
                metrics::DOWNLOAD_BYTES.inc_by(bytes.len() as u64);
                metrics::DOWNLOAD_DURATION.observe(start.elapsed().as_secs_f64());
                Outcome::Success {
                    source,
                    resolved_url: url.to_string(),
                    artifact_path: path,
                }
            }
            Err(e) => {
                warn!(record = record_id, error = %e, "Failed to store artifact");
                metrics::DOWNLOADS_TOTAL.with_label_values(&["write_error"]).inc();
                Outcome::permanent(format!("failed to store artifact: {}", e)).with_url(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::valid_pdf_bytes;
    use crate::testing::MockFetcher;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf(&valid_pdf_bytes(), 1024).is_ok());
        assert!(validate_pdf(b"", 0).is_err());
        assert!(validate_pdf(b"<html>nope</html>", 0).is_err());
        assert!(validate_pdf(b"%PDF-1.4 tiny", 1024).is_err());
    }

    #[test]
    fn test_path_for_is_deterministic_and_safe() {
        let store = ArtifactStore::new("/tmp/pdfs");
        assert_eq!(store.path_for("abc123"), PathBuf::from("/tmp/pdfs/abc123.pdf"));
        assert_eq!(store.path_for("a/b c"), PathBuf::from("/tmp/pdfs/a_b_c.pdf"));
    }

    #[test]
    fn test_fetch_error_classification() {
        assert!(FetchError::Status(503).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(FetchError::RateLimited(429).into_outcome("u").is_rate_limited());
        assert_eq!(
            FetchError::Status(403).into_outcome("https://x/y").attempted_url(),
            Some("https://x/y")
        );
    }

    #[tokio::test]
    async fn test_download_stores_valid_pdf() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://oa.example/p.pdf", Ok(valid_pdf_bytes()));
        let downloader = Downloader::new(fetcher, ArtifactStore::new(dir.path()), 1024);

        let outcome = downloader
            .download("p1", "https://oa.example/p.pdf", Source::OpenAccess, None)
            .await;

        match outcome {
            Outcome::Success {
                source,
                artifact_path,
                ..
            } => {
                assert_eq!(source, Source::OpenAccess);
                assert_eq!(fs::read(artifact_path).unwrap(), valid_pdf_bytes());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_rejects_html() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://x/p", Ok(b"<html>login</html>".to_vec()));
        let downloader = Downloader::new(fetcher, ArtifactStore::new(dir.path()), 0);

        let outcome = downloader
            .download("p1", "https://x/p", Source::Unpaywall, None)
            .await;
        assert_eq!(outcome.label(), "permanent");
        assert!(!dir.path().join("p1.pdf").exists());
    }

    #[tokio::test]
    async fn test_http_fetcher_sends_referer_and_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.pdf"))
            .and(header("referer", "https://scholar.google.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(valid_pdf_bytes()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy.pdf"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&DownloadConfig::default()).unwrap();

        let bytes = fetcher
            .fetch(
                &format!("{}/ok.pdf", server.uri()),
                Some("https://scholar.google.com/"),
            )
            .await
            .unwrap();
        assert!(bytes.starts_with(PDF_MAGIC));

        let busy = fetcher
            .fetch(&format!("{}/busy.pdf", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(busy, FetchError::RateLimited(429)));

        let gone = fetcher
            .fetch(&format!("{}/gone.pdf", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(gone, FetchError::Status(404)));
        assert!(!gone.is_transient());
    }
}
