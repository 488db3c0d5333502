//! CORE aggregator search client.
//!
//! Queries by DOI first, then by the significant words of the title. CORE's
//! phrase search is unreliable, so titles become a bag-of-words query.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{LookupError, RepositorySearch};
use crate::config::CoreConfig;
use crate::metrics;

const RESULT_LIMIT: &str = "5";
const MAX_TITLE_WORDS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Work {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    links: Vec<WorkLink>,
    #[serde(default)]
    source_fulltext_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WorkLink {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl Work {
    /// Best PDF link: the download URL, then a `download` link, then any
    /// full-text or link URL that looks like a PDF.
    fn pdf_url(&self) -> Option<String> {
        if let Some(url) = self.download_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }

        let download_link = self
            .links
            .iter()
            .filter(|l| l.kind.as_deref() == Some("download"))
            .find_map(|l| l.url.as_deref().filter(|u| !u.is_empty()));
        if let Some(url) = download_link {
            return Some(url.to_string());
        }

        let fulltext = self
            .source_fulltext_urls
            .iter()
            .flatten()
            .find(|u| u.to_ascii_lowercase().contains("pdf"));
        if let Some(url) = fulltext {
            return Some(url.clone());
        }

        self.links
            .iter()
            .filter_map(|l| l.url.as_deref())
            .find(|u| {
                let lower = u.to_ascii_lowercase();
                lower.contains(".pdf") || lower.contains("/pdf/")
            })
            .map(str::to_string)
    }
}

/// `title:(w1 w2 ...)` over the first significant words, or `None` when the
/// title has none.
fn title_query(title: &str) -> Option<String> {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if "\"'()[]{}:;,".contains(c) {
                ' '
            } else {
                c
            }
        })
        .collect();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .take(MAX_TITLE_WORDS)
        .collect();
    (!words.is_empty()).then(|| format!("title:({})", words.join(" ")))
}

/// CORE search client.
pub struct CoreClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoreClient {
    pub fn new(config: &CoreConfig, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    async fn query(&self, q: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/search/works", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("q", q), ("limit", RESULT_LIMIT)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["core", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited("CORE returned 429".to_string()));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["core", "error"])
                .inc();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("CORE search: {}", e)))?;
        let found = data.results.iter().find_map(Work::pdf_url);
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["core", if found.is_some() { "success" } else { "not_found" }])
            .inc();
        Ok(found)
    }
}

#[async_trait]
impl RepositorySearch for CoreClient {
    async fn find_pdf(
        &self,
        doi: Option<&str>,
        title: &str,
    ) -> Result<Option<String>, LookupError> {
        let queries: Vec<String> = doi
            .map(|d| format!("doi:{}", d))
            .into_iter()
            .chain(title_query(title))
            .collect();

        // A failed query falls through to the next one. Rate limiting ends
        // the lookup so the caller can back off.
        let mut last_error = None;
        let mut answered = false;
        for q in &queries {
            debug!(query = %q, "CORE search");
            match self.query(q).await {
                Ok(Some(url)) => return Ok(Some(url)),
                Ok(None) => answered = true,
                Err(e) if e.is_rate_limited() => return Err(e),
                Err(e) => {
                    debug!(query = %q, error = %e, "CORE query failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: Option<&str>) -> CoreClient {
        let config = CoreConfig {
            base_url: server.uri(),
            api_key: api_key.map(str::to_string),
            ..Default::default()
        };
        CoreClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_title_query_keeps_significant_words() {
        assert_eq!(
            title_query("Soil (and) water: a \"review\" of it").as_deref(),
            Some("title:(Soil and water review)")
        );
        assert_eq!(title_query("A of"), None);

        let long = (0..15).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let query = title_query(&long).unwrap();
        assert!(query.ends_with("word9)"));
    }

    #[test]
    fn test_pdf_url_field_priority() {
        let work: Work = serde_json::from_value(serde_json::json!({
            "links": [
                {"type": "display", "url": "https://core.example/display/1"},
                {"type": "reader", "url": "https://repo.example/files/1.pdf"}
            ],
            "sourceFulltextUrls": ["https://repo.example/view/1", "https://repo.example/pdf/1"]
        }))
        .unwrap();
        assert_eq!(work.pdf_url().as_deref(), Some("https://repo.example/pdf/1"));

        let work: Work = serde_json::from_value(serde_json::json!({
            "downloadUrl": "",
            "links": [{"type": "download", "url": "https://core.example/download/1.pdf"}]
        }))
        .unwrap();
        assert_eq!(
            work.pdf_url().as_deref(),
            Some("https://core.example/download/1.pdf")
        );
    }

    #[tokio::test]
    async fn test_doi_query_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/works"))
            .and(query_param("q", "doi:10.1000/abc"))
            .and(header("Authorization", "Bearer k3y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"downloadUrl": "https://core.ac.uk/download/42.pdf"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server, Some("k3y"))
            .find_pdf(Some("10.1000/abc"), "Whatever")
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://core.ac.uk/download/42.pdf"));
    }

    #[tokio::test]
    async fn test_falls_back_to_title_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "doi:10.1000/none"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "title:(Rainfall variability the Sahel)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"links": []},
                    {"links": [{"type": "download", "url": "https://core.ac.uk/download/7.pdf"}]}
                ]
            })))
            .mount(&server)
            .await;

        let url = client(&server, None)
            .find_pdf(Some("10.1000/none"), "Rainfall variability in the Sahel")
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://core.ac.uk/download/7.pdf"));
    }

    #[tokio::test]
    async fn test_rate_limit_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "doi:10.1000/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "doi:10.1000/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let core = client(&server, None);
        let err = core.find_pdf(Some("10.1000/busy"), "").await.unwrap_err();
        assert!(err.is_rate_limited());

        let err = core.find_pdf(Some("10.1000/down"), "").await.unwrap_err();
        assert!(matches!(err, LookupError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_no_results_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let url = client(&server, None)
            .find_pdf(None, "Unindexed field notes")
            .await
            .unwrap();
        assert_eq!(url, None);
    }
}
