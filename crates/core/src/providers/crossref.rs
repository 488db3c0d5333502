//! Crossref works API client.
//!
//! Looks for publisher-declared PDF links in a work's metadata. Crossref asks
//! polite clients to identify themselves with a `mailto`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{LookupError, PdfLocator};
use crate::config::CrossrefConfig;
use crate::metrics;

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: Work,
}

#[derive(Debug, Default, Deserialize)]
struct Work {
    #[serde(default)]
    link: Vec<WorkLink>,
    #[serde(default)]
    resource: Option<WorkResource>,
}

#[derive(Debug, Deserialize)]
struct WorkLink {
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(rename = "content-type", default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkResource {
    #[serde(default)]
    primary: Option<PrimaryResource>,
}

#[derive(Debug, Deserialize)]
struct PrimaryResource {
    #[serde(rename = "URL", default)]
    url: Option<String>,
}

impl Work {
    fn pdf_links(self) -> Vec<String> {
        let mut links: Vec<String> = self
            .link
            .into_iter()
            .filter(|l| {
                l.content_type
                    .as_deref()
                    .is_some_and(|ct| ct.contains("pdf"))
            })
            .filter_map(|l| l.url)
            .collect();

        if let Some(url) = self.resource.and_then(|r| r.primary).and_then(|p| p.url) {
            if url.to_ascii_lowercase().ends_with(".pdf") && !links.contains(&url) {
                links.push(url);
            }
        }
        links
    }
}

/// Crossref metadata client.
pub struct CrossrefClient {
    client: Client,
    base_url: String,
}

impl CrossrefClient {
    pub fn new(config: &CrossrefConfig, timeout: Duration) -> Result<Self, LookupError> {
        let user_agent = match config.mailto.as_deref().filter(|m| !m.is_empty()) {
            Some(mailto) => format!("paperchase/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto),
            None => format!("paperchase/{}", env!("CARGO_PKG_VERSION")),
        };
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PdfLocator for CrossrefClient {
    async fn locate(&self, doi: &str) -> Result<Vec<String>, LookupError> {
        let url = format!("{}/works/{}", self.base_url, doi);
        debug!(doi, "Crossref lookup");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["crossref", "not_found"])
                .inc();
            return Ok(Vec::new());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["crossref", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited("Crossref returned 429".to_string()));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["crossref", "error"])
                .inc();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let work: WorkResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("Crossref work: {}", e)))?;
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["crossref", "success"])
            .inc();

        Ok(work.message.pdf_links())
    }
}
