//! Semantic Scholar Graph API batch client.
//!
//! `POST /paper/batch?fields=externalIds` accepts up to 500 ids and returns
//! an array in request order, with `null` for unknown papers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{normalize_doi, CitationGraph, LookupError};
use crate::config::SemanticScholarConfig;
use crate::metrics;

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPaper {
    #[serde(default)]
    paper_id: Option<String>,
    #[serde(default)]
    external_ids: Option<HashMap<String, serde_json::Value>>,
}

/// Semantic Scholar batch lookup client.
pub struct SemanticScholarClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(config: &SemanticScholarConfig, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl CitationGraph for SemanticScholarClient {
    async fn lookup_identifiers(
        &self,
        record_ids: &[String],
    ) -> Result<HashMap<String, String>, LookupError> {
        if record_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/paper/batch", self.base_url);
        debug!(count = record_ids.len(), "Semantic Scholar batch lookup");

        let mut request = self
            .client
            .post(&url)
            .query(&[("fields", "externalIds")])
            .json(&BatchRequest { ids: record_ids });
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["semantic_scholar", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited(
                "Semantic Scholar returned 429".to_string(),
            ));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["semantic_scholar", "error"])
                .inc();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let papers: Vec<Option<BatchPaper>> = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("batch response: {}", e)))?;
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["semantic_scholar", "success"])
            .inc();

        let mut found = HashMap::new();
        for (requested, paper) in record_ids.iter().zip(papers) {
            let Some(paper) = paper else { continue };
            let doi = paper
                .external_ids
                .as_ref()
                .and_then(|ids| ids.get("DOI"))
                .and_then(|v| v.as_str())
                .map(normalize_doi)
                .filter(|d| !d.is_empty());
            if let Some(doi) = doi {
                let id = match paper.paper_id {
                    Some(id) if record_ids.contains(&id) => id,
                    _ => requested.clone(),
                };
                found.insert(id, doi);
            }
        }

        debug!(
            requested = record_ids.len(),
            found = found.len(),
            "Semantic Scholar batch complete"
        );
        Ok(found)
    }
}
