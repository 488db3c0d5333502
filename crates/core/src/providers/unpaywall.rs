//! Unpaywall API client.
//!
//! Unpaywall requires a contact email on every request. A 404 means the DOI
//! is unknown to Unpaywall and is not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{LookupError, OaLookup};
use crate::config::UnpaywallConfig;
use crate::metrics;

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    #[serde(default)]
    url_for_pdf: Option<String>,
}

/// Unpaywall lookup client.
pub struct UnpaywallClient {
    client: Client,
    base_url: String,
    email: String,
}

impl UnpaywallClient {
    /// Create a client. Fails with `NotConfigured` when no email is given.
    pub fn new(
        config: &UnpaywallConfig,
        email: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let email = email
            .or(config.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                LookupError::NotConfigured("Unpaywall requires a contact email".to_string())
            })?;

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        })
    }
}

#[async_trait]
impl OaLookup for UnpaywallClient {
    async fn lookup(&self, doi: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/{}", self.base_url, doi);
        debug!(doi, "Unpaywall lookup");

        let response = self
            .client
            .get(&url)
            .query(&[("email", &self.email)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["unpaywall", "not_found"])
                .inc();
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["unpaywall", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited("Unpaywall returned 429".to_string()));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["unpaywall", "error"])
                .inc();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let data: UnpaywallResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("Unpaywall response: {}", e)))?;
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["unpaywall", "success"])
            .inc();

        let pdf_url = data
            .best_oa_location
            .into_iter()
            .chain(data.oa_locations)
            .filter_map(|loc| loc.url_for_pdf)
            .find(|u| !u.trim().is_empty());

        debug!(doi, found = pdf_url.is_some(), "Unpaywall lookup complete");
        Ok(pdf_url)
    }
}
