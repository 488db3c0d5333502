//! Europe PMC search client.
//!
//! A hit with a PMC identifier has a full-text PDF endpoint on the same API.
//! Otherwise an open-access PDF from the full-text link list is used.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{LookupError, RepositorySearch};
use crate::config::EuropePmcConfig;
use crate::metrics;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    #[serde(default)]
    pmcid: Option<String>,
    #[serde(default)]
    full_text_url_list: Option<FullTextUrlList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrlList {
    #[serde(default)]
    full_text_url: Vec<FullTextUrl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTextUrl {
    #[serde(default)]
    document_style: Option<String>,
    #[serde(default)]
    availability: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Europe PMC REST client.
pub struct EuropePmcClient {
    client: Client,
    base_url: String,
}

impl EuropePmcClient {
    pub fn new(config: &EuropePmcConfig, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn hit_pdf_url(&self, hit: &Hit) -> Option<String> {
        if let Some(pmcid) = hit.pmcid.as_deref().filter(|p| !p.is_empty()) {
            return Some(format!("{}/{}/fullTextPDF", self.base_url, pmcid));
        }
        hit.full_text_url_list
            .iter()
            .flat_map(|list| &list.full_text_url)
            .find(|u| {
                u.document_style.as_deref() == Some("pdf")
                    && u.availability.as_deref() == Some("Open access")
            })
            .and_then(|u| u.url.clone())
    }

    async fn query(&self, query: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", "3"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["europepmc", "error"])
                .inc();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LookupError::RateLimited(
                    "Europe PMC returned 429".to_string(),
                ));
            }
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: String::new(),
            });
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("Europe PMC search: {}", e)))?;
        let found = data
            .result_list
            .result
            .iter()
            .find_map(|hit| self.hit_pdf_url(hit));
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&[
                "europepmc",
                if found.is_some() { "success" } else { "not_found" },
            ])
            .inc();
        Ok(found)
    }
}

#[async_trait]
impl RepositorySearch for EuropePmcClient {
    async fn find_pdf(
        &self,
        doi: Option<&str>,
        title: &str,
    ) -> Result<Option<String>, LookupError> {
        let title = title.replace('"', "");
        let title = title.trim();
        let queries: Vec<String> = doi
            .map(|d| format!("DOI:\"{}\"", d))
            .into_iter()
            .chain((!title.is_empty()).then(|| format!("TITLE:\"{}\"", title)))
            .collect();

        let mut last_error = None;
        let mut answered = false;
        for query in &queries {
            debug!(query = %query, "Europe PMC search");
            match self.query(query).await {
                Ok(Some(url)) => return Ok(Some(url)),
                Ok(None) => answered = true,
                Err(e) => {
                    debug!(query = %query, error = %e, "Europe PMC query failed");
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
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> EuropePmcClient {
        let config = EuropePmcConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        EuropePmcClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_pmcid_maps_to_full_text_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "DOI:\"10.1371/x.1\""))
            .and(query_param("resultType", "core"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hitCount": 1,
                "resultList": {"result": [{"id": "1", "pmcid": "PMC123"}]}
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .find_pdf(Some("10.1371/x.1"), "Ignored")
            .await
            .unwrap();
        assert_eq!(url, Some(format!("{}/PMC123/fullTextPDF", server.uri())));
    }

    #[tokio::test]
    async fn test_title_query_uses_open_access_pdf_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "TITLE:\"Maize yield gaps\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultList": {"result": [{
                    "fullTextUrlList": {"fullTextUrl": [
                        {"documentStyle": "pdf", "availability": "Subscription required", "url": "https://pub.example/paywalled.pdf"},
                        {"documentStyle": "html", "availability": "Open access", "url": "https://pub.example/page"},
                        {"documentStyle": "pdf", "availability": "Open access", "url": "https://pub.example/open.pdf"}
                    ]}
                }]}
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .find_pdf(None, "Maize \"yield\" gaps")
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://pub.example/open.pdf"));
    }

    #[tokio::test]
    async fn test_errors_fall_through_to_next_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "DOI:\"10.1/broken\""))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("query", "TITLE:\"Nothing here\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"resultList": {"result": []}})),
            )
            .mount(&server)
            .await;

        let europepmc = client(&server);
        assert_eq!(
            europepmc
                .find_pdf(Some("10.1/broken"), "Nothing here")
                .await
                .unwrap(),
            None
        );
        assert!(matches!(
            europepmc.find_pdf(Some("10.1/broken"), "").await,
            Err(LookupError::Api { status: 500, .. })
        ));
    }
}
