//! Google Scholar title search.
//!
//! Scrapes the public results page. CAPTCHA interstitials, the `/sorry/`
//! redirect and HTTP 429 are all reported as rate limiting so the rotation
//! controller can react.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, Proxy, StatusCode};
use regex_lite::Regex;
use tracing::debug;

use super::{LookupError, TitleSearch};
use crate::config::ScholarConfig;
use crate::metrics;

const RESULT_MARKER: &str = "class=\"gs_r gs_or gs_scl\"";

const BLOCK_MARKERS: &[&str] = &[
    "gs_captcha_f",
    "id=\"captcha\"",
    "g-recaptcha",
    "unusual traffic from your computer network",
];

static SIDE_PDF_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="gs_or_ggsm"[^>]*>.*?<a[^>]*href="([^"]+)""#)
        .expect("side link pattern is valid")
});

static TITLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<h3 class="gs_rt"[^>]*>.*?<a[^>]*href="([^"]+)""#)
        .expect("title link pattern is valid")
});

/// What a results page told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScholarPage {
    /// Top result's PDF link, if the top result has one.
    Results(Option<String>),
    /// Interstitial or CAPTCHA page.
    Blocked(String),
}

/// Parse a results page and extract the top result's PDF link.
pub fn parse_results_page(html: &str) -> ScholarPage {
    if let Some(marker) = BLOCK_MARKERS.iter().find(|m| html.contains(*m)) {
        return ScholarPage::Blocked(format!("blocked page ({})", marker));
    }

    let Some(start) = html.find(RESULT_MARKER) else {
        return ScholarPage::Results(None);
    };
    let rest = &html[start + RESULT_MARKER.len()..];
    let top = match rest.find(RESULT_MARKER) {
        Some(end) => &rest[..end],
        None => rest,
    };

    if let Some(caps) = SIDE_PDF_LINK.captures(top) {
        return ScholarPage::Results(Some(unescape_href(&caps[1])));
    }

    let title_pdf = TITLE_LINK
        .captures(top)
        .map(|caps| unescape_href(&caps[1]))
        .filter(|href| href.to_ascii_lowercase().ends_with(".pdf"));
    ScholarPage::Results(title_pdf)
}

fn unescape_href(href: &str) -> String {
    href.replace("&amp;", "&")
}

/// Google Scholar search client.
pub struct ScholarSearch {
    client: Client,
    base_url: String,
}

impl ScholarSearch {
    /// Create a client. With `use_proxy`, requests go through
    /// `config.proxy_url`, which must then be set.
    pub fn new(
        config: &ScholarConfig,
        use_proxy: bool,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .cookie_store(true);

        if use_proxy {
            let proxy_url = config.proxy_url.as_deref().ok_or_else(|| {
                LookupError::NotConfigured(
                    "scholar.proxy_url is required when the proxy is enabled".to_string(),
                )
            })?;
            builder = builder.proxy(Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TitleSearch for ScholarSearch {
    async fn search(&self, title: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/scholar", self.base_url);
        debug!(title, "Google Scholar search");

        let response = self
            .client
            .get(&url)
            .query(&[("q", title), ("hl", "en")])
            .send()
            .await?;

        let status = response.status();
        let redirected_to_sorry = response.url().path().starts_with("/sorry");
        if status == StatusCode::TOO_MANY_REQUESTS || redirected_to_sorry {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["google_scholar", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited(format!(
                "Google Scholar refused the request (HTTP {})",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let page = parse_results_page(&body);

        if let ScholarPage::Blocked(reason) = page {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["google_scholar", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited(reason));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["google_scholar", "error"])
                .inc();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let ScholarPage::Results(pdf_url) = page else {
            return Ok(None);
        };
        let label = if pdf_url.is_some() { "success" } else { "not_found" };
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["google_scholar", label])
            .inc();
        Ok(pdf_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS: &str = r#"
        <div id="gs_res_ccl_mid">
          <div class="gs_r gs_or gs_scl" data-cid="1">
            <div class="gs_ggs gs_fl"><div class="gs_ggsd"><div class="gs_or_ggsm" ontouchstart="">
              <a href="https://arxiv.org/pdf/2101.00001?x=1&amp;y=2"><span class="gs_ctg2">[PDF]</span> arxiv.org</a>
            </div></div></div>
            <div class="gs_ri"><h3 class="gs_rt"><a href="https://publisher.example/article/1">First</a></h3></div>
          </div>
          <div class="gs_r gs_or gs_scl" data-cid="2">
            <div class="gs_or_ggsm"><a href="https://second.example/2.pdf">[PDF]</a></div>
          </div>
        </div>"#;

    #[test]
    fn test_top_result_side_link() {
        assert_eq!(
            parse_results_page(RESULTS),
            ScholarPage::Results(Some("https://arxiv.org/pdf/2101.00001?x=1&y=2".to_string()))
        );
    }

    #[test]
    fn test_title_link_used_only_when_pdf() {
        let page = r#"<div class="gs_r gs_or gs_scl"><h3 class="gs_rt"><a href="https://x.example/paper.PDF">T</a></h3></div>"#;
        assert_eq!(
            parse_results_page(page),
            ScholarPage::Results(Some("https://x.example/paper.PDF".to_string()))
        );

        let page = r#"<div class="gs_r gs_or gs_scl"><h3 class="gs_rt"><a href="https://x.example/abs">T</a></h3></div>"#;
        assert_eq!(parse_results_page(page), ScholarPage::Results(None));
    }

    #[test]
    fn test_second_result_not_used() {
        let page = r#"<div class="gs_r gs_or gs_scl"><h3 class="gs_rt"><a href="/abs">T</a></h3></div>
                      <div class="gs_r gs_or gs_scl"><div class="gs_or_ggsm"><a href="https://b/2.pdf">x</a></div></div>"#;
        assert_eq!(parse_results_page(page), ScholarPage::Results(None));
    }

    #[test]
    fn test_captcha_detected() {
        let page = "<html><form id=\"gs_captcha_f\">...</form></html>";
        assert!(matches!(parse_results_page(page), ScholarPage::Blocked(_)));
        assert_eq!(parse_results_page("<html>no hits</html>"), ScholarPage::Results(None));
    }

    fn client(server: &MockServer) -> ScholarSearch {
        let config = ScholarConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        ScholarSearch::new(&config, false, "test-agent", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_returns_pdf_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scholar"))
            .and(query_param("q", "Some paper title"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS))
            .mount(&server)
            .await;

        let url = client(&server).search("Some paper title").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://arxiv.org/pdf/2101.00001?x=1&y=2"));
    }

    #[tokio::test]
    async fn test_search_rate_limited_on_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).search("x").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_search_rate_limited_on_captcha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("Our systems have detected unusual traffic from your computer network."),
            )
            .mount(&server)
            .await;

        let err = client(&server).search("x").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_proxy_requires_url() {
        let err = ScholarSearch::new(
            &ScholarConfig::default(),
            true,
            "agent",
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LookupError::NotConfigured(_)));
    }
}
