//! arXiv title search over the Atom query API.
//!
//! Only a result whose title matches the query closely enough is accepted;
//! the relevance ranking alone returns unrelated preprints for rare titles.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{LookupError, RepositorySearch};
use crate::config::ArxivConfig;
use crate::metrics;

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("entry pattern is valid")
});

static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("title pattern is valid")
});

static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<link\b([^>]*)>").expect("link pattern is valid"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:-]+)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid")
});

/// Minimum share of shared words for two titles to count as the same work.
const WORD_OVERLAP: f64 = 0.8;

/// One feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivEntry {
    pub title: String,
    pub pdf_url: Option<String>,
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an Atom feed into entries. The PDF link is the `<link title="pdf">`
/// of the entry, with a `.pdf` suffix added when missing.
pub fn parse_feed(xml: &str) -> Vec<ArxivEntry> {
    ENTRY
        .captures_iter(xml)
        .map(|caps| {
            let body = caps.get(1).map_or("", |m| m.as_str());
            let title = TITLE
                .captures(body)
                .map(|t| normalize_whitespace(&unescape(&t[1])))
                .unwrap_or_default();
            let pdf_url = LINK.captures_iter(body).find_map(|link| {
                let mut href = None;
                let mut is_pdf = false;
                for attr in ATTRIBUTE.captures_iter(&link[1]) {
                    match &attr[1] {
                        "href" => href = Some(unescape(&attr[2])),
                        "title" => is_pdf = &attr[2] == "pdf",
                        _ => {}
                    }
                }
                href.filter(|h| is_pdf && !h.is_empty()).map(|h| {
                    if h.ends_with(".pdf") {
                        h
                    } else {
                        format!("{}.pdf", h)
                    }
                })
            });
            ArxivEntry { title, pdf_url }
        })
        .collect()
}

/// Whether two titles name the same work: equal or contained ignoring case,
/// or sharing most of their words.
pub fn titles_match(query: &str, candidate: &str) -> bool {
    let q = query.trim().to_lowercase();
    let r = candidate.trim().to_lowercase();
    if q.is_empty() || r.is_empty() {
        return false;
    }
    if q.contains(&r) || r.contains(&q) {
        return true;
    }

    let q_words: HashSet<&str> = q.split_whitespace().collect();
    let r_words: HashSet<&str> = r.split_whitespace().collect();
    let shared = q_words.intersection(&r_words).count();
    shared as f64 / q_words.len().max(r_words.len()) as f64 >= WORD_OVERLAP
}

/// arXiv query API client.
pub struct ArxivClient {
    client: Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RepositorySearch for ArxivClient {
    /// Title search only; arXiv does not index publisher DOIs reliably.
    async fn find_pdf(
        &self,
        _doi: Option<&str>,
        title: &str,
    ) -> Result<Option<String>, LookupError> {
        let title = normalize_whitespace(&title.replace('"', ""));
        if title.is_empty() {
            return Ok(None);
        }
        debug!(title = %title, "arXiv search");

        let url = format!("{}/query", self.base_url);
        let search_query = format!("ti:\"{}\"", title);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("max_results", "3"),
                ("sortBy", "relevance"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["arxiv", "rate_limited"])
                .inc();
            return Err(LookupError::RateLimited("arXiv returned 429".to_string()));
        }
        if !status.is_success() {
            metrics::EXTERNAL_SERVICE_REQUESTS
                .with_label_values(&["arxiv", "error"])
                .inc();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: String::new(),
            });
        }

        let body = response.text().await?;
        let found = parse_feed(&body)
            .into_iter()
            .filter(|entry| titles_match(&title, &entry.title))
            .find_map(|entry| entry.pdf_url);
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["arxiv", if found.is_some() { "success" } else { "not_found" }])
            .inc();
        Ok(found)
    }
}
