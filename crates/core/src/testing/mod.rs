//! Testing utilities and mock implementations.
//!
//! Every collaborator the pipeline talks to has a mock here, so full runs can
//! be exercised without network access or a VPN client.
//!
//! # Example
//!
//! ```rust,ignore
//! use paperchase_core::testing::{fixtures, MockFetcher, MockTitleSearch};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.respond("https://x/a.pdf", Ok(fixtures::valid_pdf_bytes()));
//!
//! let search = MockTitleSearch::new();
//! search.set("Some title", Ok(Some("https://x/a.pdf".into())));
//! ```

mod mock_fetcher;
mod mock_providers;
mod mock_vpn;

pub use mock_fetcher::MockFetcher;
pub use mock_providers::{
    MockCitationGraph, MockOaLookup, MockPdfLocator, MockRepositorySearch, MockTitleSearch,
};
pub use mock_vpn::MockVpn;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::Record;

    /// Bytes that pass PDF validation with the default minimum size.
    pub fn valid_pdf_bytes() -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<< /Type /Catalog >>\nendobj\n".to_vec();
        bytes.resize(2048, b' ');
        bytes.extend_from_slice(b"\n%%EOF\n");
        bytes
    }

    /// An HTML error page served where a PDF was expected.
    pub fn html_page() -> Vec<u8> {
        let mut bytes = b"<!DOCTYPE html><html><head><title>Access denied</title></head><body>"
            .to_vec();
        bytes.resize(4096, b' ');
        bytes.extend_from_slice(b"</body></html>");
        bytes
    }

    /// A record with a direct open-access link.
    pub fn oa_record(id: &str, url: &str) -> Record {
        Record::new(id, format!("Open paper {}", id))
            .with_authors(vec!["A. Author".to_string()])
            .with_year(2021)
            .with_pdf_url(url)
    }

    /// A record with nothing but a title.
    pub fn bare_record(id: &str, title: &str) -> Record {
        Record::new(id, title).with_year(2019)
    }

    /// Catalog document in the input format for `records`.
    pub fn catalog_json(records: &[Record]) -> String {
        let papers: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                let mut paper = serde_json::json!({
                    "paperId": r.id,
                    "title": r.title,
                    "authors": r.authors.iter().map(|a| serde_json::json!({"name": a})).collect::<Vec<_>>(),
                    "year": r.year,
                });
                if let Some(url) = &r.pdf_url {
                    paper["openAccessPdf"] = serde_json::json!({
                        "url": url,
                        "disclaimer": r.disclaimer,
                    });
                }
                if let Some(doi) = &r.doi {
                    paper["externalIds"] = serde_json::json!({ "DOI": doi });
                }
                paper
            })
            .collect();
        serde_json::json!({ "papers": papers }).to_string()
    }
}
