//! Types for the record catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One bibliographic entry requiring a PDF.
///
/// Immutable input; the manifest keeps its own denormalized copy of the
/// descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique record identifier (Semantic Scholar paper id).
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Known direct open-access PDF link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Known DOI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Licence/disclaimer text attached to the open-access link. Often
    /// embeds the DOI when `doi` is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
}

impl Record {
    /// Create a record with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            year: None,
            pdf_url: None,
            doi: None,
            disclaimer: None,
        }
    }

    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_disclaimer(mut self, text: impl Into<String>) -> Self {
        self.disclaimer = Some(text.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

/// Errors that can occur while reading the record catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("record source not found: {0}")]
    NotFound(String),

    #[error("failed to read record source: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse record source: {0}")]
    Parse(String),

    #[error("duplicate record identifier: {0}")]
    DuplicateId(String),
}
