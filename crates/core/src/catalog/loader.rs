//! Reads records from a Semantic Scholar style JSON export.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{CatalogError, Record};

#[derive(Debug, Deserialize)]
struct SourceDocument {
    papers: Vec<RawPaper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaper {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<Vec<RawAuthor>>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    open_access_pdf: Option<RawOpenAccess>,
    #[serde(default)]
    external_ids: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOpenAccess {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    disclaimer: Option<String>,
}

impl From<RawPaper> for Record {
    fn from(raw: RawPaper) -> Self {
        let (pdf_url, disclaimer) = match raw.open_access_pdf {
            Some(oa) => (non_empty(oa.url), non_empty(oa.disclaimer)),
            None => (None, None),
        };

        let doi = raw
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("DOI"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Record {
            id: raw.paper_id,
            title: raw.title.unwrap_or_default(),
            authors: raw
                .authors
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| non_empty(a.name))
                .collect(),
            year: raw.year,
            pdf_url,
            doi,
            disclaimer,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Load the ordered record list from a JSON export on disk.
pub fn load_records(path: &Path) -> Result<Vec<Record>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::NotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)?;
    let records = parse_records(&raw)?;
    debug!(path = %path.display(), count = records.len(), "Loaded records");
    Ok(records)
}

/// Parse the ordered record list from a JSON export.
///
/// Input order is preserved; duplicate identifiers are rejected.
pub fn parse_records(json: &str) -> Result<Vec<Record>, CatalogError> {
    let doc: SourceDocument =
        serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(doc.papers.len());
    for paper in doc.papers {
        if !seen.insert(paper.paper_id.clone()) {
            return Err(CatalogError::DuplicateId(paper.paper_id));
        }
        records.push(Record::from(paper));
    }
    Ok(records)
}
