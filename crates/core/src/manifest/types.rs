//! Core manifest data types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Record;

/// Acquisition status of one record.
///
/// `pending -> {downloaded | failed | not_found}`; `failed` and `not_found`
/// only return to `pending` on an explicit retry request. `downloaded` is
/// terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Downloaded,
    Failed,
    NotFound,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Downloaded,
        Status::Failed,
        Status::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Downloaded => "downloaded",
            Status::Failed => "failed",
            Status::NotFound => "not_found",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced a downloaded artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    OpenAccess,
    Unpaywall,
    UrlTransform,
    GoogleScholar,
    Core,
    #[serde(rename = "europepmc")]
    EuropePmc,
    Arxiv,
    Crossref,
    InstitutionalProxy,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::OpenAccess => "open_access",
            Source::Unpaywall => "unpaywall",
            Source::UrlTransform => "url_transform",
            Source::GoogleScholar => "google_scholar",
            Source::Core => "core",
            Source::EuropePmc => "europepmc",
            Source::Arxiv => "arxiv",
            Source::Crossref => "crossref",
            Source::InstitutionalProxy => "institutional_proxy",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted acquisition state for one record.
///
/// Status transitions go through the `mark_*` / `reopen` methods, which keep
/// the invariants: `status == downloaded` iff `file_path` is set, and
/// `source` is set iff `status == downloaded`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub doi: Option<String>,
    pub status: Status,
    #[serde(default)]
    pub source: Option<Source>,
    /// Last URL resolved or attempted for this record.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl ManifestEntry {
    /// New `pending` entry carrying the record's descriptive metadata.
    pub fn pending_from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            authors: record.authors.clone(),
            year: record.year,
            doi: record.doi.clone(),
            status: Status::Pending,
            source: None,
            url: None,
            file_path: None,
            updated_at: Utc::now(),
        }
    }

    pub fn mark_downloaded(&mut self, source: Source, url: String, file_path: PathBuf) {
        self.status = Status::Downloaded;
        self.source = Some(source);
        self.url = Some(url);
        self.file_path = Some(file_path);
        self.touch();
    }

    /// Mark failed. `attempted_url` replaces the stored URL when present.
    pub fn mark_failed(&mut self, attempted_url: Option<String>) {
        self.status = Status::Failed;
        self.source = None;
        self.file_path = None;
        if attempted_url.is_some() {
            self.url = attempted_url;
        }
        self.touch();
    }

    pub fn mark_not_found(&mut self) {
        self.status = Status::NotFound;
        self.source = None;
        self.file_path = None;
        self.touch();
    }

    /// Return a `failed` / `not_found` entry to `pending`. Returns false
    /// (and changes nothing) for any other status.
    pub fn reopen(&mut self) -> bool {
        match self.status {
            Status::Failed | Status::NotFound => {
                self.status = Status::Pending;
                self.touch();
                true
            }
            Status::Pending | Status::Downloaded => false,
        }
    }

    pub fn set_doi(&mut self, doi: String) {
        self.doi = Some(doi);
        self.touch();
    }

    pub fn has_doi(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Check the status/artifact/source invariants.
    pub fn is_consistent(&self) -> bool {
        let has_file = self
            .file_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        let downloaded = self.status == Status::Downloaded;
        downloaded == has_file && downloaded == self.source.is_some()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ManifestEntry {
        ManifestEntry::pending_from(
            &Record::new("p1", "A title")
                .with_authors(vec!["X".to_string()])
                .with_year(2020),
        )
    }

    #[test]
    fn test_pending_from_record() {
        let e = entry();
        assert_eq!(e.status, Status::Pending);
        assert_eq!(e.title, "A title");
        assert_eq!(e.year, Some(2020));
        assert!(e.is_consistent());
    }

    #[test]
    fn test_mark_downloaded_then_failed_clears_artifact() {
        let mut e = entry();
        e.mark_downloaded(
            Source::OpenAccess,
            "https://x/a.pdf".to_string(),
            PathBuf::from("pdfs/p1.pdf"),
        );
        assert!(e.is_consistent());
        assert_eq!(e.source, Some(Source::OpenAccess));

        e.mark_failed(None);
        assert_eq!(e.status, Status::Failed);
        assert!(e.source.is_none());
        assert!(e.file_path.is_none());
        assert_eq!(e.url.as_deref(), Some("https://x/a.pdf"));
        assert!(e.is_consistent());
    }

    #[test]
    fn test_reopen_only_failed_or_not_found() {
        let mut e = entry();
        assert!(!e.reopen());

        e.mark_not_found();
        assert!(e.reopen());
        assert_eq!(e.status, Status::Pending);

        e.mark_downloaded(Source::Unpaywall, "u".into(), PathBuf::from("f.pdf"));
        assert!(!e.reopen());
        assert_eq!(e.status, Status::Downloaded);
    }

    #[test]
    fn test_inconsistent_entry_detected() {
        let mut e = entry();
        e.status = Status::Downloaded;
        assert!(!e.is_consistent());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&Status::NotFound).unwrap(),
            "\"not_found\""
        );
        assert_eq!(
            serde_json::to_string(&Source::GoogleScholar).unwrap(),
            "\"google_scholar\""
        );
        assert_eq!(Status::NotFound.to_string(), "not_found");
    }
}
