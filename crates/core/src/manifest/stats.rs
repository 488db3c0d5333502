//! Aggregate statistics over a manifest.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::{ManifestEntry, Status};

/// Number of failure domains kept in the report.
pub const TOP_FAILURE_DOMAINS: usize = 15;

/// Counts by status and source, plus failure analysis.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ManifestStats {
    pub total: usize,
    pub pending: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub not_found: usize,
    /// Downloaded entries per source tag.
    pub by_source: BTreeMap<String, usize>,
    /// Most common hosts among failed entries' last URLs, descending.
    pub failure_domains: Vec<(String, usize)>,
    pub with_doi: usize,
}

impl ManifestStats {
    pub fn from_entries(entries: &[ManifestEntry]) -> Self {
        let mut stats = ManifestStats {
            total: entries.len(),
            ..Default::default()
        };
        let mut domains: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            match entry.status {
                Status::Pending => stats.pending += 1,
                Status::Downloaded => stats.downloaded += 1,
                Status::Failed => stats.failed += 1,
                Status::NotFound => stats.not_found += 1,
            }
            if let Some(source) = entry.source {
                *stats.by_source.entry(source.as_str().to_string()).or_default() += 1;
            }
            if entry.status == Status::Failed {
                if let Some(host) = entry.url.as_deref().and_then(failure_domain) {
                    *domains.entry(host).or_default() += 1;
                }
            }
            if entry.has_doi() {
                stats.with_doi += 1;
            }
        }

        let mut domains: Vec<_> = domains.into_iter().collect();
        domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        domains.truncate(TOP_FAILURE_DOMAINS);
        stats.failure_domains = domains;
        stats
    }

    pub fn count(&self, status: Status) -> usize {
        match status {
            Status::Pending => self.pending,
            Status::Downloaded => self.downloaded,
            Status::Failed => self.failed,
            Status::NotFound => self.not_found,
        }
    }

    /// Fraction of entries in `status`, as a percentage.
    pub fn percent(&self, status: Status) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.count(status) as f64 * 100.0 / self.total as f64
        }
    }
}

/// Host of `url` with a leading `www.` removed.
fn failure_domain(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Record;
    use crate::manifest::Source;
    use std::path::PathBuf;

    fn entry(id: &str) -> ManifestEntry {
        ManifestEntry::pending_from(&Record::new(id, id))
    }

    #[test]
    fn test_counts_and_sources() {
        let mut a = entry("a");
        a.mark_downloaded(Source::OpenAccess, "u".into(), PathBuf::from("a.pdf"));
        let mut b = entry("b");
        b.mark_downloaded(Source::GoogleScholar, "u".into(), PathBuf::from("b.pdf"));
        let mut c = entry("c");
        c.mark_not_found();
        let mut d = entry("d");
        d.set_doi("10.1/d".into());

        let stats = ManifestStats::from_entries(&[a, b, c, d]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.by_source.get("open_access"), Some(&1));
        assert_eq!(stats.by_source.get("google_scholar"), Some(&1));
        assert_eq!(stats.with_doi, 1);
        assert!((stats.percent(Status::Downloaded) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_domains_strip_www_and_sort() {
        let urls = [
            "https://www.sciencedirect.com/a.pdf",
            "https://sciencedirect.com/b.pdf",
            "https://link.springer.com/c.pdf",
            "not a url",
        ];
        let entries: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(i, u)| {
                let mut e = entry(&i.to_string());
                e.mark_failed(Some(u.to_string()));
                e
            })
            .collect();

        let stats = ManifestStats::from_entries(&entries);
        assert_eq!(stats.failed, 4);
        assert_eq!(
            stats.failure_domains,
            vec![
                ("sciencedirect.com".to_string(), 2),
                ("link.springer.com".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_empty_manifest() {
        let stats = ManifestStats::from_entries(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percent(Status::Failed), 0.0);
    }
}
