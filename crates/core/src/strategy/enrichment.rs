//! Identifier enrichment.
//!
//! Not a terminal strategy: it only fills in missing DOIs so the legal-OA
//! and rescue phases have something to look up. Sources in precedence order
//! are the record's own identifier, a DOI embedded in the disclaimer text,
//! and a batched citation-graph lookup. An identifier already on the
//! manifest entry is never replaced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Record;
use crate::manifest::{Manifest, ManifestError, Status};
use crate::metrics;
use crate::providers::{extract_doi, normalize_doi, CitationGraph};

/// Counts from one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub from_record: usize,
    pub from_disclaimer: usize,
    pub from_citation_graph: usize,
    pub failed_batches: usize,
    /// Entries in the input set still without an identifier.
    pub still_missing: usize,
}

impl EnrichmentReport {
    pub fn added(&self) -> usize {
        self.from_record + self.from_disclaimer + self.from_citation_graph
    }
}

/// Backfills external identifiers on manifest entries.
pub struct IdentifierEnricher {
    graph: Option<Arc<dyn CitationGraph>>,
    batch_size: usize,
    batch_delay: Duration,
}

impl IdentifierEnricher {
    pub fn new(
        graph: Option<Arc<dyn CitationGraph>>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            graph,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    /// Identifier for `record` from local metadata only.
    pub fn local_identifier(record: &Record) -> Option<(String, &'static str)> {
        if let Some(doi) = record.doi.as_deref().map(normalize_doi) {
            if !doi.is_empty() {
                return Some((doi, "record"));
            }
        }
        record
            .disclaimer
            .as_deref()
            .and_then(extract_doi)
            .map(|doi| (doi, "disclaimer"))
    }

    /// Run one enrichment pass over `records`. Only manifest errors are
    /// returned; lookup failures are logged and counted.
    pub async fn enrich(
        &self,
        records: &[Record],
        manifest: &mut Manifest,
    ) -> Result<EnrichmentReport, ManifestError> {
        let mut report = EnrichmentReport::default();

        for record in records {
            let Some(entry) = manifest.get(&record.id) else {
                continue;
            };
            if entry.has_doi() {
                continue;
            }
            if let Some((doi, origin)) = Self::local_identifier(record) {
                let mut updated = entry.clone();
                updated.set_doi(doi);
                manifest.upsert(updated)?;
                metrics::IDENTIFIERS_ENRICHED
                    .with_label_values(&[origin])
                    .inc();
                if origin == "record" {
                    report.from_record += 1;
                } else {
                    report.from_disclaimer += 1;
                }
            }
        }

        // Downloaded entries are done; looking them up would only add
        // network traffic on every rerun.
        let missing: Vec<String> = records
            .iter()
            .filter_map(|r| manifest.get(&r.id))
            .filter(|e| !e.has_doi() && e.status != Status::Downloaded)
            .map(|e| e.id.clone())
            .collect();

        if let Some(graph) = &self.graph {
            if !missing.is_empty() {
                info!(
                    count = missing.len(),
                    batch_size = self.batch_size,
                    "Looking up identifiers via citation graph"
                );
            }
            let batches: Vec<&[String]> = missing.chunks(self.batch_size).collect();
            for (index, batch) in batches.iter().enumerate() {
                if index > 0 && !self.batch_delay.is_zero() {
                    tokio::time::sleep(self.batch_delay).await;
                }
                match graph.lookup_identifiers(batch).await {
                    Ok(found) => {
                        report.from_citation_graph += apply_found(manifest, found)?;
                    }
                    Err(e) => {
                        warn!(batch = index, size = batch.len(), error = %e, "Citation graph batch failed");
                        report.failed_batches += 1;
                    }
                }
            }
        }

        report.still_missing = records
            .iter()
            .filter_map(|r| manifest.get(&r.id))
            .filter(|e| !e.has_doi())
            .count();

        info!(
            from_record = report.from_record,
            from_disclaimer = report.from_disclaimer,
            from_citation_graph = report.from_citation_graph,
            still_missing = report.still_missing,
            "Identifier enrichment complete"
        );
        Ok(report)
    }
}

fn apply_found(
    manifest: &mut Manifest,
    found: HashMap<String, String>,
) -> Result<usize, ManifestError> {
    let mut added = 0;
    let mut found: Vec<_> = found.into_iter().collect();
    found.sort();
    for (id, doi) in found {
        let Some(entry) = manifest.get(&id) else {
            debug!(id = %id, "Citation graph returned unknown record");
            continue;
        };
        if entry.has_doi() {
            continue;
        }
        let mut updated = entry.clone();
        updated.set_doi(doi);
        manifest.upsert(updated)?;
        metrics::IDENTIFIERS_ENRICHED
            .with_label_values(&["citation_graph"])
            .inc();
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestStore, Source, SqliteManifestStore};
    use crate::providers::LookupError;
    use crate::testing::MockCitationGraph;
    use std::path::PathBuf;

    fn manifest(records: &[Record]) -> Manifest {
        let store: Arc<dyn ManifestStore> = Arc::new(SqliteManifestStore::in_memory().unwrap());
        Manifest::load(store, records).unwrap()
    }

    #[test]
    fn test_local_identifier_precedence() {
        let both = Record::new("a", "A")
            .with_doi("10.1000/known")
            .with_disclaimer("see 10.2000/other");
        assert_eq!(
            IdentifierEnricher::local_identifier(&both),
            Some(("10.1000/known".to_string(), "record"))
        );

        let disclaimer = Record::new("b", "B").with_disclaimer("https://doi.org/10.2000/other.");
        assert_eq!(
            IdentifierEnricher::local_identifier(&disclaimer),
            Some(("10.2000/other".to_string(), "disclaimer"))
        );
        assert_eq!(IdentifierEnricher::local_identifier(&Record::new("c", "C")), None);
    }

    #[tokio::test]
    async fn test_enrich_uses_disclaimer_then_graph() {
        let records = vec![
            Record::new("a", "A").with_disclaimer("available at 10.5555/aaa1, cc-by"),
            Record::new("b", "B"),
            Record::new("c", "C"),
        ];
        let mut manifest = manifest(&records);
        let graph = Arc::new(MockCitationGraph::new());
        graph.set("b", "10.5555/bbb1");

        let enricher = IdentifierEnricher::new(Some(graph.clone()), 1, Duration::ZERO);
        let report = enricher.enrich(&records, &mut manifest).await.unwrap();

        assert_eq!(report.from_disclaimer, 1);
        assert_eq!(report.from_citation_graph, 1);
        assert_eq!(report.still_missing, 1);
        assert_eq!(manifest.get("a").unwrap().doi.as_deref(), Some("10.5555/aaa1"));
        assert_eq!(manifest.get("b").unwrap().doi.as_deref(), Some("10.5555/bbb1"));
        // One batch per missing record with batch size 1.
        assert_eq!(
            graph.batches(),
            vec![vec!["b".to_string()], vec!["c".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_existing_identifier_never_replaced() {
        let records = vec![Record::new("a", "A").with_disclaimer("10.5555/new1")];
        let mut manifest = manifest(&records);
        let mut entry = manifest.get("a").unwrap().clone();
        entry.set_doi("10.5555/old1".into());
        manifest.upsert(entry).unwrap();

        let enricher = IdentifierEnricher::new(None, 10, Duration::ZERO);
        let report = enricher.enrich(&records, &mut manifest).await.unwrap();
        assert_eq!(report.added(), 0);
        assert_eq!(manifest.get("a").unwrap().doi.as_deref(), Some("10.5555/old1"));
    }

    #[tokio::test]
    async fn test_downloaded_entries_not_looked_up_and_errors_absorbed() {
        let records = vec![Record::new("a", "A"), Record::new("b", "B")];
        let mut manifest = manifest(&records);
        let mut done = manifest.get("a").unwrap().clone();
        done.mark_downloaded(Source::OpenAccess, "u".into(), PathBuf::from("a.pdf"));
        manifest.upsert(done).unwrap();

        let graph = Arc::new(MockCitationGraph::new());
        graph.fail_with(LookupError::RateLimited("429".into()));
        let enricher = IdentifierEnricher::new(Some(graph.clone()), 500, Duration::ZERO);
        let report = enricher.enrich(&records, &mut manifest).await.unwrap();

        assert_eq!(report.failed_batches, 1);
        assert_eq!(graph.batches(), vec![vec!["b".to_string()]]);
    }
}
