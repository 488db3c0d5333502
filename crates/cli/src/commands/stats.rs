//! Stats command - report manifest statistics.

use anyhow::Result;
use clap::Args;

use paperchase_core::{Config, ManifestStats, Status};

use super::read_manifest;
use crate::metrics;

/// Arguments for the stats command.
#[derive(Debug, Default, Args)]
pub struct StatsArgs {
    /// Print the statistics as JSON.
    #[arg(long)]
    pub json: bool,

    /// Print the Prometheus metrics exposition.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Execute the stats command.
pub fn execute(args: StatsArgs, config: &Config) -> Result<()> {
    let Some(entries) = read_manifest(config)? else {
        println!("No manifest found. Run 'download' first.");
        return Ok(());
    };

    let stats = ManifestStats::from_entries(&entries);
    metrics::record_manifest_stats(&stats);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", render_stats(&stats));
    }
    if args.print_metrics {
        println!("{}", metrics::encode_metrics());
    }
    Ok(())
}

/// Text statistics report: counts by status, identifier coverage, sources
/// of downloaded records and the most common failure domains.
pub fn render_stats(stats: &ManifestStats) -> String {
    let mut out = format!("Total records: {}\n", stats.total);
    for (label, status) in [
        ("Downloaded", Status::Downloaded),
        ("Pending", Status::Pending),
        ("Not found", Status::NotFound),
        ("Failed", Status::Failed),
    ] {
        out.push_str(&format!(
            "  {:<11} {} ({:.0}%)\n",
            format!("{}:", label),
            stats.count(status),
            stats.percent(status)
        ));
    }

    if stats.total > 0 {
        out.push_str(&format!(
            "\nDOI coverage: {}/{} ({:.0}%)\n",
            stats.with_doi,
            stats.total,
            stats.with_doi as f64 * 100.0 / stats.total as f64
        ));
    }

    if !stats.by_source.is_empty() {
        out.push_str("\nDownloaded by source:\n");
        for (source, count) in &stats.by_source {
            out.push_str(&format!("  {}: {}\n", source, count));
        }
    }

    if !stats.failure_domains.is_empty() {
        out.push_str("\nFailed downloads by domain:\n");
        for (domain, count) in &stats.failure_domains {
            out.push_str(&format!("  {}: {}\n", domain, count));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_stats_sections() {
        let stats = ManifestStats {
            total: 4,
            pending: 1,
            downloaded: 2,
            failed: 1,
            not_found: 0,
            by_source: BTreeMap::from([
                ("open_access".to_string(), 1),
                ("unpaywall".to_string(), 1),
            ]),
            failure_domains: vec![("sciencedirect.com".to_string(), 1)],
            with_doi: 3,
        };

        let text = render_stats(&stats);
        assert!(text.starts_with("Total records: 4\n"));
        assert!(text.contains("  Downloaded: 2 (50%)"));
        assert!(text.contains("  Failed:     1 (25%)"));
        assert!(text.contains("DOI coverage: 3/4 (75%)"));
        assert!(text.contains("Downloaded by source:\n  open_access: 1\n  unpaywall: 1\n"));
        assert!(text.contains("Failed downloads by domain:\n  sciencedirect.com: 1\n"));
    }

    #[test]
    fn test_render_empty_stats_omits_optional_sections() {
        let text = render_stats(&ManifestStats::default());
        assert!(text.contains("Total records: 0"));
        assert!(!text.contains("DOI coverage"));
        assert!(!text.contains("by source"));
        assert!(!text.contains("by domain"));
    }
}
