//! Export-remaining command - CSV of records still lacking a PDF.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use paperchase_core::{Config, ManifestEntry, Status};

use super::read_manifest;

const CSV_HEADER: [&str; 8] = [
    "paper_id",
    "title",
    "authors",
    "year",
    "doi",
    "status",
    "last_url",
    "suggested_search",
];

/// Arguments for the export-remaining command.
#[derive(Debug, Default, Args)]
pub struct ExportArgs {
    /// Output file. Defaults to `manual_downloads.csv` next to the manifest.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Execute the export-remaining command.
pub fn execute(args: ExportArgs, config: &Config) -> Result<()> {
    let Some(entries) = read_manifest(config)? else {
        println!("No manifest found. Run 'download' first.");
        return Ok(());
    };

    let remaining = remaining_entries(&entries);
    if remaining.is_empty() {
        println!("All papers have been downloaded!");
        return Ok(());
    }

    let output = args.output.unwrap_or_else(|| default_output(config));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let mut file = io::BufWriter::new(
        fs::File::create(&output).with_context(|| format!("Failed to create {:?}", output))?,
    );
    write_csv(&mut file, &remaining, &config.scholar.base_url)
        .and_then(|()| file.flush())
        .with_context(|| format!("Failed to write {:?}", output))?;
    info!(path = ?output, rows = remaining.len(), "Exported remaining records");

    println!("Exported {} remaining papers to {}", remaining.len(), output.display());
    for status in [Status::Pending, Status::Failed, Status::NotFound] {
        let count = remaining.iter().filter(|e| e.status == status).count();
        if count > 0 {
            println!("  {}: {}", status, count);
        }
    }
    Ok(())
}

fn default_output(config: &Config) -> PathBuf {
    config
        .manifest
        .path
        .parent()
        .map(|dir| dir.join("manual_downloads.csv"))
        .unwrap_or_else(|| PathBuf::from("manual_downloads.csv"))
}

/// Entries without a PDF, in manifest order.
pub fn remaining_entries(entries: &[ManifestEntry]) -> Vec<&ManifestEntry> {
    entries
        .iter()
        .filter(|e| e.status != Status::Downloaded)
        .collect()
}

/// Search results page for `title` on the configured Scholar host.
pub fn suggested_search(scholar_base: &str, title: &str) -> String {
    format!(
        "{}/scholar?q={}",
        scholar_base.trim_end_matches('/'),
        urlencoding::encode(title)
    )
}

/// Write a header plus one row per entry.
pub fn write_csv<W: Write>(
    writer: &mut W,
    entries: &[&ManifestEntry],
    scholar_base: &str,
) -> io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER.join(","))?;
    for entry in entries {
        let year = entry.year.map(|y| y.to_string()).unwrap_or_default();
        let row: [&str; 8] = [
            entry.id.as_str(),
            entry.title.as_str(),
            &entry.authors.join("; "),
            &year,
            entry.doi.as_deref().unwrap_or(""),
            entry.status.as_str(),
            entry.url.as_deref().unwrap_or(""),
            &suggested_search(scholar_base, &entry.title),
        ];
        let fields: Vec<_> = row.iter().map(|f| csv_field(f)).collect();
        writeln!(writer, "{}", fields.join(","))?;
    }
    Ok(())
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperchase_core::{Record, Source};

    fn entries() -> Vec<ManifestEntry> {
        let mut done = ManifestEntry::pending_from(&Record::new("a", "Done"));
        done.mark_downloaded(Source::OpenAccess, "https://x/a.pdf".into(), "a.pdf".into());
        let mut failed = ManifestEntry::pending_from(
            &Record::new("b", "Heat, \"stress\" and yield")
                .with_authors(vec!["Ana Ruiz".into(), "Bo Li".into()])
                .with_year(2021)
                .with_doi("10.1000/b"),
        );
        failed.mark_failed(Some("https://www.publisher.com/b".into()));
        let mut not_found = ManifestEntry::pending_from(&Record::new("c", "Lost paper"));
        not_found.mark_not_found();
        let pending = ManifestEntry::pending_from(&Record::new("d", "Queued"));
        vec![done, failed, not_found, pending]
    }

    #[test]
    fn test_remaining_excludes_downloaded() {
        let entries = entries();
        let ids: Vec<_> = remaining_entries(&entries)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_suggested_search_encodes_title() {
        assert_eq!(
            suggested_search("https://scholar.google.com/", "Soil & water"),
            "https://scholar.google.com/scholar?q=Soil%20%26%20water"
        );
    }

    #[test]
    fn test_write_csv_rows_and_quoting() {
        let entries = entries();
        let remaining = remaining_entries(&entries);
        let mut out = Vec::new();
        write_csv(&mut out, &remaining, "https://scholar.google.com").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "paper_id,title,authors,year,doi,status,last_url,suggested_search"
        );
        assert!(lines[1].starts_with(
            "b,\"Heat, \"\"stress\"\" and yield\",Ana Ruiz; Bo Li,2021,10.1000/b,failed,https://www.publisher.com/b,"
        ));
        assert!(lines[2].starts_with("c,Lost paper,,,,not_found,,"));
        assert!(lines[3].starts_with("d,Queued,,,,pending,,https://scholar.google.com/scholar?q=Queued"));
    }

    #[test]
    fn test_csv_field_plain_value_unquoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a\nb"), "\"a\nb\"");
    }
}
