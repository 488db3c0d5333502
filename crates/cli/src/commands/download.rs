//! Download command - run the acquisition pipeline.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tracing::{error, info, warn};

use paperchase_core::{
    load_records, open_store, Collaborators, Config, Manifest, PhaseKind, Pipeline, RunMode,
    RunOptions, RunReport,
};

use super::stats::render_stats;
use crate::metrics;

/// Arguments for the download command.
#[derive(Debug, Default, Args)]
pub struct DownloadArgs {
    /// Only download records with direct open-access URLs (plus identifier
    /// enrichment and the legal open-access lookup).
    #[arg(long, conflicts_with_all = ["scholar_only", "repos_only"])]
    pub open_access_only: bool,

    /// Only search Google Scholar for pending records.
    #[arg(long, conflicts_with = "repos_only")]
    pub scholar_only: bool,

    /// Only search the open repositories (CORE, Europe PMC, arXiv) for
    /// failed and not-found records.
    #[arg(long)]
    pub repos_only: bool,

    /// Skip identifier enrichment.
    #[arg(long)]
    pub skip_enrichment: bool,

    /// Skip direct open-access downloads.
    #[arg(long)]
    pub skip_open_access: bool,

    /// Skip the Unpaywall phase.
    #[arg(long)]
    pub skip_unpaywall: bool,

    /// Skip publisher URL transforms.
    #[arg(long)]
    pub skip_url_transform: bool,

    /// Skip the Google Scholar phase.
    #[arg(long)]
    pub skip_scholar: bool,

    /// Skip the CORE repository search.
    #[arg(long)]
    pub skip_core: bool,

    /// Skip the Europe PMC search.
    #[arg(long)]
    pub skip_europepmc: bool,

    /// Skip the arXiv search.
    #[arg(long)]
    pub skip_arxiv: bool,

    /// Skip the second URL-transform pass over failed records.
    #[arg(long)]
    pub skip_url_transform_retry: bool,

    /// Run the Crossref link-discovery phase.
    #[arg(long)]
    pub use_crossref: bool,

    /// Run the institutional proxy phase for paywalled records.
    #[arg(long)]
    pub use_proxy_institutional: bool,

    /// Reset records marked `failed` to pending before running.
    #[arg(long)]
    pub retry_failed: bool,

    /// Reset records marked `not_found` to pending before running.
    #[arg(long)]
    pub retry_not_found: bool,

    /// Seconds between Google Scholar requests.
    #[arg(long, value_parser = parse_seconds)]
    pub scholar_delay: Option<Duration>,

    /// Route Google Scholar requests through `scholar.proxy_url`.
    #[arg(long)]
    pub use_proxy: bool,

    /// Rotate ExpressVPN locations during the Scholar phase.
    #[arg(long)]
    pub use_vpn: bool,

    /// Contact address for the Unpaywall API (overrides configuration).
    #[arg(long)]
    pub unpaywall_email: Option<String>,

    /// Print the Prometheus metrics exposition after the run.
    #[arg(long)]
    pub print_metrics: bool,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{}' is not a valid delay", value))
}

impl DownloadArgs {
    /// Translate flags into pipeline options.
    pub fn to_options(&self) -> RunOptions {
        let mode = if self.open_access_only {
            RunMode::OpenAccessOnly
        } else if self.scholar_only {
            RunMode::ScholarOnly
        } else if self.repos_only {
            RunMode::RepositoriesOnly
        } else {
            RunMode::Full
        };

        let skip = [
            (self.skip_enrichment, PhaseKind::Enrichment),
            (self.skip_open_access, PhaseKind::OpenAccess),
            (self.skip_unpaywall, PhaseKind::LegalOa),
            (self.skip_url_transform, PhaseKind::UrlTransform),
            (self.skip_scholar, PhaseKind::SearchFallback),
            (self.skip_core, PhaseKind::CoreRepository),
            (self.skip_europepmc, PhaseKind::EuropePmc),
            (self.skip_arxiv, PhaseKind::Arxiv),
            (self.skip_url_transform_retry, PhaseKind::UrlTransformRetry),
        ]
        .into_iter()
        .filter_map(|(flag, phase)| flag.then_some(phase))
        .collect();

        let enable = [
            (self.use_crossref, PhaseKind::Crossref),
            (self.use_proxy_institutional, PhaseKind::InstitutionalProxy),
        ]
        .into_iter()
        .filter_map(|(flag, phase)| flag.then_some(phase))
        .collect();

        RunOptions {
            mode,
            skip,
            enable,
            retry_failed: self.retry_failed,
            retry_not_found: self.retry_not_found,
            scholar_delay: self.scholar_delay,
            use_proxy: self.use_proxy,
            use_vpn: self.use_vpn,
            unpaywall_email: self.unpaywall_email.clone(),
        }
    }
}

/// Execute the download command.
///
/// # Errors
///
/// Returns an error if the records cannot be loaded, the manifest is
/// corrupt, or the run is misconfigured. Per-record failures are recorded in
/// the manifest and never surface here.
pub async fn execute(args: DownloadArgs, config: Config) -> Result<()> {
    let options = args.to_options();

    let records = load_records(&config.source.records_path).with_context(|| {
        format!("Failed to load records from {:?}", config.source.records_path)
    })?;
    info!("Loaded {} records", records.len());

    let store = open_store(config.manifest.backend, &config.manifest.path)
        .with_context(|| format!("Failed to open manifest at {:?}", config.manifest.path))?;
    let mut manifest = Manifest::load(store, &records).with_context(|| {
        format!(
            "Failed to load manifest {:?} (the file is left untouched)",
            config.manifest.path
        )
    })?;

    let collaborators =
        Collaborators::from_config(&config, &options).context("Failed to set up collaborators")?;
    let pipeline = Pipeline::new(config, collaborators);

    // Stop between records on Ctrl+C or SIGTERM.
    let stop = pipeline.stop_handle();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing the current record");
        stop.stop();
    });

    let result = pipeline.run(&records, &mut manifest, &options).await;
    signal_task.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Run aborted: {}", e);
            // Whatever was persisted before the abort is still reported.
            println!("{}", render_stats(&manifest.stats()));
            return Err(e).context("Download run failed");
        }
    };

    metrics::record_manifest_stats(&report.stats);
    println!("{}", render_report(&report));
    if args.print_metrics {
        println!("{}", metrics::encode_metrics());
    }
    Ok(())
}

/// Human-readable run summary followed by the statistics report.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();

    if let Some(enrichment) = &report.enrichment {
        out.push_str(&format!(
            "Identifier enrichment: {} added ({} from records, {} from disclaimers, {} from citation graph), {} still missing\n",
            enrichment.added(),
            enrichment.from_record,
            enrichment.from_disclaimer,
            enrichment.from_citation_graph,
            enrichment.still_missing,
        ));
    }
    if report.reopened > 0 {
        out.push_str(&format!("Reopened {} entries for retry\n", report.reopened));
    }

    for phase in &report.phases {
        if phase.skipped {
            out.push_str(&format!("{} phase: skipped\n", phase.phase));
            continue;
        }
        out.push_str(&format!(
            "{} phase: {} eligible, {} downloaded, {} not found, {} failed, {} unchanged",
            phase.phase,
            phase.eligible,
            phase.downloaded,
            phase.not_found,
            phase.failed,
            phase.unchanged,
        ));
        if phase.abandoned {
            out.push_str(" (abandoned after repeated rate limiting)");
        }
        out.push('\n');
    }

    if let Some(rotation) = &report.rotation {
        out.push_str(&format!(
            "VPN rotation: {} ({} rotations, {} failures",
            rotation.mode.as_str(),
            rotation.rotations,
            rotation.failures,
        ));
        if let Some(location) = &rotation.last_location {
            out.push_str(&format!(", last location {}", location));
        }
        out.push_str(")\n");
    }

    if report.interrupted {
        out.push_str("Run interrupted; rerun to resume\n");
    }

    out.push('\n');
    out.push_str(&render_stats(&report.stats));
    out
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
