//! Phase sequencer.
//!
//! Drives the planned phases in fixed order over the current input set:
//! - Eligibility is snapshotted at phase start, in input order
//! - Records are processed strictly one at a time, each outcome persisted
//!   before the next record starts
//! - Shutdown is honoured between records, never mid-download

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::Record;
use crate::config::{Config, ConfigError};
use crate::fetch::{ArtifactStore, Downloader, Outcome, RetryPolicy};
use crate::manifest::{Manifest, ManifestEntry, Status};
use crate::metrics;
use crate::rotation::{RotationController, RotationSettings, RotationTrigger};
use crate::strategy::{
    CrossrefRescue, IdentifierEnricher, InstitutionalProxyRescue, LegalOaLookup,
    OpenAccessDirect, PhaseKind, RepositoryRescue, SearchFallback, Strategy, UrlTransform,
};

use super::collaborators::Collaborators;
use super::config::RunOptions;
use super::types::{PhaseReport, PipelineError, RotationSummary, RunReport};

/// Requests a running pipeline to stop after the current record.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Decide the manifest update for `outcome` in `phase`. `None` leaves the
/// entry as it is.
pub fn resolve_outcome(
    phase: PhaseKind,
    entry: &ManifestEntry,
    outcome: &Outcome,
) -> Option<ManifestEntry> {
    let mut updated = entry.clone();
    match outcome {
        Outcome::Success {
            source,
            resolved_url,
            artifact_path,
        } => {
            updated.mark_downloaded(*source, resolved_url.clone(), artifact_path.clone());
        }
        // Rescue phases only ever upgrade an entry.
        _ if phase.is_rescue() => return None,
        // Anything short of a PDF stays pending so the search phase still
        // sees it.
        _ if phase == PhaseKind::LegalOa => return None,
        Outcome::NotFound if phase == PhaseKind::SearchFallback => updated.mark_not_found(),
        Outcome::NotFound => updated.mark_failed(None),
        Outcome::TransientFailure { .. } | Outcome::PermanentFailure { .. } => {
            updated.mark_failed(outcome.attempted_url().map(str::to_string));
        }
    }
    Some(updated)
}

/// Runs acquisition phases over a manifest.
pub struct Pipeline {
    config: Config,
    collaborators: Collaborators,
    downloader: Downloader,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let downloader = Downloader::new(
            collaborators.fetcher.clone(),
            ArtifactStore::new(&config.download.artifact_dir),
            config.download.min_size_bytes,
        );
        let (tx, rx) = watch::channel(false);
        Self {
            config,
            collaborators,
            downloader,
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Sleep for `delay` unless a stop is requested first.
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() || self.is_stopped() {
            return;
        }
        let mut rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = rx.wait_for(|stopped| *stopped) => {}
        }
    }

    /// Execute one run over `records`.
    pub async fn run(
        &self,
        records: &[Record],
        manifest: &mut Manifest,
        options: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let planned = options.validate(&self.config)?;
        info!(
            records = records.len(),
            phases = ?planned.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            "Starting acquisition run"
        );

        if planned.contains(&PhaseKind::SearchFallback) && options.use_vpn {
            let available = match &self.collaborators.vpn {
                Some(vpn) => vpn.is_available().await,
                None => false,
            };
            if !available {
                return Err(PipelineError::Config(ConfigError::ValidationError(format!(
                    "VPN rotation requested but '{}' is not available",
                    self.config.vpn.tool
                ))));
            }
        }

        let mut reopened = 0;
        if options.retry_failed {
            reopened += self.reopen(manifest, Status::Failed)?;
        }
        if options.retry_not_found {
            reopened += self.reopen(manifest, Status::NotFound)?;
        }

        let mut report = RunReport {
            phases: Vec::new(),
            enrichment: None,
            rotation: None,
            reopened,
            interrupted: false,
            stats: manifest.stats(),
        };

        for phase in planned {
            if self.is_stopped() {
                break;
            }

            match phase {
                PhaseKind::Enrichment => {
                    let enricher = IdentifierEnricher::new(
                        self.collaborators.citation_graph.clone(),
                        self.config.s2_api.batch_size,
                        Duration::from_millis(self.config.s2_api.delay_ms),
                    );
                    let enrichment = enricher.enrich(records, manifest).await?;
                    let mut phase_report = PhaseReport::new(phase);
                    phase_report.processed = enrichment.added();
                    report.phases.push(phase_report);
                    report.enrichment = Some(enrichment);
                }
                PhaseKind::SearchFallback => {
                    let Some(strategy) = self.strategy_for(phase) else {
                        warn!(phase = %phase, "No search collaborator configured, skipping");
                        report.phases.push(PhaseReport::skipped(phase));
                        continue;
                    };
                    let mut rotation = self.rotation_controller(options).await?;
                    let phase_report = self
                        .run_phase(strategy.as_ref(), records, manifest, Some(&mut rotation))
                        .await?;
                    report.phases.push(phase_report);
                    let state = rotation.state();
                    report.rotation = Some(RotationSummary {
                        mode: rotation.mode(),
                        rotations: state.rotations,
                        failures: state.failures,
                        last_location: state.current_location.clone(),
                    });
                }
                _ => match self.strategy_for(phase) {
                    Some(strategy) => {
                        let phase_report = self
                            .run_phase(strategy.as_ref(), records, manifest, None)
                            .await?;
                        report.phases.push(phase_report);
                    }
                    None => {
                        warn!(phase = %phase, "No collaborator configured, skipping phase");
                        report.phases.push(PhaseReport::skipped(phase));
                    }
                },
            }
        }

        report.interrupted = self.is_stopped();
        report.stats = manifest.stats();
        if report.interrupted {
            warn!("Run interrupted, manifest is consistent and can be resumed");
        }
        info!(
            downloaded = report.stats.downloaded,
            pending = report.stats.pending,
            failed = report.stats.failed,
            not_found = report.stats.not_found,
            "Acquisition run finished"
        );
        Ok(report)
    }

    fn reopen(&self, manifest: &mut Manifest, status: Status) -> Result<usize, PipelineError> {
        let count = manifest.reopen(status)?;
        if count > 0 {
            metrics::STATUS_TRANSITIONS
                .with_label_values(&[status.as_str(), Status::Pending.as_str()])
                .inc_by(count as u64);
        }
        info!(status = %status, count, "Reopened entries for retry");
        Ok(count)
    }

    fn strategy_for(&self, phase: PhaseKind) -> Option<Box<dyn Strategy>> {
        let downloader = self.downloader.clone();
        let c = &self.collaborators;
        let strategy: Box<dyn Strategy> = match phase {
            PhaseKind::Enrichment => return None,
            PhaseKind::OpenAccess => {
                Box::new(OpenAccessDirect::new(c.resolver.clone(), downloader))
            }
            PhaseKind::LegalOa => Box::new(LegalOaLookup::new(c.oa_lookup.clone()?, downloader)),
            PhaseKind::UrlTransform => Box::new(UrlTransform::new(downloader)),
            PhaseKind::SearchFallback => Box::new(
                SearchFallback::new(c.title_search.clone()?, downloader).with_referer(format!(
                    "{}/",
                    self.config.scholar.base_url.trim_end_matches('/')
                )),
            ),
            PhaseKind::CoreRepository => {
                Box::new(RepositoryRescue::core(c.core.clone()?, downloader))
            }
            PhaseKind::EuropePmc => {
                Box::new(RepositoryRescue::europepmc(c.europepmc.clone()?, downloader))
            }
            PhaseKind::Arxiv => Box::new(RepositoryRescue::arxiv(c.arxiv.clone()?, downloader)),
            PhaseKind::UrlTransformRetry => Box::new(UrlTransform::retry(downloader)),
            PhaseKind::Crossref => {
                Box::new(CrossrefRescue::new(c.pdf_locator.clone()?, downloader))
            }
            PhaseKind::InstitutionalProxy => Box::new(InstitutionalProxyRescue::new(
                self.config.proxy.base_url.clone()?,
                self.config.proxy.publisher_domains.clone(),
                downloader,
            )),
        };
        Some(strategy)
    }

    fn phase_delay(&self, phase: PhaseKind) -> Duration {
        let ms = match phase {
            PhaseKind::LegalOa => self.config.unpaywall.delay_ms,
            PhaseKind::Crossref => self.config.crossref.delay_ms,
            PhaseKind::SearchFallback => self.config.scholar.delay_ms,
            PhaseKind::Enrichment => self.config.s2_api.delay_ms,
            PhaseKind::CoreRepository => self.config.core.delay_ms,
            PhaseKind::EuropePmc => self.config.europepmc.delay_ms,
            PhaseKind::Arxiv => self.config.arxiv.delay_ms,
            PhaseKind::OpenAccess
            | PhaseKind::UrlTransform
            | PhaseKind::UrlTransformRetry
            | PhaseKind::InstitutionalProxy => self.config.download.delay_ms,
        };
        Duration::from_millis(ms)
    }

    /// Consecutive rate-limited records after which a phase is abandoned.
    fn rate_limit_streak_limit(&self, phase: PhaseKind) -> Option<u32> {
        match phase {
            PhaseKind::CoreRepository => {
                Some(self.config.core.max_consecutive_rate_limits).filter(|n| *n > 0)
            }
            _ => None,
        }
    }

    async fn rotation_controller(
        &self,
        options: &RunOptions,
    ) -> Result<RotationController, PipelineError> {
        let settings =
            RotationSettings::from_config(&self.config.vpn, &self.config.scholar, options.scholar_delay);

        match (&self.collaborators.vpn, options.use_vpn) {
            (Some(vpn), true) => {
                let mut controller = RotationController::new(vpn.clone(), settings)
                    .with_stop(self.shutdown_rx.clone());
                controller.bootstrap().await?;
                Ok(controller)
            }
            _ => Ok(RotationController::disabled(settings)),
        }
    }

    async fn run_phase(
        &self,
        strategy: &dyn Strategy,
        records: &[Record],
        manifest: &mut Manifest,
        mut rotation: Option<&mut RotationController>,
    ) -> Result<PhaseReport, PipelineError> {
        let phase = strategy.phase();
        let mut report = PhaseReport::new(phase);

        let eligible: Vec<&Record> = records
            .iter()
            .filter(|r| {
                manifest
                    .get(&r.id)
                    .map(|e| strategy.is_eligible(r, e))
                    .unwrap_or(false)
            })
            .collect();
        report.eligible = eligible.len();
        info!(phase = %phase, eligible = eligible.len(), "Starting phase");

        let mut policy = RetryPolicy::from_config(&self.config.download);
        if rotation.is_some() {
            policy = policy.without_rate_limit_retries();
        }
        let streak_limit = self.rate_limit_streak_limit(phase);
        let mut rate_limit_streak = 0;

        for (index, record) in eligible.iter().copied().enumerate() {
            if self.is_stopped() {
                info!(phase = %phase, processed = report.processed, "Stop requested");
                break;
            }
            let Some(entry) = manifest.get(&record.id).cloned() else {
                continue;
            };

            let outcome = match rotation.as_deref_mut() {
                Some(controller) => {
                    self.attempt_with_rotation(strategy, &policy, record, &entry, controller)
                        .await
                }
                None => {
                    let entry_ref = &entry;
                    policy
                        .run(move |_| strategy.attempt(record, entry_ref))
                        .await
                }
            };

            metrics::PHASE_OUTCOMES
                .with_label_values(&[phase.as_str(), outcome.label()])
                .inc();

            let new_status = match resolve_outcome(phase, &entry, &outcome) {
                Some(updated) => {
                    let status = updated.status;
                    if status != entry.status {
                        metrics::STATUS_TRANSITIONS
                            .with_label_values(&[entry.status.as_str(), status.as_str()])
                            .inc();
                    }
                    manifest.upsert(updated)?;
                    Some(status)
                }
                None => None,
            };
            report.record(new_status);

            match (&outcome, new_status) {
                (Outcome::Success { resolved_url, .. }, _) => {
                    info!(phase = %phase, record = %record.id, url = %resolved_url, "Downloaded");
                }
                (_, status) => {
                    debug!(
                        phase = %phase,
                        record = %record.id,
                        outcome = outcome.label(),
                        status = ?status,
                        "Record processed"
                    );
                }
            }

            if outcome.is_rate_limited() {
                rate_limit_streak += 1;
            } else {
                rate_limit_streak = 0;
            }
            if streak_limit.is_some_and(|limit| rate_limit_streak >= limit) {
                warn!(
                    phase = %phase,
                    streak = rate_limit_streak,
                    "Rate limited on consecutive records, abandoning phase"
                );
                report.abandoned = true;
                break;
            }

            if index + 1 < eligible.len() {
                let delay = match rotation.as_deref_mut() {
                    Some(controller) => controller.next_delay(),
                    None => self.phase_delay(phase),
                };
                self.pause(delay).await;
            }
        }

        info!(
            phase = %phase,
            processed = report.processed,
            downloaded = report.downloaded,
            failed = report.failed,
            not_found = report.not_found,
            "Phase complete"
        );
        Ok(report)
    }

    /// Search-phase attempt: proactive rotation by count, then one reactive
    /// rotation and re-attempt on a rate-limit signal.
    async fn attempt_with_rotation(
        &self,
        strategy: &dyn Strategy,
        policy: &RetryPolicy,
        record: &Record,
        entry: &ManifestEntry,
        rotation: &mut RotationController,
    ) -> Outcome {
        if rotation.should_rotate_proactively() {
            rotation.rotate(RotationTrigger::Proactive).await;
        }

        let mut outcome = policy.run(move |_| strategy.attempt(record, entry)).await;

        if outcome.is_rate_limited() {
            warn!(record = %record.id, "Search rate limited");
            if rotation.should_rotate_reactively(&outcome)
                && rotation.rotate(RotationTrigger::Reactive).await
            {
                outcome = policy.run(move |_| strategy.attempt(record, entry)).await;
            }
        }

        rotation.record_processed();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Source;
    use std::path::PathBuf;

    fn entry() -> ManifestEntry {
        ManifestEntry::pending_from(&Record::new("r", "R"))
    }

    #[test]
    fn test_success_maps_to_downloaded() {
        let outcome = Outcome::Success {
            source: Source::OpenAccess,
            resolved_url: "https://x/a.pdf".into(),
            artifact_path: PathBuf::from("a.pdf"),
        };
        let updated = resolve_outcome(PhaseKind::OpenAccess, &entry(), &outcome).unwrap();
        assert_eq!(updated.status, Status::Downloaded);
        assert_eq!(updated.source, Some(Source::OpenAccess));
        assert!(updated.is_consistent());
    }

    #[test]
    fn test_not_found_depends_on_phase() {
        let e = entry();
        assert_eq!(
            resolve_outcome(PhaseKind::SearchFallback, &e, &Outcome::NotFound)
                .unwrap()
                .status,
            Status::NotFound
        );
        assert_eq!(
            resolve_outcome(PhaseKind::OpenAccess, &e, &Outcome::NotFound)
                .unwrap()
                .status,
            Status::Failed
        );
        assert!(resolve_outcome(PhaseKind::LegalOa, &e, &Outcome::NotFound).is_none());
    }

    #[test]
    fn test_failure_records_attempted_url() {
        let outcome = Outcome::transient("timeout").with_url("https://host.example/p.pdf");
        let updated = resolve_outcome(PhaseKind::OpenAccess, &entry(), &outcome).unwrap();
        assert_eq!(updated.status, Status::Failed);
        assert_eq!(updated.url.as_deref(), Some("https://host.example/p.pdf"));
        assert_eq!(updated.source, None);
    }

    #[test]
    fn test_legal_oa_failures_stay_pending() {
        let e = entry();
        let transient = Outcome::transient("HTTP 502").with_url("https://repo.example/p.pdf");
        assert!(resolve_outcome(PhaseKind::LegalOa, &e, &transient).is_none());
        let permanent = Outcome::permanent("HTML instead of PDF").with_url("https://repo.example/p");
        assert!(resolve_outcome(PhaseKind::LegalOa, &e, &permanent).is_none());
    }

    #[test]
    fn test_rescue_only_upgrades() {
        let mut failed = entry();
        failed.mark_failed(Some("https://a/b".into()));
        assert!(resolve_outcome(PhaseKind::Crossref, &failed, &Outcome::permanent("x")).is_none());
        assert!(
            resolve_outcome(PhaseKind::InstitutionalProxy, &failed, &Outcome::NotFound).is_none()
        );
        assert!(resolve_outcome(PhaseKind::CoreRepository, &failed, &Outcome::NotFound).is_none());
        assert!(resolve_outcome(
            PhaseKind::UrlTransformRetry,
            &failed,
            &Outcome::transient("timeout").with_url("https://b/c.pdf")
        )
        .is_none());
    }
}
