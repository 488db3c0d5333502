use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::vpn::{VpnControl, VpnError};
use crate::config::{RotationStrategy, ScholarConfig, VpnConfig};
use crate::fetch::Outcome;
use crate::metrics;

/// Lifecycle of the rotation controller within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    Disabled,
    Active,
    /// Too many consecutive failures. Acts like `Disabled` for the rest of
    /// the run.
    Degraded,
}

impl RotationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationMode::Disabled => "disabled",
            RotationMode::Active => "active",
            RotationMode::Degraded => "degraded",
        }
    }
}

/// What asked for a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    Proactive,
    Reactive,
    Bootstrap,
}

impl RotationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationTrigger::Proactive => "proactive",
            RotationTrigger::Reactive => "reactive",
            RotationTrigger::Bootstrap => "bootstrap",
        }
    }
}

/// Tunables for the controller, resolved from configuration.
#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub strategy: RotationStrategy,
    pub locations: Vec<String>,
    pub connection_timeout: Duration,
    pub min_interval: Duration,
    pub max_failures: u32,
    pub rotate_every: u32,
    pub recent_history: usize,
    pub verify_ip_change: bool,
    pub baseline_delay: Duration,
    pub delay_after_rotation: Duration,
    pub recovery_requests: u32,
}

impl RotationSettings {
    /// `delay_override` replaces the configured baseline search delay.
    pub fn from_config(
        vpn: &VpnConfig,
        scholar: &ScholarConfig,
        delay_override: Option<Duration>,
    ) -> Self {
        Self {
            strategy: vpn.rotation_strategy,
            locations: vpn.preferred_locations.clone(),
            connection_timeout: Duration::from_secs(vpn.connection_timeout_secs),
            min_interval: Duration::from_secs(vpn.min_rotation_interval_secs),
            max_failures: vpn.max_rotation_failures.max(1),
            rotate_every: vpn.rotate_every_n_papers.max(1),
            recent_history: vpn.recent_history.max(1),
            verify_ip_change: vpn.verify_ip_change,
            baseline_delay: delay_override
                .unwrap_or_else(|| Duration::from_millis(scholar.delay_ms)),
            delay_after_rotation: Duration::from_millis(scholar.delay_after_rotation_ms),
            recovery_requests: scholar.delay_recovery_requests,
        }
    }
}

/// Mutable rotation bookkeeping for one search phase.
#[derive(Debug, Clone, Serialize)]
pub struct RotationState {
    pub current_location: Option<String>,
    /// Most recent first, capped at the configured history length.
    pub recent: VecDeque<String>,
    pub since_rotation: u32,
    pub consecutive_failures: u32,
    pub rotations: u32,
    pub failures: u32,
    /// Position on the delay recovery curve; equal to the recovery length
    /// once back at baseline.
    recovery_step: u32,
    #[serde(skip)]
    last_rotation: Option<Instant>,
    #[serde(skip)]
    cursor: usize,
}

impl RotationState {
    fn new(recovery_requests: u32) -> Self {
        Self {
            current_location: None,
            recent: VecDeque::new(),
            since_rotation: 0,
            consecutive_failures: 0,
            rotations: 0,
            failures: 0,
            recovery_step: recovery_requests,
            last_rotation: None,
            cursor: 0,
        }
    }
}

/// Decides when to change egress location and paces the search phase.
pub struct RotationController {
    mode: RotationMode,
    settings: RotationSettings,
    state: RotationState,
    vpn: Option<Arc<dyn VpnControl>>,
    rng: StdRng,
    stop: Option<watch::Receiver<bool>>,
}

impl RotationController {
    /// Controller that only paces requests at the baseline delay.
    pub fn disabled(settings: RotationSettings) -> Self {
        Self {
            mode: RotationMode::Disabled,
            state: RotationState::new(settings.recovery_requests),
            settings,
            vpn: None,
            rng: StdRng::from_entropy(),
            stop: None,
        }
    }

    pub fn new(vpn: Arc<dyn VpnControl>, settings: RotationSettings) -> Self {
        let mode = if settings.locations.is_empty() {
            warn!("No VPN locations configured, rotation disabled");
            RotationMode::Disabled
        } else {
            RotationMode::Active
        };
        Self {
            mode,
            state: RotationState::new(settings.recovery_requests),
            settings,
            vpn: Some(vpn),
            rng: StdRng::from_entropy(),
            stop: None,
        }
    }

    /// Fixed seed for reproducible location choices.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Abandon a cooldown wait once `stop` turns true.
    pub fn with_stop(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn mode(&self) -> RotationMode {
        self.mode
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    pub fn should_rotate_proactively(&self) -> bool {
        self.mode == RotationMode::Active && self.state.since_rotation >= self.settings.rotate_every
    }

    pub fn should_rotate_reactively(&self, outcome: &Outcome) -> bool {
        self.mode == RotationMode::Active && outcome.is_rate_limited()
    }

    /// Count one processed record towards the proactive threshold.
    pub fn record_processed(&mut self) {
        self.state.since_rotation += 1;
    }

    /// Delay to wait before the next request. Starts at the post-rotation
    /// delay after a successful rotation and climbs geometrically back to
    /// baseline over the recovery window.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_at(self.state.recovery_step);
        if self.state.recovery_step < self.settings.recovery_requests {
            self.state.recovery_step += 1;
        }
        delay
    }

    fn delay_at(&self, step: u32) -> Duration {
        let baseline = self.settings.baseline_delay;
        let start = self.settings.delay_after_rotation;
        let steps = self.settings.recovery_requests;
        if step >= steps || start >= baseline {
            return baseline;
        }
        let start_ms = (start.as_millis() as f64).max(1.0);
        let ratio = baseline.as_millis() as f64 / start_ms;
        let ms = (start_ms * ratio.powf(step as f64 / steps as f64)).round();
        Duration::from_millis(ms as u64).min(baseline)
    }

    /// Ensure the VPN is usable before the search phase starts.
    ///
    /// Fails if the tool is missing, or if it is disconnected and the initial
    /// rotation does not succeed.
    pub async fn bootstrap(&mut self) -> Result<(), VpnError> {
        let Some(vpn) = self.vpn.clone() else {
            return Ok(());
        };
        if !vpn.is_available().await {
            return Err(VpnError::NotInstalled("VPN control tool".to_string()));
        }
        if vpn.is_connected().await.unwrap_or(false) {
            info!("VPN already connected");
            return Ok(());
        }
        if self.rotate(RotationTrigger::Bootstrap).await {
            Ok(())
        } else {
            Err(VpnError::CommandFailed {
                command: "connect".to_string(),
                stderr: "initial VPN connection failed".to_string(),
            })
        }
    }

    /// Switch to a new location. Never fails the run: on error the failure
    /// counter grows and the controller degrades once it hits the limit.
    pub async fn rotate(&mut self, trigger: RotationTrigger) -> bool {
        let vpn = match (&self.vpn, self.mode) {
            (Some(vpn), RotationMode::Active) => vpn.clone(),
            (_, mode) => {
                if mode == RotationMode::Degraded {
                    metrics::ROTATIONS
                        .with_label_values(&[trigger.as_str(), "skipped_degraded"])
                        .inc();
                }
                return false;
            }
        };

        self.state.since_rotation = 0;

        if let Some(last) = self.state.last_rotation {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_interval {
                let wait = self.settings.min_interval - elapsed;
                info!(wait_secs = wait.as_secs_f64(), "Waiting out rotation cooldown");
                if !self.cooldown(wait).await {
                    info!(trigger = trigger.as_str(), "Stop requested, rotation abandoned");
                    return false;
                }
            }
        }

        let Some(location) = self.choose_location() else {
            return false;
        };

        let ip_before = if self.settings.verify_ip_change {
            vpn.public_ip().await
        } else {
            None
        };

        info!(
            trigger = trigger.as_str(),
            location = %location,
            "Rotating VPN location"
        );

        if let Err(e) = vpn.disconnect().await {
            debug!(error = %e, "Disconnect before rotation failed");
        }

        match vpn
            .connect_to(&location, self.settings.connection_timeout)
            .await
        {
            Ok(()) => {
                self.on_success(location.clone());
                metrics::ROTATIONS
                    .with_label_values(&[trigger.as_str(), "success"])
                    .inc();
                if self.settings.verify_ip_change {
                    let ip_after = vpn.public_ip().await;
                    match (&ip_before, &ip_after) {
                        (Some(before), Some(after)) if before == after => {
                            warn!(ip = %after, "Public IP unchanged after rotation")
                        }
                        (_, Some(after)) => info!(ip = %after, location = %location, "Public IP after rotation"),
                        _ => debug!("Could not verify public IP"),
                    }
                }
                true
            }
            Err(e) => {
                self.on_failure(&location, &e);
                metrics::ROTATIONS
                    .with_label_values(&[trigger.as_str(), "failure"])
                    .inc();
                false
            }
        }
    }

    /// Sleep for `wait`. Returns `false` if a stop arrived first.
    async fn cooldown(&mut self, wait: Duration) -> bool {
        let Some(stop) = self.stop.as_mut() else {
            tokio::time::sleep(wait).await;
            return true;
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            Ok(_) = stop.wait_for(|stopped| *stopped) => false,
        }
    }

    fn on_success(&mut self, location: String) {
        let state = &mut self.state;
        state.recent.push_front(location.clone());
        state.recent.truncate(self.settings.recent_history);
        state.current_location = Some(location);
        state.consecutive_failures = 0;
        state.rotations += 1;
        state.recovery_step = 0;
        state.last_rotation = Some(Instant::now());
    }

    fn on_failure(&mut self, location: &str, error: &VpnError) {
        self.state.consecutive_failures += 1;
        self.state.failures += 1;
        warn!(
            location,
            error = %error,
            consecutive = self.state.consecutive_failures,
            "VPN rotation failed"
        );
        if self.state.consecutive_failures >= self.settings.max_failures {
            warn!(
                failures = self.state.consecutive_failures,
                "Rotation degraded, continuing without VPN changes"
            );
            self.mode = RotationMode::Degraded;
            self.state.recovery_step = self.settings.recovery_requests;
        }
    }

    fn choose_location(&mut self) -> Option<String> {
        let locations = &self.settings.locations;
        if locations.is_empty() {
            return None;
        }
        match self.settings.strategy {
            RotationStrategy::Sequential => {
                let location = locations[self.state.cursor % locations.len()].clone();
                self.state.cursor = (self.state.cursor + 1) % locations.len();
                Some(location)
            }
            RotationStrategy::Random => locations.choose(&mut self.rng).cloned(),
            RotationStrategy::Smart => {
                let current = self.state.current_location.as_ref();
                let fresh: Vec<&String> = locations
                    .iter()
                    .filter(|l| !self.state.recent.contains(l) && Some(*l) != current)
                    .collect();
                let pool: Vec<&String> = if fresh.is_empty() {
                    let others: Vec<&String> =
                        locations.iter().filter(|l| Some(*l) != current).collect();
                    if others.is_empty() {
                        locations.iter().collect()
                    } else {
                        others
                    }
                } else {
                    fresh
                };
                pool.choose(&mut self.rng).map(|l| (*l).clone())
            }
        }
    }
}
