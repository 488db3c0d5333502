//! Per-run options and run planning.

use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, ConfigError, PhasesConfig};
use crate::strategy::PhaseKind;

/// Which subset of phases a run is restricted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every phase enabled in configuration.
    #[default]
    Full,
    /// Enrichment, open-access download and legal-OA lookup only.
    OpenAccessOnly,
    /// Search fallback only.
    ScholarOnly,
    /// Open repository searches only.
    RepositoriesOnly,
}

/// Options of one "run download pipeline" invocation. These sit on top of
/// the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Phases to skip even if configuration enables them.
    pub skip: Vec<PhaseKind>,
    /// Opt-in rescue phases to run even if configuration leaves them off.
    pub enable: Vec<PhaseKind>,
    /// Reopen `failed` entries before the first phase.
    pub retry_failed: bool,
    /// Reopen `not_found` entries before the first phase.
    pub retry_not_found: bool,
    /// Replaces the baseline search delay.
    pub scholar_delay: Option<Duration>,
    /// Route searches through the configured HTTP proxy.
    pub use_proxy: bool,
    /// Rotate VPN locations during the search phase.
    pub use_vpn: bool,
    /// Replaces `unpaywall.email`.
    pub unpaywall_email: Option<String>,
}

fn configured(phases: &PhasesConfig, phase: PhaseKind) -> bool {
    match phase {
        PhaseKind::Enrichment => phases.enrichment,
        PhaseKind::OpenAccess => phases.open_access,
        PhaseKind::LegalOa => phases.unpaywall,
        PhaseKind::UrlTransform => phases.url_transform,
        PhaseKind::SearchFallback => phases.scholar,
        PhaseKind::CoreRepository => phases.core,
        PhaseKind::EuropePmc => phases.europepmc,
        PhaseKind::Arxiv => phases.arxiv,
        PhaseKind::UrlTransformRetry => phases.url_transform_retry,
        PhaseKind::Crossref => phases.crossref,
        PhaseKind::InstitutionalProxy => phases.institutional_proxy,
    }
}

impl RunOptions {
    /// Phases this run will execute, in order.
    pub fn planned_phases(&self, phases: &PhasesConfig) -> Vec<PhaseKind> {
        PhaseKind::ORDER
            .into_iter()
            .filter(|phase| match self.mode {
                RunMode::Full => true,
                RunMode::OpenAccessOnly => matches!(
                    phase,
                    PhaseKind::Enrichment | PhaseKind::OpenAccess | PhaseKind::LegalOa
                ),
                RunMode::ScholarOnly => *phase == PhaseKind::SearchFallback,
                RunMode::RepositoriesOnly => phase.is_repository(),
            })
            .filter(|phase| {
                // Modes name their phases explicitly, so they only honour
                // explicit skips.
                let wanted = self.mode != RunMode::Full
                    || configured(phases, *phase)
                    || self.enable.contains(phase);
                wanted && !self.skip.contains(phase)
            })
            .collect()
    }

    /// Contact address for the legal-OA service.
    pub fn unpaywall_email<'a>(&'a self, config: &'a Config) -> Option<&'a str> {
        self.unpaywall_email
            .as_deref()
            .or(config.unpaywall.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    pub fn scholar_proxy(&self, config: &Config) -> bool {
        self.use_proxy || config.scholar.use_proxy
    }

    /// Plan the run and check the settings the planned phases depend on.
    pub fn validate(&self, config: &Config) -> Result<Vec<PhaseKind>, ConfigError> {
        let planned = self.planned_phases(&config.phases);

        if planned.contains(&PhaseKind::LegalOa) && self.unpaywall_email(config).is_none() {
            return Err(ConfigError::ValidationError(
                "unpaywall.email (or --unpaywall-email) is required for the legal open-access phase"
                    .to_string(),
            ));
        }

        if planned.contains(&PhaseKind::InstitutionalProxy)
            && config
                .proxy
                .base_url
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "proxy.base_url is required for the institutional proxy phase".to_string(),
            ));
        }

        if planned.contains(&PhaseKind::SearchFallback)
            && self.scholar_proxy(config)
            && config.scholar.proxy_url.is_none()
        {
            return Err(ConfigError::ValidationError(
                "scholar.proxy_url is required when the search proxy is enabled".to_string(),
            ));
        }

        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_email() -> Config {
        let mut config = Config::default();
        config.unpaywall.email = Some("me@example.org".into());
        config
    }

    #[test]
    fn test_full_run_follows_configuration() {
        let planned = RunOptions::default().planned_phases(&PhasesConfig::default());
        assert_eq!(
            planned,
            vec![
                PhaseKind::Enrichment,
                PhaseKind::OpenAccess,
                PhaseKind::LegalOa,
                PhaseKind::UrlTransform,
                PhaseKind::SearchFallback,
                PhaseKind::CoreRepository,
                PhaseKind::EuropePmc,
                PhaseKind::Arxiv,
                PhaseKind::UrlTransformRetry,
            ]
        );
    }

    #[test]
    fn test_skip_and_enable() {
        let options = RunOptions {
            skip: vec![PhaseKind::UrlTransform],
            enable: vec![PhaseKind::Crossref],
            ..Default::default()
        };
        let planned = options.planned_phases(&PhasesConfig::default());
        assert!(!planned.contains(&PhaseKind::UrlTransform));
        assert_eq!(planned.last(), Some(&PhaseKind::Crossref));
    }

    #[test]
    fn test_modes() {
        let phases = PhasesConfig::default();
        let oa = RunOptions {
            mode: RunMode::OpenAccessOnly,
            ..Default::default()
        };
        assert_eq!(
            oa.planned_phases(&phases),
            vec![PhaseKind::Enrichment, PhaseKind::OpenAccess, PhaseKind::LegalOa]
        );

        let scholar = RunOptions {
            mode: RunMode::ScholarOnly,
            ..Default::default()
        };
        assert_eq!(
            scholar.planned_phases(&phases),
            vec![PhaseKind::SearchFallback]
        );

        let repos = RunOptions {
            mode: RunMode::RepositoriesOnly,
            skip: vec![PhaseKind::EuropePmc],
            ..Default::default()
        };
        assert_eq!(
            repos.planned_phases(&phases),
            vec![PhaseKind::CoreRepository, PhaseKind::Arxiv]
        );
        // No legal-OA phase, so no contact address is needed.
        assert!(repos.validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_requires_email_only_when_needed() {
        let err = RunOptions::default().validate(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("unpaywall.email"));

        let scholar = RunOptions {
            mode: RunMode::ScholarOnly,
            ..Default::default()
        };
        assert!(scholar.validate(&Config::default()).is_ok());

        let with_override = RunOptions {
            unpaywall_email: Some("cli@example.org".into()),
            ..Default::default()
        };
        assert!(with_override.validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_proxy_requirements() {
        let options = RunOptions {
            enable: vec![PhaseKind::InstitutionalProxy],
            ..Default::default()
        };
        assert!(options.validate(&config_with_email()).is_err());

        let mut config = config_with_email();
        config.proxy.base_url = Some("https://login.proxy.example/login?url=".into());
        assert!(options.validate(&config).is_ok());

        let search_proxy = RunOptions {
            use_proxy: true,
            ..Default::default()
        };
        assert!(search_proxy.validate(&config_with_email()).is_err());
    }
}
