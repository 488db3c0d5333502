use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub phases: PhasesConfig,
    #[serde(default)]
    pub s2_api: SemanticScholarConfig,
    #[serde(default)]
    pub unpaywall: UnpaywallConfig,
    #[serde(default)]
    pub scholar: ScholarConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub europepmc: EuropePmcConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub crossref: CrossrefConfig,
    #[serde(default)]
    pub proxy: InstitutionalProxyConfig,
}

/// Where the input records come from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
        }
    }
}

fn default_records_path() -> PathBuf {
    PathBuf::from("data/papers.json")
}

/// Manifest persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub backend: ManifestBackend,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
            backend: ManifestBackend::default(),
        }
    }
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("data/manifest.json")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManifestBackend {
    /// Pretty-printed JSON file, rewritten atomically on every change.
    #[default]
    Json,
    /// Embedded SQLite database, one row per entry.
    Sqlite,
}

/// HTTP download settings shared by every strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Directory where `<record id>.pdf` artifacts are written.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Total attempts per strategy call, including the first (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff before the second attempt, doubled after each failure.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff wait.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Delay between records in every phase except search fallback.
    #[serde(default = "default_download_delay")]
    pub delay_ms: u64,
    /// Payloads smaller than this are rejected even with a PDF header.
    #[serde(default = "default_min_size")]
    pub min_size_bytes: u64,
    #[serde(default = "default_browser_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            delay_ms: default_download_delay(),
            min_size_bytes: default_min_size(),
            user_agent: default_browser_user_agent(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("data/pdfs")
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_download_delay() -> u64 {
    1000
}

fn default_min_size() -> u64 {
    1024
}

fn default_browser_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

/// Per-phase switches. Every phase can be skipped individually.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhasesConfig {
    #[serde(default = "default_true")]
    pub enrichment: bool,
    #[serde(default = "default_true")]
    pub open_access: bool,
    #[serde(default = "default_true")]
    pub unpaywall: bool,
    #[serde(default = "default_true")]
    pub url_transform: bool,
    #[serde(default = "default_true")]
    pub scholar: bool,
    /// Open repository searches for failed/not_found entries.
    #[serde(default = "default_true")]
    pub core: bool,
    #[serde(default = "default_true")]
    pub europepmc: bool,
    #[serde(default = "default_true")]
    pub arxiv: bool,
    /// Second URL transform pass over entries that failed during search.
    #[serde(default = "default_true")]
    pub url_transform_retry: bool,
    /// Opt-in: Crossref link discovery for failed/not_found entries.
    #[serde(default)]
    pub crossref: bool,
    /// Opt-in: institutional proxy rewriting for failed/not_found entries.
    #[serde(default)]
    pub institutional_proxy: bool,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            enrichment: true,
            open_access: true,
            unpaywall: true,
            url_transform: true,
            scholar: true,
            core: true,
            europepmc: true,
            arxiv: true,
            url_transform_retry: true,
            crossref: false,
            institutional_proxy: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Semantic Scholar batch API (identifier enrichment).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SemanticScholarConfig {
    #[serde(default = "default_s2_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between batches.
    #[serde(default = "default_s2_delay")]
    pub delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            base_url: default_s2_url(),
            batch_size: default_batch_size(),
            delay_ms: default_s2_delay(),
            api_key: None,
        }
    }
}

fn default_s2_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_s2_delay() -> u64 {
    1000
}

/// Unpaywall legal open-access lookup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnpaywallConfig {
    #[serde(default = "default_unpaywall_url")]
    pub base_url: String,
    /// Contact address, required by Unpaywall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_unpaywall_delay")]
    pub delay_ms: u64,
}

impl Default for UnpaywallConfig {
    fn default() -> Self {
        Self {
            base_url: default_unpaywall_url(),
            email: None,
            delay_ms: default_unpaywall_delay(),
        }
    }
}

fn default_unpaywall_url() -> String {
    "https://api.unpaywall.org/v2".to_string()
}

fn default_unpaywall_delay() -> u64 {
    100
}

/// Google Scholar search fallback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScholarConfig {
    #[serde(default = "default_scholar_url")]
    pub base_url: String,
    /// Baseline delay between searches.
    #[serde(default = "default_scholar_delay")]
    pub delay_ms: u64,
    /// Reduced delay used right after a successful rotation.
    #[serde(default = "default_delay_after_rotation")]
    pub delay_after_rotation_ms: u64,
    /// Number of requests over which the delay climbs back to baseline.
    #[serde(default = "default_recovery_requests")]
    pub delay_recovery_requests: u32,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: default_scholar_url(),
            delay_ms: default_scholar_delay(),
            delay_after_rotation_ms: default_delay_after_rotation(),
            delay_recovery_requests: default_recovery_requests(),
            use_proxy: false,
            proxy_url: None,
        }
    }
}

fn default_scholar_url() -> String {
    "https://scholar.google.com".to_string()
}

fn default_scholar_delay() -> u64 {
    10_000
}

fn default_delay_after_rotation() -> u64 {
    3000
}

fn default_recovery_requests() -> u32 {
    7
}

/// How the next VPN location is picked.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Random choice excluding the most recently used locations.
    #[default]
    Smart,
    /// Uniform random choice.
    Random,
    /// Fixed order, wrapping around.
    Sequential,
}

/// VPN rotation for the search fallback phase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnConfig {
    #[serde(default = "default_vpn_tool")]
    pub tool: String,
    #[serde(default)]
    pub rotation_strategy: RotationStrategy,
    #[serde(default = "default_locations")]
    pub preferred_locations: Vec<String>,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_post_connect_delay")]
    pub post_connect_delay_secs: u64,
    /// Minimum spacing between two successful rotations.
    #[serde(default = "default_min_rotation_interval")]
    pub min_rotation_interval_secs: u64,
    #[serde(default = "default_true")]
    pub verify_ip_change: bool,
    #[serde(default = "default_max_rotation_failures")]
    pub max_rotation_failures: u32,
    #[serde(default = "default_rotate_every")]
    pub rotate_every_n_papers: u32,
    /// How many recent locations the smart strategy avoids.
    #[serde(default = "default_recent_history")]
    pub recent_history: usize,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            tool: default_vpn_tool(),
            rotation_strategy: RotationStrategy::default(),
            preferred_locations: default_locations(),
            connection_timeout_secs: default_connection_timeout(),
            post_connect_delay_secs: default_post_connect_delay(),
            min_rotation_interval_secs: default_min_rotation_interval(),
            verify_ip_change: true,
            max_rotation_failures: default_max_rotation_failures(),
            rotate_every_n_papers: default_rotate_every(),
            recent_history: default_recent_history(),
        }
    }
}

fn default_vpn_tool() -> String {
    "expressvpnctl".to_string()
}

fn default_locations() -> Vec<String> {
    [
        "usa - new york",
        "uk - london",
        "canada - toronto",
        "germany - frankfurt",
        "netherlands - amsterdam",
        "sweden",
        "switzerland",
        "france - paris",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_post_connect_delay() -> u64 {
    5
}

fn default_min_rotation_interval() -> u64 {
    60
}

fn default_max_rotation_failures() -> u32 {
    3
}

fn default_rotate_every() -> u32 {
    20
}

fn default_recent_history() -> usize {
    5
}

/// CORE aggregator search API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    #[serde(default = "default_core_url")]
    pub base_url: String,
    /// Optional key for higher rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_core_delay")]
    pub delay_ms: u64,
    /// Abandon the phase after this many rate-limited records in a row.
    /// 0 never abandons.
    #[serde(default = "default_core_rate_limit_streak")]
    pub max_consecutive_rate_limits: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_core_url(),
            api_key: None,
            delay_ms: default_core_delay(),
            max_consecutive_rate_limits: default_core_rate_limit_streak(),
        }
    }
}

fn default_core_url() -> String {
    "https://api.core.ac.uk/v3".to_string()
}

fn default_core_delay() -> u64 {
    1000
}

fn default_core_rate_limit_streak() -> u32 {
    5
}

/// Europe PMC REST search.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EuropePmcConfig {
    #[serde(default = "default_europepmc_url")]
    pub base_url: String,
    #[serde(default = "default_europepmc_delay")]
    pub delay_ms: u64,
}

impl Default for EuropePmcConfig {
    fn default() -> Self {
        Self {
            base_url: default_europepmc_url(),
            delay_ms: default_europepmc_delay(),
        }
    }
}

fn default_europepmc_url() -> String {
    "https://www.ebi.ac.uk/europepmc/webservices/rest".to_string()
}

fn default_europepmc_delay() -> u64 {
    200
}

/// arXiv Atom query API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_url")]
    pub base_url: String,
    /// arXiv asks for three seconds between requests.
    #[serde(default = "default_arxiv_delay")]
    pub delay_ms: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_url(),
            delay_ms: default_arxiv_delay(),
        }
    }
}

fn default_arxiv_url() -> String {
    "http://export.arxiv.org/api".to_string()
}

fn default_arxiv_delay() -> u64 {
    3000
}

/// Crossref works API (opt-in rescue phase).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossrefConfig {
    #[serde(default = "default_crossref_url")]
    pub base_url: String,
    /// Contact address for the Crossref polite pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
    #[serde(default = "default_crossref_delay")]
    pub delay_ms: u64,
}

impl Default for CrossrefConfig {
    fn default() -> Self {
        Self {
            base_url: default_crossref_url(),
            mailto: None,
            delay_ms: default_crossref_delay(),
        }
    }
}

fn default_crossref_url() -> String {
    "https://api.crossref.org".to_string()
}

fn default_crossref_delay() -> u64 {
    500
}

/// Institutional proxy rewriting (opt-in rescue phase).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstitutionalProxyConfig {
    /// Prefix prepended to publisher URLs, e.g. `https://login.proxy.example.edu/login?url=`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_publisher_domains")]
    pub publisher_domains: Vec<String>,
}

impl Default for InstitutionalProxyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            publisher_domains: default_publisher_domains(),
        }
    }
}

fn default_publisher_domains() -> Vec<String> {
    [
        "ieeexplore.ieee.org",
        "link.springer.com",
        "sciencedirect.com",
        "elsevier.com",
        "wiley.com",
        "academic.oup.com",
        "dl.acm.org",
        "tandfonline.com",
        "sagepub.com",
        "nature.com",
        "science.org",
        "jstor.org",
        "cambridge.org",
        "karger.com",
        "worldscientific.com",
        "degruyter.com",
        "emerald.com",
        "liebertpub.com",
        "ingentaconnect.com",
        "doi.org",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Sanitized config for logging (contact addresses and keys redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub records_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest_backend: ManifestBackend,
    pub artifact_dir: PathBuf,
    pub phases: PhasesConfig,
    pub unpaywall_email_configured: bool,
    pub s2_api_key_configured: bool,
    pub core_api_key_configured: bool,
    pub scholar_proxy_configured: bool,
    pub institutional_proxy_configured: bool,
    pub rotation_strategy: RotationStrategy,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            records_path: config.source.records_path.clone(),
            manifest_path: config.manifest.path.clone(),
            manifest_backend: config.manifest.backend,
            artifact_dir: config.download.artifact_dir.clone(),
            phases: config.phases.clone(),
            unpaywall_email_configured: config
                .unpaywall
                .email
                .as_deref()
                .is_some_and(|e| !e.is_empty()),
            s2_api_key_configured: config.s2_api.api_key.is_some(),
            core_api_key_configured: config.core.api_key.is_some(),
            scholar_proxy_configured: config.scholar.proxy_url.is_some(),
            institutional_proxy_configured: config.proxy.base_url.is_some(),
            rotation_strategy: config.vpn.rotation_strategy,
        }
    }
}
