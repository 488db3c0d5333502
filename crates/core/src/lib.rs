pub mod catalog;
pub mod config;
pub mod fetch;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod rotation;
pub mod strategy;
pub mod testing;

pub use catalog::{load_records, parse_records, CatalogError, Record};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ManifestBackend,
    RotationStrategy, SanitizedConfig,
};
pub use fetch::{Outcome, RetryPolicy};
pub use manifest::{
    open_store, Manifest, ManifestEntry, ManifestError, ManifestStats, ManifestStore, Source,
    Status,
};
pub use orchestrator::{
    Collaborators, Pipeline, PipelineError, RunMode, RunOptions, RunReport, StopHandle,
};
pub use rotation::{RotationController, RotationMode, VpnControl, VpnError};
pub use strategy::PhaseKind;
