//! Subcommand implementations.

pub mod download;
pub mod export;
pub mod stats;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use paperchase_core::{
    load_config, open_store, validate_config, Config, ManifestEntry, SanitizedConfig,
};

use crate::DEFAULT_CONFIG_PATH;

/// Load and validate configuration.
///
/// An explicit path must exist. Without one, `paperchase.toml` in the working
/// directory is used when present and built-in defaults otherwise.
pub fn load_settings(path: Option<&Path>) -> Result<Config> {
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None if default_path.exists() => {
            info!("Loading configuration from {:?}", default_path);
            load_config(default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        }
        None => {
            info!("No configuration file, using defaults");
            Config::default()
        }
    };

    validate_config(&config).context("Configuration validation failed")?;
    info!(config = ?SanitizedConfig::from(&config), "Configuration loaded");
    Ok(config)
}

/// Read the persisted manifest without adding or rewriting anything.
/// `None` when no manifest has been written yet.
pub fn read_manifest(config: &Config) -> Result<Option<Vec<ManifestEntry>>> {
    let store = open_store(config.manifest.backend, &config.manifest.path)
        .with_context(|| format!("Failed to open manifest at {:?}", config.manifest.path))?;
    let entries = store.read_all().context("Failed to read manifest")?;
    Ok(entries)
}
