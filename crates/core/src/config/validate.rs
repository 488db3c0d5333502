use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Retry budget and S2 batch size are non-zero
/// - Rotation thresholds are non-zero and at least one location exists
///
/// Requirements that depend on which phases actually run (contact address,
/// proxy prefix) are checked when a run is planned.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.download.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "download.max_retries must be at least 1".to_string(),
        ));
    }

    if config.download.max_backoff_ms < config.download.base_backoff_ms {
        return Err(ConfigError::ValidationError(
            "download.max_backoff_ms cannot be lower than download.base_backoff_ms".to_string(),
        ));
    }

    if config.s2_api.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "s2_api.batch_size cannot be 0".to_string(),
        ));
    }

    let vpn = &config.vpn;
    if vpn.rotate_every_n_papers == 0 {
        return Err(ConfigError::ValidationError(
            "vpn.rotate_every_n_papers cannot be 0".to_string(),
        ));
    }
    if vpn.max_rotation_failures == 0 {
        return Err(ConfigError::ValidationError(
            "vpn.max_rotation_failures cannot be 0".to_string(),
        ));
    }
    if vpn.recent_history == 0 {
        return Err(ConfigError::ValidationError(
            "vpn.recent_history cannot be 0".to_string(),
        ));
    }
    if vpn.preferred_locations.is_empty() {
        return Err(ConfigError::ValidationError(
            "vpn.preferred_locations cannot be empty".to_string(),
        ));
    }

    Ok(())
}
