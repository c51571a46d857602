use super::{
    types::{Config, MAX_CLAIM_TIMEOUT_SECS},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Rating thresholds fall inside the 1-5 scale
/// - Claim timeout is at most ten years
/// - Sweep interval is not 0 when the sweeper is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let lifecycle = &config.lifecycle;
    if lifecycle.completion_min_ratings == 0 {
        return Err(ConfigError::ValidationError(
            "lifecycle.completion_min_ratings must be at least 1".to_string(),
        ));
    }
    if !(1.0..=5.0).contains(&lifecycle.completion_min_average) {
        return Err(ConfigError::ValidationError(format!(
            "lifecycle.completion_min_average must be between 1 and 5, got {}",
            lifecycle.completion_min_average
        )));
    }
    if lifecycle.auto_reject_min_ratings == Some(0) {
        return Err(ConfigError::ValidationError(
            "lifecycle.auto_reject_min_ratings must be at least 1".to_string(),
        ));
    }
    if !(1.0..=5.0).contains(&lifecycle.auto_reject_below_average) {
        return Err(ConfigError::ValidationError(format!(
            "lifecycle.auto_reject_below_average must be between 1 and 5, got {}",
            lifecycle.auto_reject_below_average
        )));
    }

    if config.claims.timeout_secs > MAX_CLAIM_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError(format!(
            "claims.timeout_secs must be at most {}, got {}",
            MAX_CLAIM_TIMEOUT_SECS, config.claims.timeout_secs
        )));
    }

    if config.claims.sweeper_enabled && config.claims.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "claims.sweep_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.audit.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "audit.buffer_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}
