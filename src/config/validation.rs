//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::AppConfig;

/// Smallest salt the Argon2 implementation accepts.
pub const MIN_SALT_SIZE: usize = 8;

/// Slowest accepted refill rate (one token every ~17 minutes).
pub const MIN_IP_RATE_LIMIT: f64 = 0.001;

/// Longest accepted handler deadline.
pub const MAX_HANDLER_SECS: u64 = 3600;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.port must not be 0")]
    ZeroPort,

    #[error(
        "rate_limit.ip_rate_limit must be a finite number of at least {min}, got {0}",
        min = MIN_IP_RATE_LIMIT
    )]
    InvalidRate(f64),

    #[error("rate_limit.burst_rate_limit must be at least 1")]
    ZeroBurst,

    #[error("rate_limit.max_clients must be at least 1")]
    ZeroMaxClients,

    #[error("rate_limit.sweep_interval_secs must be at least 1")]
    ZeroSweepInterval,

    #[error("timeouts.handler_secs must be at least 1")]
    ZeroHandlerTimeout,

    #[error("timeouts.handler_secs must be at most {max}, got {0}", max = MAX_HANDLER_SECS)]
    HandlerTimeoutTooLong(u64),

    #[error("security.salt_size must be at least {min}, got {0}", min = MIN_SALT_SIZE)]
    SaltTooShort(usize),

    #[error("security.max_body_size must be greater than 0")]
    ZeroBodyLimit,

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    let rate = config.rate_limit.ip_rate_limit;
    if !rate.is_finite() || rate < MIN_IP_RATE_LIMIT {
        errors.push(ValidationError::InvalidRate(rate));
    }
    if config.rate_limit.burst_rate_limit == 0 {
        errors.push(ValidationError::ZeroBurst);
    }
    if config.rate_limit.max_clients == 0 {
        errors.push(ValidationError::ZeroMaxClients);
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }

    let handler_secs = config.timeouts.handler_secs;
    if handler_secs == 0 {
        errors.push(ValidationError::ZeroHandlerTimeout);
    } else if handler_secs > MAX_HANDLER_SECS {
        errors.push(ValidationError::HandlerTimeoutTooLong(handler_secs));
    }

    if config.security.salt_size < MIN_SALT_SIZE {
        errors.push(ValidationError::SaltTooShort(config.security.salt_size));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let level = config.log.level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::UnknownLogLevel(config.log.level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.rate_limit.ip_rate_limit = 0.0;
        config.rate_limit.burst_rate_limit = 0;
        config.security.salt_size = 4;
        config.log.level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroBurst));
        assert!(errors.contains(&ValidationError::SaltTooShort(4)));
    }

    #[test]
    fn test_rejects_non_finite_rate() {
        let mut config = AppConfig::default();
        config.rate_limit.ip_rate_limit = f64::NAN;
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidRate(_)));
    }

    #[test]
    fn test_rejects_vanishing_rate() {
        let mut config = AppConfig::default();
        config.rate_limit.ip_rate_limit = 1e-20;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidRate(1e-20)])
        );

        config.rate_limit.ip_rate_limit = MIN_IP_RATE_LIMIT;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_unbounded_handler_timeout() {
        let mut config = AppConfig::default();
        config.timeouts.handler_secs = i64::MAX as u64;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::HandlerTimeoutTooLong(i64::MAX as u64)])
        );

        config.timeouts.handler_secs = MAX_HANDLER_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_log_level_is_case_insensitive() {
        let mut config = AppConfig::default();
        config.log.level = "DEBUG".into();
        assert!(validate_config(&config).is_ok());
    }
}
