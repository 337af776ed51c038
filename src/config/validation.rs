//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, timeouts > 0, rates within 0..=1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: KernelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{KernelConfig, SourceConfig};

/// Accepted range for per-call timeouts in seconds.
pub const CALL_TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 5..=30;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &KernelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_source("defaults", &config.defaults, &mut errors);
    for (name, source) in &config.sources {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("sources", "source name must not be empty"));
        }
        validate_source(&format!("sources.{}", name), source, &mut errors);
    }

    let metrics = &config.metrics;
    if metrics.capacity == 0 {
        errors.push(ValidationError::new("metrics.capacity", "must be at least 1"));
    }
    for (field, value) in [
        ("metrics.max_failure_rate", metrics.max_failure_rate),
        ("metrics.min_cache_hit_rate", metrics.min_cache_hit_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(field, "must be between 0 and 1"));
        }
    }
    if !(metrics.max_avg_duration_ms.is_finite() && metrics.max_avg_duration_ms > 0.0) {
        errors.push(ValidationError::new("metrics.max_avg_duration_ms", "must be positive"));
    }

    if config.ops.enabled && config.ops.api_key.trim().is_empty() {
        errors.push(ValidationError::new("ops.api_key", "required when ops is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_source(prefix: &str, source: &SourceConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("{}.{}", prefix, name);

    if source.failure_threshold == 0 {
        errors.push(ValidationError::new(field("failure_threshold"), "must be at least 1"));
    }
    if source.reset_timeout_secs == 0 {
        errors.push(ValidationError::new(field("reset_timeout_secs"), "must be positive"));
    }
    if !CALL_TIMEOUT_RANGE_SECS.contains(&source.call_timeout_secs) {
        errors.push(ValidationError::new(
            field("call_timeout_secs"),
            format!(
                "must be between {} and {}",
                CALL_TIMEOUT_RANGE_SECS.start(),
                CALL_TIMEOUT_RANGE_SECS.end()
            ),
        ));
    }
    if source.cache_ttl_secs == Some(0) {
        errors.push(ValidationError::new(field("cache_ttl_secs"), "must be positive"));
    }
    let interval = source.rate_limit_min_interval_secs;
    if !(interval.is_finite() && interval >= 0.0) {
        errors.push(ValidationError::new(
            field("rate_limit_min_interval_secs"),
            "must be a non-negative number",
        ));
    }
    if source.inbound_max_per_window == 0 {
        errors.push(ValidationError::new(field("inbound_max_per_window"), "must be at least 1"));
    }
    if source.inbound_window_secs == 0 {
        errors.push(ValidationError::new(field("inbound_window_secs"), "must be positive"));
    }
}
