//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the kernel.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the resilience kernel.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Settings applied to any source without its own section.
    pub defaults: SourceConfig,

    /// Per-source overrides keyed by source name.
    pub sources: BTreeMap<String, SourceConfig>,

    /// Metrics ring buffer and alert thresholds.
    pub metrics: MetricsConfig,

    /// Cache housekeeping.
    pub cache: CacheConfig,

    /// Ops endpoint settings.
    pub ops: OpsConfig,

    /// Logging and Prometheus exporter settings.
    pub observability: ObservabilityConfig,
}

impl KernelConfig {
    /// Settings for `source`, falling back to `[defaults]`.
    pub fn source(&self, source: &str) -> &SourceConfig {
        self.sources.get(source).unwrap_or(&self.defaults)
    }
}

/// Cache lifetime class of a source.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// Tickers and exchange rates.
    Financial,
    /// Governance and corruption indices.
    Governance,
    /// Travel advisories.
    TravelAdvisory,
    #[default]
    Default,
}

impl TtlClass {
    pub fn ttl(&self) -> Duration {
        match self {
            TtlClass::Financial => Duration::from_secs(5 * 60),
            TtlClass::Governance => Duration::from_secs(60 * 60),
            TtlClass::TravelAdvisory => Duration::from_secs(24 * 60 * 60),
            TtlClass::Default => Duration::from_secs(15 * 60),
        }
    }
}

/// Per-source resilience settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before allowing a trial call.
    pub reset_timeout_secs: u64,

    /// Deadline for a single upstream call in seconds.
    pub call_timeout_secs: u64,

    /// Cache lifetime class.
    pub ttl_class: TtlClass,

    /// Explicit cache TTL; overrides `ttl_class` when set.
    pub cache_ttl_secs: Option<u64>,

    /// Minimum seconds between outbound requests to this source's host.
    pub rate_limit_min_interval_secs: f64,

    /// Inbound requests allowed per client per window.
    pub inbound_max_per_window: usize,

    /// Inbound sliding window length in seconds.
    pub inbound_window_secs: u64,

    /// Upstream host (or URL) shared by throttling; defaults to the source name.
    pub host: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 300,
            call_timeout_secs: 10,
            ttl_class: TtlClass::Default,
            cache_ttl_secs: None,
            rate_limit_min_interval_secs: 0.0,
            inbound_max_per_window: 60,
            inbound_window_secs: 60,
            host: None,
        }
    }
}

impl SourceConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.ttl_class.ttl())
    }

    pub fn min_interval(&self) -> Duration {
        let secs = self.rate_limit_min_interval_secs;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    pub fn inbound_window(&self) -> Duration {
        Duration::from_secs(self.inbound_window_secs)
    }
}

/// Metrics collector configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Ring buffer capacity for recent request records.
    pub capacity: usize,

    /// Failure rate above which a source raises a warning.
    pub max_failure_rate: f64,

    /// Requests required before the failure rate is judged.
    pub min_samples: u64,

    /// Average duration (ms) above which a source raises a warning.
    pub max_avg_duration_ms: f64,

    /// Overall cache hit rate below which a warning is raised.
    pub min_cache_hit_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_failure_rate: 0.3,
            min_samples: 10,
            max_avg_duration_ms: 5000.0,
            min_cache_hit_rate: 0.2,
        }
    }
}

/// Cache housekeeping configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval between expired-entry sweeps in seconds; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
        }
    }
}

/// Ops endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OpsConfig {
    /// Serve the ops API.
    pub enabled: bool,

    /// Bind address for the ops API.
    pub bind_address: String,

    /// Bearer token required on every ops request.
    pub api_key: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
