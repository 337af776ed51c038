//! Alert derivation.
//!
//! Alerts are recomputed from current aggregates on every summary request;
//! nothing here is persisted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::MetricsConfig;
use crate::observability::collector::{CacheStats, CircuitStats, SourceStats};
use crate::resilience::types::CircuitState;

/// Source name used for alerts that concern the whole kernel.
pub const GLOBAL_SOURCE: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub level: AlertLevel,
    pub source: String,
    pub message: String,
    pub metric: String,
    pub value: f64,
}

/// Fixed limits alerts are judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub max_failure_rate: f64,
    pub min_samples: u64,
    pub max_avg_duration_ms: f64,
    pub min_cache_hit_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self::from(&MetricsConfig::default())
    }
}

impl From<&MetricsConfig> for AlertThresholds {
    fn from(config: &MetricsConfig) -> Self {
        Self {
            max_failure_rate: config.max_failure_rate,
            min_samples: config.min_samples,
            max_avg_duration_ms: config.max_avg_duration_ms,
            min_cache_hit_rate: config.min_cache_hit_rate,
        }
    }
}

/// Derive alerts from current aggregates.
pub fn evaluate(
    thresholds: &AlertThresholds,
    sources: &BTreeMap<String, SourceStats>,
    circuits: &BTreeMap<String, CircuitStats>,
    cache: &CacheStats,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for (name, stats) in sources {
        if stats.total_requests >= thresholds.min_samples
            && stats.failure_rate > thresholds.max_failure_rate
        {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                source: name.clone(),
                message: format!(
                    "High failure rate: {:.1}% over {} requests",
                    stats.failure_rate * 100.0,
                    stats.total_requests
                ),
                metric: "failure_rate".to_string(),
                value: stats.failure_rate,
            });
        }

        if stats.avg_duration_ms > thresholds.max_avg_duration_ms {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                source: name.clone(),
                message: format!("Slow responses: average {:.0} ms", stats.avg_duration_ms),
                metric: "avg_duration_ms".to_string(),
                value: stats.avg_duration_ms,
            });
        }
    }

    for (name, stats) in circuits {
        if stats.state == CircuitState::Open {
            alerts.push(Alert {
                level: AlertLevel::Error,
                source: name.clone(),
                message: "Circuit breaker is open".to_string(),
                metric: "circuit_state".to_string(),
                value: stats.state.as_gauge(),
            });
        }
    }

    if cache.totals.lookups() > 0 && cache.totals.hit_rate < thresholds.min_cache_hit_rate {
        alerts.push(Alert {
            level: AlertLevel::Warning,
            source: GLOBAL_SOURCE.to_string(),
            message: format!("Low cache hit rate: {:.1}%", cache.totals.hit_rate * 100.0),
            metric: "cache_hit_rate".to_string(),
            value: cache.totals.hit_rate,
        });
    }

    alerts
}

/// One operator-facing suggestion per alert.
pub fn recommend(alerts: &[Alert]) -> Vec<String> {
    alerts
        .iter()
        .map(|alert| match alert.metric.as_str() {
            "failure_rate" => format!(
                "Check upstream availability for '{}' or lower its failure threshold",
                alert.source
            ),
            "avg_duration_ms" => format!(
                "Consider a shorter call timeout or a longer cache TTL for '{}'",
                alert.source
            ),
            "circuit_state" => format!(
                "'{}' is serving fallback data; reset its breaker once the upstream recovers",
                alert.source
            ),
            "cache_hit_rate" => {
                "Review cache TTLs; most requests are reaching upstreams".to_string()
            }
            other => format!("Investigate {} for '{}'", other, alert.source),
        })
        .collect()
}
