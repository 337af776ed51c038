//! In-process metrics collector.
//!
//! # Responsibilities
//! - Keep a bounded ring buffer of recent request records
//! - Maintain running totals per source, per breaker and per cache source
//! - Produce the performance summary served to the ops dashboard
//!
//! # Design Decisions
//! - Ring buffer evicts oldest first and never grows past its capacity
//! - Aggregates live in DashMaps keyed by source, so sources never contend on one lock
//! - Cache hits only touch source and cache totals, never breaker counters

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::SharedClock;
use crate::observability::alerts::{self, Alert, AlertThresholds};
use crate::observability::metrics;
use crate::resilience::types::CircuitState;

/// One observed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub timestamp_ms: u64,
    pub source: String,
    pub method: String,
    pub duration_ms: u64,
    pub success: bool,
    pub cached: bool,
    pub circuit_state: CircuitState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitEventKind {
    Opened,
    HalfOpened,
    Closed,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Get,
    Set,
    Invalidate,
}

#[derive(Debug, Default, Clone)]
struct SourceTotals {
    requests: u64,
    successes: u64,
    failures: u64,
    cached: u64,
    upstream_duration_ms: u64,
}

impl SourceTotals {
    fn add(&mut self, other: &SourceTotals) {
        self.requests += other.requests;
        self.successes += other.successes;
        self.failures += other.failures;
        self.cached += other.cached;
        self.upstream_duration_ms += other.upstream_duration_ms;
    }

    fn to_stats(&self, source: &str) -> SourceStats {
        let rate = |n: u64| {
            if self.requests == 0 {
                0.0
            } else {
                n as f64 / self.requests as f64
            }
        };
        let upstream_calls = self.requests - self.cached;
        SourceStats {
            source: source.to_string(),
            total_requests: self.requests,
            successes: self.successes,
            failures: self.failures,
            cached_responses: self.cached,
            success_rate: rate(self.successes),
            failure_rate: rate(self.failures),
            cache_hit_rate: rate(self.cached),
            avg_duration_ms: if upstream_calls == 0 {
                0.0
            } else {
                self.upstream_duration_ms as f64 / upstream_calls as f64
            },
        }
    }
}

/// Derived statistics for one source (or all sources).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub source: String,
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cached_responses: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub cache_hit_rate: f64,
    /// Average over upstream calls only; cache hits are excluded.
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone)]
struct CircuitTotals {
    state: CircuitState,
    transitions: u64,
    times_opened: u64,
    last_transition_ms: Option<u64>,
    successes: u64,
    failures: u64,
    rejected: u64,
}

impl CircuitTotals {
    fn new(state: CircuitState) -> Self {
        Self {
            state,
            transitions: 0,
            times_opened: 0,
            last_transition_ms: None,
            successes: 0,
            failures: 0,
            rejected: 0,
        }
    }
}

/// Breaker statistics as seen by the collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub transitions: u64,
    pub times_opened: u64,
    pub last_transition_ms: Option<u64>,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
}

#[derive(Debug, Default, Clone)]
struct CacheTotals {
    hits: u64,
    misses: u64,
    sets: u64,
    invalidations: u64,
}

impl CacheTotals {
    fn add(&mut self, other: &CacheTotals) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.sets += other.sets;
        self.invalidations += other.invalidations;
    }

    fn to_counts(&self) -> CacheCounts {
        let lookups = self.hits + self.misses;
        CacheCounts {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            invalidations: self.invalidations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounts {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}

impl CacheCounts {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    #[serde(flatten)]
    pub totals: CacheCounts,
    pub by_source: BTreeMap<String, CacheCounts>,
}

/// Document served by the ops endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub generated_at_ms: u64,
    pub global_stats: SourceStats,
    pub source_stats: BTreeMap<String, SourceStats>,
    pub circuit_breaker_stats: BTreeMap<String, CircuitStats>,
    pub cache_stats: CacheStats,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
}

/// Observes requests, breaker transitions and cache events.
#[derive(Debug)]
pub struct MetricsCollector {
    records: Mutex<VecDeque<MetricRecord>>,
    capacity: usize,
    sources: DashMap<String, SourceTotals>,
    circuits: DashMap<String, CircuitTotals>,
    cache: DashMap<String, CacheTotals>,
    thresholds: ArcSwap<AlertThresholds>,
    clock: SharedClock,
}

impl MetricsCollector {
    /// Create a collector whose ring buffer holds at most `capacity` records.
    pub fn new(capacity: usize, thresholds: AlertThresholds, clock: SharedClock) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sources: DashMap::new(),
            circuits: DashMap::new(),
            cache: DashMap::new(),
            thresholds: ArcSwap::from_pointee(thresholds),
            clock,
        }
    }

    pub fn shared(capacity: usize, thresholds: AlertThresholds, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::new(capacity, thresholds, clock))
    }

    pub fn set_thresholds(&self, thresholds: AlertThresholds) {
        self.thresholds.store(Arc::new(thresholds));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the outcome of one request.
    pub fn record_request(
        &self,
        source: &str,
        method: &str,
        duration: Duration,
        success: bool,
        cached: bool,
        circuit_state: CircuitState,
    ) {
        let duration_ms = duration.as_millis() as u64;
        let record = MetricRecord {
            timestamp_ms: self.clock.unix_millis(),
            source: source.to_string(),
            method: method.to_string(),
            duration_ms,
            success,
            cached,
            circuit_state,
        };

        {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }

        {
            let mut totals = self.sources.entry(source.to_string()).or_default();
            totals.requests += 1;
            if success {
                totals.successes += 1;
            } else {
                totals.failures += 1;
            }
            if cached {
                totals.cached += 1;
            } else {
                totals.upstream_duration_ms += duration_ms;
            }
        }

        if !cached {
            let mut circuit = self
                .circuits
                .entry(source.to_string())
                .or_insert_with(|| CircuitTotals::new(circuit_state));
            if circuit_state == CircuitState::Open {
                circuit.rejected += 1;
            } else if success {
                circuit.successes += 1;
            } else {
                circuit.failures += 1;
            }
        }

        metrics::record_request(source, success, cached, duration);
    }

    /// Record a breaker state change.
    pub fn record_circuit_event(
        &self,
        name: &str,
        kind: CircuitEventKind,
        old_state: CircuitState,
        new_state: CircuitState,
    ) {
        let now_ms = self.clock.unix_millis();
        let mut circuit = self
            .circuits
            .entry(name.to_string())
            .or_insert_with(|| CircuitTotals::new(old_state));
        circuit.state = new_state;
        if old_state != new_state {
            circuit.transitions += 1;
            circuit.last_transition_ms = Some(now_ms);
            if new_state == CircuitState::Open {
                circuit.times_opened += 1;
            }
        }
        tracing::trace!(breaker = %name, kind = ?kind, from = %old_state, to = %new_state, "Circuit event recorded");
    }

    /// Record a cache operation; `hit` is only meaningful for `Get`.
    pub fn record_cache_event(&self, source: &str, kind: CacheEventKind, hit: bool) {
        let mut totals = self.cache.entry(source.to_string()).or_default();
        match kind {
            CacheEventKind::Get if hit => totals.hits += 1,
            CacheEventKind::Get => totals.misses += 1,
            CacheEventKind::Set => totals.sets += 1,
            CacheEventKind::Invalidate => totals.invalidations += 1,
        }
        if kind == CacheEventKind::Get {
            metrics::record_cache_lookup(source, hit);
        }
    }

    /// Overwrite the collector's view of breaker states with live values.
    pub fn refresh_circuit_states<I>(&self, states: I)
    where
        I: IntoIterator<Item = (String, CircuitState)>,
    {
        for (name, state) in states {
            self.circuits
                .entry(name)
                .and_modify(|c| c.state = state)
                .or_insert_with(|| CircuitTotals::new(state));
        }
    }

    pub fn get_source_stats(&self, source: &str) -> Option<SourceStats> {
        self.sources.get(source).map(|t| t.to_stats(source))
    }

    pub fn all_source_stats(&self) -> BTreeMap<String, SourceStats> {
        self.sources
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().to_stats(entry.key())))
            .collect()
    }

    /// Totals across every source.
    pub fn global_stats(&self) -> SourceStats {
        let mut totals = SourceTotals::default();
        for entry in self.sources.iter() {
            totals.add(entry.value());
        }
        totals.to_stats(alerts::GLOBAL_SOURCE)
    }

    pub fn get_circuit_breaker_stats(&self) -> BTreeMap<String, CircuitStats> {
        self.circuits
            .iter()
            .map(|entry| {
                let c = entry.value();
                let stats = CircuitStats {
                    name: entry.key().clone(),
                    state: c.state,
                    transitions: c.transitions,
                    times_opened: c.times_opened,
                    last_transition_ms: c.last_transition_ms,
                    successes: c.successes,
                    failures: c.failures,
                    rejected: c.rejected,
                };
                (entry.key().clone(), stats)
            })
            .collect()
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let mut totals = CacheTotals::default();
        let mut by_source = BTreeMap::new();
        for entry in self.cache.iter() {
            totals.add(entry.value());
            by_source.insert(entry.key().clone(), entry.value().to_counts());
        }
        CacheStats {
            totals: totals.to_counts(),
            by_source,
        }
    }

    /// Aggregates plus freshly derived alerts and recommendations.
    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let source_stats = self.all_source_stats();
        let circuit_breaker_stats = self.get_circuit_breaker_stats();
        let cache_stats = self.get_cache_stats();
        let thresholds = **self.thresholds.load();

        let alerts = alerts::evaluate(&thresholds, &source_stats, &circuit_breaker_stats, &cache_stats);
        let recommendations = alerts::recommend(&alerts);

        PerformanceSummary {
            generated_at_ms: self.clock.unix_millis(),
            global_stats: self.global_stats(),
            source_stats,
            circuit_breaker_stats,
            cache_stats,
            alerts,
            recommendations,
        }
    }

    /// Most recent records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<MetricRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    /// Admin action: drop every record and aggregate.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.sources.clear();
        self.circuits.clear();
        self.cache.clear();
        tracing::info!("Metrics cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::observability::alerts::AlertLevel;

    fn collector(capacity: usize) -> MetricsCollector {
        MetricsCollector::new(capacity, AlertThresholds::default(), Arc::new(ManualClock::new()))
    }

    fn record(c: &MetricsCollector, source: &str, success: bool) {
        c.record_request(source, "get", Duration::from_millis(100), success, false, CircuitState::Closed);
    }

    fn failure_rate_alerts(summary: &PerformanceSummary, source: &str) -> usize {
        summary
            .alerts
            .iter()
            .filter(|a| a.source == source && a.metric == "failure_rate")
            .count()
    }

    #[test]
    fn test_failure_rate_threshold() {
        let c = collector(100);
        for _ in 0..3 {
            record(&c, "X", false);
        }
        for _ in 0..7 {
            record(&c, "X", true);
        }

        let stats = c.get_source_stats("X").unwrap();
        assert!((stats.failure_rate - 0.3).abs() < 0.01);
        assert_eq!(failure_rate_alerts(&c.get_performance_summary(), "X"), 0);

        record(&c, "X", false);
        let summary = c.get_performance_summary();
        assert_eq!(failure_rate_alerts(&summary, "X"), 1);
        assert!(!summary.recommendations.is_empty());
    }

    #[test]
    fn test_failure_rate_needs_min_samples() {
        let c = collector(100);
        for _ in 0..5 {
            record(&c, "Y", false);
        }
        assert_eq!(failure_rate_alerts(&c.get_performance_summary(), "Y"), 0);
    }

    #[test]
    fn test_ring_buffer_is_bounded() {
        let c = collector(3);
        for i in 0..5 {
            c.record_request(&format!("s{}", i), "get", Duration::ZERO, true, false, CircuitState::Closed);
        }

        let recent = c.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].source, "s2");
        assert_eq!(recent[2].source, "s4");
        // Aggregates keep running totals beyond the buffer.
        assert_eq!(c.global_stats().total_requests, 5);
    }

    #[test]
    fn test_cached_requests_skip_breaker_counters() {
        let c = collector(10);
        c.record_request("fx", "get", Duration::ZERO, true, true, CircuitState::Open);
        c.record_request("fx", "get", Duration::from_millis(40), false, false, CircuitState::Closed);

        let circuit = &c.get_circuit_breaker_stats()["fx"];
        assert_eq!(circuit.successes, 0);
        assert_eq!(circuit.failures, 1);

        let source = c.get_source_stats("fx").unwrap();
        assert_eq!(source.cached_responses, 1);
        assert_eq!(source.avg_duration_ms, 40.0);
    }

    #[test]
    fn test_open_breaker_raises_error_alert() {
        let c = collector(10);
        c.record_circuit_event("ofac", CircuitEventKind::Opened, CircuitState::Closed, CircuitState::Open);

        let summary = c.get_performance_summary();
        let alert = summary.alerts.iter().find(|a| a.source == "ofac").unwrap();
        assert_eq!(alert.level, AlertLevel::Error);
        assert_eq!(summary.circuit_breaker_stats["ofac"].times_opened, 1);

        c.refresh_circuit_states(vec![("ofac".to_string(), CircuitState::Closed)]);
        assert!(c.get_performance_summary().alerts.is_empty());
    }

    #[test]
    fn test_slow_source_alert() {
        let c = collector(10);
        c.record_request("wayback", "snapshot", Duration::from_millis(7000), true, false, CircuitState::Closed);

        let summary = c.get_performance_summary();
        assert!(summary
            .alerts
            .iter()
            .any(|a| a.source == "wayback" && a.metric == "avg_duration_ms"));
    }

    #[test]
    fn test_cache_hit_rate_alert() {
        let c = collector(10);
        c.record_cache_event("nvd", CacheEventKind::Get, true);
        for _ in 0..9 {
            c.record_cache_event("nvd", CacheEventKind::Get, false);
        }
        c.record_cache_event("nvd", CacheEventKind::Set, false);

        let cache = c.get_cache_stats();
        assert_eq!(cache.totals.hits, 1);
        assert_eq!(cache.totals.sets, 1);
        assert!((cache.totals.hit_rate - 0.1).abs() < 1e-9);

        let summary = c.get_performance_summary();
        assert!(summary.alerts.iter().any(|a| a.metric == "cache_hit_rate"));
    }

    #[test]
    fn test_no_cache_alert_without_lookups() {
        let c = collector(10);
        assert!(c.get_performance_summary().alerts.is_empty());
    }

    #[test]
    fn test_clear() {
        let c = collector(10);
        record(&c, "X", true);
        c.record_cache_event("X", CacheEventKind::Get, true);
        c.clear();

        assert!(c.recent(10).is_empty());
        assert!(c.get_source_stats("X").is_none());
        assert_eq!(c.get_cache_stats().totals.lookups(), 0);
    }

    #[test]
    fn test_summary_json_shape() {
        let c = collector(10);
        record(&c, "X", true);
        let json = serde_json::to_value(c.get_performance_summary()).unwrap();

        for key in ["sourceStats", "circuitBreakerStats", "cacheStats", "alerts", "recommendations"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["sourceStats"]["X"]["totalRequests"], 1);
        assert!(json["cacheStats"].get("hitRate").is_some());
    }
}
