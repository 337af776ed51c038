//! The kernel object connectors are handed at startup.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde_json::Value;

use crate::cache::TtlCache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{KernelConfig, SourceConfig};
use crate::kernel::request::SourceRequest;
use crate::observability::alerts::AlertThresholds;
use crate::observability::collector::{CacheEventKind, MetricsCollector, PerformanceSummary};
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker};
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::types::{CircuitState, Fallback, FetchError, KernelError, Outcome};
use crate::security::outbound::{host_key, OutboundLimiter};
use crate::security::rate_limit::{InboundLimiter, InboundPolicy};

/// Cache, breakers, limiters and metrics wired together.
pub struct Kernel {
    config: ArcSwap<KernelConfig>,
    clock: SharedClock,
    cache: Arc<TtlCache>,
    breakers: Arc<BreakerRegistry>,
    outbound: Arc<OutboundLimiter>,
    inbound: DashMap<String, Arc<InboundLimiter>>,
    metrics: Arc<MetricsCollector>,
    fallbacks: DashMap<String, Fallback>,
}

impl Kernel {
    /// Build a kernel on real time.
    pub fn new(config: KernelConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Build a kernel on an injected clock.
    pub fn with_clock(config: KernelConfig, clock: SharedClock) -> Self {
        let outbound = Arc::new(OutboundLimiter::new(
            config.defaults.min_interval(),
            clock.clone(),
        ));
        let metrics = MetricsCollector::shared(
            config.metrics.capacity,
            AlertThresholds::from(&config.metrics),
            clock.clone(),
        );
        let breakers = Arc::new(
            BreakerRegistry::new(clock.clone())
                .with_limiter(outbound.clone())
                .with_metrics(metrics.clone()),
        );

        let kernel = Self {
            config: ArcSwap::from_pointee(config),
            cache: Arc::new(TtlCache::new(clock.clone())),
            clock,
            breakers,
            outbound,
            inbound: DashMap::new(),
            metrics,
            fallbacks: DashMap::new(),
        };
        kernel.apply_intervals(&kernel.config());
        kernel
    }

    pub fn config(&self) -> Arc<KernelConfig> {
        self.config.load_full()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn outbound(&self) -> &Arc<OutboundLimiter> {
        &self.outbound
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Register the degraded payload for `source`.
    ///
    /// Only takes effect if the source's breaker has not been created yet.
    pub fn register_fallback(&self, source: &str, fallback: Fallback) {
        if self.breakers.get(source).is_some() {
            tracing::warn!(source = %source, "Breaker already exists, fallback ignored");
        }
        self.fallbacks.insert(source.to_string(), fallback);
    }

    /// The breaker guarding `source`, created from current config on first use.
    pub fn breaker(&self, source: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(source) {
            return existing;
        }
        let config = self.config();
        let settings = BreakerSettings::from(config.source(source));
        let fallback = self.fallbacks.get(source).map(|f| f.value().clone());
        self.breakers.get_breaker(source, settings, fallback)
    }

    /// Serve `request` from cache, or through the source's breaker on a miss.
    ///
    /// Cache hits never touch the breaker. Only live successes are written back.
    pub async fn fetch<F, Fut>(&self, request: &SourceRequest, fetch: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        let source = request.source();
        let key = request.cache_key();
        let started = self.clock.now();

        if let Some(data) = self.cache.get(&key) {
            self.metrics.record_cache_event(source, CacheEventKind::Get, true);
            let state = self
                .breakers
                .get(source)
                .map(|b| b.state())
                .unwrap_or(CircuitState::Closed);
            let elapsed = self.clock.now().saturating_duration_since(started);
            self.metrics
                .record_request(source, request.method_name(), elapsed, true, true, state);
            tracing::trace!(source = %source, key = %key, "Cache hit");
            return Outcome::Success(data);
        }
        self.metrics.record_cache_event(source, CacheEventKind::Get, false);

        let breaker = self.breaker(source);
        let outcome = breaker.call_with_method(request.method_name(), fetch).await;

        if let Outcome::Success(data) = &outcome {
            let ttl = self.config().source(source).cache_ttl();
            self.cache.set(&key, data.clone(), ttl);
            self.metrics.record_cache_event(source, CacheEventKind::Set, false);
        }
        outcome
    }

    /// Drop the cached payload for `request`.
    pub fn invalidate(&self, request: &SourceRequest) -> bool {
        let removed = self.cache.invalidate(&request.cache_key());
        if removed {
            self.metrics
                .record_cache_event(request.source(), CacheEventKind::Invalidate, false);
        }
        removed
    }

    /// The inbound limiter for `source`, created from current config on first use.
    pub fn inbound_limiter(&self, source: &str) -> Arc<InboundLimiter> {
        if let Some(existing) = self.inbound.get(source) {
            return existing.clone();
        }
        let policy = inbound_policy(self.config().source(source));
        self.inbound
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(InboundLimiter::new(policy, self.clock.clone())))
            .clone()
    }

    /// Admit or reject one inbound request from `client` for `source`.
    pub fn allow_inbound(&self, source: &str, client: &str) -> Result<(), KernelError> {
        self.inbound_limiter(source).allow(client)
    }

    /// Swap in a new configuration.
    ///
    /// Throttle intervals, inbound windows, cache TTLs of later writes and alert
    /// thresholds follow the new values. Existing breakers keep their settings.
    pub fn apply_config(&self, config: KernelConfig) {
        let config = Arc::new(config);
        self.config.store(config.clone());

        self.metrics
            .set_thresholds(AlertThresholds::from(&config.metrics));
        self.apply_intervals(&config);
        for entry in self.inbound.iter() {
            entry
                .value()
                .set_policy(inbound_policy(config.source(entry.key())));
        }

        tracing::info!(
            sources = config.sources.len(),
            breakers = self.breakers.len(),
            "Kernel configuration applied"
        );
    }

    fn apply_intervals(&self, config: &KernelConfig) {
        self.outbound
            .set_default_interval(config.defaults.min_interval());
        for (name, source) in &config.sources {
            let key = source.host.as_deref().map(host_key).unwrap_or_else(|| name.clone());
            self.outbound.set_interval(&key, source.min_interval());
        }
    }

    /// Summary with breaker states refreshed from the live breakers.
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.metrics.refresh_circuit_states(self.breakers.states());
        self.metrics.get_performance_summary()
    }

    /// Periodic housekeeping: drop expired cache entries and idle inbound clients.
    pub fn sweep(&self) -> usize {
        let report = self.cache.clear_expired(false);
        for limiter in self.inbound.iter() {
            limiter.value().purge_idle();
        }
        report.deleted_count
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("breakers", &self.breakers.len())
            .field("cache_entries", &self.cache.len())
            .field("inbound_sources", &self.inbound.len())
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

fn inbound_policy(config: &SourceConfig) -> InboundPolicy {
    InboundPolicy {
        max_per_window: config.inbound_max_per_window,
        window: config.inbound_window(),
    }
}
