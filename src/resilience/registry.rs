//! Named breaker registry.
//!
//! One breaker per source name for the life of the process. The first caller
//! to ask for a name decides its settings and fallback; later callers get the
//! same instance regardless of what they pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::observability::collector::MetricsCollector;
use crate::resilience::circuit_breaker::{BreakerSettings, BreakerStats, CircuitBreaker};
use crate::resilience::types::{CircuitState, Fallback};
use crate::security::outbound::OutboundLimiter;

/// Process-wide map of source name to breaker.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: SharedClock,
    limiter: Option<Arc<OutboundLimiter>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl BreakerRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            breakers: DashMap::new(),
            clock,
            limiter: None,
            metrics: None,
        }
    }

    /// Attach an outbound limiter to every breaker created from now on.
    pub fn with_limiter(mut self, limiter: Arc<OutboundLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Attach a metrics collector to every breaker created from now on.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get the breaker for `name`, creating it on first use.
    pub fn get_breaker(
        &self,
        name: &str,
        settings: BreakerSettings,
        fallback: Option<Fallback>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    breaker = %name,
                    failure_threshold = settings.failure_threshold,
                    reset_timeout_secs = settings.reset_timeout.as_secs(),
                    "Creating circuit breaker"
                );
                let mut breaker = CircuitBreaker::new(name, settings, self.clock.clone());
                if let Some(fallback) = fallback {
                    breaker = breaker.with_fallback(fallback);
                }
                if let Some(limiter) = &self.limiter {
                    breaker = breaker.with_limiter(limiter.clone());
                }
                if let Some(metrics) = &self.metrics {
                    breaker = breaker.with_metrics(metrics.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Look up an existing breaker without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    pub fn all_stats(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Live state of every breaker.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    /// Reset one breaker. Returns false when no breaker has that name.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker; returns how many were reset.
    pub fn reset_all(&self) -> usize {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();
        for breaker in &breakers {
            breaker.reset();
        }
        breakers.len()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
