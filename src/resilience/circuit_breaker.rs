//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls reach the upstream
//! - Open: upstream assumed down, calls fail fast with the fallback
//! - Half-Open: reset timeout elapsed, the next call is a trial
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: reset timeout elapsed (evaluated lazily at call time)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (last_failure_at restarts the timeout)
//! ```
//!
//! # Design Decisions
//! - Per-source breaker (not global), each with its own lock
//! - No background timer; elapsed timeouts are noticed by the next call
//! - One success closes the circuit from any state
//! - Malformed responses neither open nor close the circuit

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::clock::SharedClock;
use crate::config::SourceConfig;
use crate::observability::collector::{CircuitEventKind, MetricsCollector};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::types::{
    CircuitState, DegradedReason, Fallback, FetchError, KernelError, Outcome,
};
use crate::security::outbound::OutboundLimiter;

/// Method label used when the caller does not supply one.
pub const DEFAULT_METHOD: &str = "call";

/// Tunables for a single breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub call_timeout: Duration,
    /// Outbound throttle key; the breaker name when unset.
    pub throttle_key: Option<String>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

impl From<&SourceConfig> for BreakerSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            call_timeout: config.call_timeout(),
            throttle_key: config.host.as_deref().map(crate::security::outbound::host_key),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct BreakerCounters {
    total_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub last_failure_age_secs: Option<u64>,
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
}

/// A state transition computed under the lock, reported after it is released.
type Transition = Option<(CircuitEventKind, CircuitState, CircuitState)>;

/// Per-source circuit breaker.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    fallback: Option<Fallback>,
    state: Mutex<BreakerState>,
    counters: BreakerCounters,
    clock: SharedClock,
    limiter: Option<Arc<OutboundLimiter>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, settings: BreakerSettings, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            settings,
            fallback: None,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
            }),
            counters: BreakerCounters::default(),
            clock,
            limiter: None,
            metrics: None,
        }
    }

    /// Payload served while open or after a failed call.
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Throttle every upstream attempt through `limiter`.
    pub fn with_limiter(mut self, limiter: Arc<OutboundLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Report requests and transitions to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn throttle_key(&self) -> &str {
        self.settings.throttle_key.as_deref().unwrap_or(&self.name)
    }

    fn effective_state(&self, inner: &BreakerState, now: Instant) -> CircuitState {
        match (inner.state, inner.last_failure_at) {
            (CircuitState::Open, Some(at))
                if now.saturating_duration_since(at) >= self.settings.reset_timeout =>
            {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Current state, with an elapsed open timeout reported as half-open.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.effective_state(&inner, self.clock.now())
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Run `fetch` through the breaker.
    pub async fn call<F, Fut>(&self, fetch: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        self.call_with_method(DEFAULT_METHOD, fetch).await
    }

    /// Run `fetch` through the breaker, labelling the metric record with `method`.
    ///
    /// Never panics on upstream failure; every path resolves to an [`Outcome`].
    pub async fn call_with_method<F, Fut>(&self, method: &str, fetch: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>>,
    {
        let started = self.clock.now();
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);

        let (observed, transition) = self.admit(started);
        self.report(transition);

        if observed == CircuitState::Open {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(breaker = %self.name, "Circuit open, failing fast");
            self.record(method, started, false, CircuitState::Open);
            return self.fallback_or(
                DegradedReason::CircuitOpen,
                KernelError::CircuitOpen(self.name.clone()),
            );
        }

        if let Some(limiter) = &self.limiter {
            limiter.throttle(self.throttle_key()).await;
        }

        match with_timeout(self.settings.call_timeout, fetch()).await {
            Ok(data) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                let transition = self.on_success();
                self.report(transition);
                self.record(method, started, true, observed);
                Outcome::Success(data)
            }
            Err(FetchError::Malformed(detail)) => {
                tracing::warn!(breaker = %self.name, detail = %detail, "Malformed upstream response");
                self.record(method, started, false, observed);
                Outcome::Failure(KernelError::Malformed {
                    source_name: self.name.clone(),
                    detail,
                })
            }
            Err(error) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                let transition = self.on_failure();
                self.report(transition);
                tracing::debug!(breaker = %self.name, error = %error, "Upstream call failed");
                self.record(method, started, false, observed);
                self.fallback_or(
                    DegradedReason::UpstreamFailure(error.to_string()),
                    KernelError::Upstream {
                        source_name: self.name.clone(),
                        error,
                    },
                )
            }
        }
    }

    /// Decide whether a call may proceed, moving an expired open circuit to half-open.
    fn admit(&self, now: Instant) -> (CircuitState, Transition) {
        let mut inner = self.lock();
        let effective = self.effective_state(&inner, now);
        if effective == CircuitState::HalfOpen && inner.state == CircuitState::Open {
            inner.state = CircuitState::HalfOpen;
            return (
                effective,
                Some((CircuitEventKind::HalfOpened, CircuitState::Open, CircuitState::HalfOpen)),
            );
        }
        (effective, None)
    }

    fn on_success(&self) -> Transition {
        let mut inner = self.lock();
        let old = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_at = None;
        (old != CircuitState::Closed).then_some((CircuitEventKind::Closed, old, CircuitState::Closed))
    }

    fn on_failure(&self) -> Transition {
        let now = self.clock.now();
        let mut inner = self.lock();
        let old = inner.state;
        inner.failure_count = inner.failure_count.saturating_add(1);

        if old == CircuitState::HalfOpen || inner.failure_count >= self.settings.failure_threshold {
            inner.state = CircuitState::Open;
            inner.last_failure_at = Some(now);
            if old != CircuitState::Open {
                return Some((CircuitEventKind::Opened, old, CircuitState::Open));
            }
        }
        None
    }

    /// Force the breaker closed and clear its failure count.
    pub fn reset(&self) {
        let old = {
            let mut inner = self.lock();
            let old = self.effective_state(&inner, self.clock.now());
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.last_failure_at = None;
            old
        };
        tracing::info!(breaker = %self.name, from = %old, "Circuit breaker reset");
        self.report(Some((CircuitEventKind::Reset, old, CircuitState::Closed)));
    }

    fn report(&self, transition: Transition) {
        let Some((kind, old, new)) = transition else {
            return;
        };

        match new {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %old,
                reset_timeout_secs = self.settings.reset_timeout.as_secs(),
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, allowing trial call")
            }
            CircuitState::Closed if kind != CircuitEventKind::Reset => {
                tracing::info!(breaker = %self.name, from = %old, "Circuit breaker closed")
            }
            CircuitState::Closed => {}
        }

        if old != new {
            metrics::record_circuit_state(&self.name, new);
        }
        if let Some(collector) = &self.metrics {
            collector.record_circuit_event(&self.name, kind, old, new);
        }
    }

    fn record(&self, method: &str, started: Instant, success: bool, state: CircuitState) {
        if let Some(collector) = &self.metrics {
            let duration = self.clock.now().saturating_duration_since(started);
            collector.record_request(&self.name, method, duration, success, false, state);
        }
    }

    fn fallback_or(&self, reason: DegradedReason, error: KernelError) -> Outcome {
        match &self.fallback {
            Some(fallback) => Outcome::Degraded {
                data: fallback(),
                reason,
            },
            None => Outcome::Failure(error),
        }
    }

    pub fn snapshot(&self) -> BreakerStats {
        let now = self.clock.now();
        let inner = self.lock();
        BreakerStats {
            name: self.name.clone(),
            state: self.effective_state(&inner, now),
            failure_count: inner.failure_count,
            failure_threshold: self.settings.failure_threshold,
            reset_timeout_secs: self.settings.reset_timeout.as_secs(),
            last_failure_age_secs: inner
                .last_failure_at
                .map(|at| now.saturating_duration_since(at).as_secs()),
            total_calls: self.counters.total_calls.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}
