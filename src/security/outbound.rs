//! Outbound throttling per upstream host.
//!
//! # Responsibilities
//! - Keep at least `min_interval` between requests to the same host
//! - Suspend the caller until its slot arrives
//!
//! # Design Decisions
//! - Slots are reserved under the host's map entry, then the caller sleeps outside it,
//!   so concurrent callers queue up in order without holding a lock while waiting
//! - Hosts are independent DashMap entries; one busy host never delays another

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use url::Url;

use crate::clock::SharedClock;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy)]
struct HostSlot {
    min_interval: Duration,
    last_request_at: Option<Instant>,
}

impl HostSlot {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_at: None,
        }
    }

    /// Reserve the next slot at or after `now`; returns how long to wait for it.
    fn reserve(&mut self, now: Instant) -> Duration {
        let slot = match self.last_request_at {
            Some(last) => (last + self.min_interval).max(now),
            None => now,
        };
        self.last_request_at = Some(slot);
        slot.saturating_duration_since(now)
    }
}

/// Per-host minimum-interval throttle.
#[derive(Debug)]
pub struct OutboundLimiter {
    slots: DashMap<String, HostSlot>,
    default_interval_ms: AtomicU64,
    clock: SharedClock,
}

impl OutboundLimiter {
    /// Create a limiter; hosts without an explicit interval use `default_interval`.
    pub fn new(default_interval: Duration, clock: SharedClock) -> Self {
        Self {
            slots: DashMap::new(),
            default_interval_ms: AtomicU64::new(default_interval.as_millis() as u64),
            clock,
        }
    }

    /// Set the minimum interval for `host`.
    pub fn set_interval(&self, host: &str, min_interval: Duration) {
        self.slots
            .entry(host.to_string())
            .and_modify(|slot| slot.min_interval = min_interval)
            .or_insert_with(|| HostSlot::new(min_interval));
    }

    /// Change the interval used for hosts seen for the first time.
    pub fn set_default_interval(&self, min_interval: Duration) {
        self.default_interval_ms
            .store(min_interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn interval(&self, host: &str) -> Duration {
        self.slots
            .get(host)
            .map(|slot| slot.min_interval)
            .unwrap_or_else(|| self.default_interval())
    }

    fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms.load(Ordering::Relaxed))
    }

    /// Wait until `host` may be called again and claim the slot.
    ///
    /// Returns the time spent waiting.
    pub async fn throttle(&self, host: &str) -> Duration {
        let now = self.clock.now();
        let wait = {
            let default_interval = self.default_interval();
            let mut slot = self
                .slots
                .entry(host.to_string())
                .or_insert_with(|| HostSlot::new(default_interval));
            slot.reserve(now)
        };

        if !wait.is_zero() {
            tracing::debug!(host = %host, wait_ms = wait.as_millis() as u64, "Throttling outbound request");
            metrics::record_throttle_wait(host, wait);
            self.clock.sleep(wait).await;
        }
        wait
    }
}

/// Normalize a configured host or URL into a throttle key.
///
/// `https://api.bls.gov/publicAPI/v2` and `api.bls.gov` both map to `api.bls.gov`.
pub fn host_key(host_or_url: &str) -> String {
    match Url::parse(host_or_url) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            }
        }
        _ => host_or_url.trim().to_ascii_lowercase(),
    }
}
