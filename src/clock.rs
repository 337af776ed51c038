//! Time source abstraction.
//!
//! # Responsibilities
//! - Provide monotonic time for breaker timeouts, cache expiry and throttling
//! - Provide wall-clock time for metric timestamps
//! - Sleep on behalf of the outbound rate limiter
//!
//! # Design Decisions
//! - Every kernel component holds a [`SharedClock`]; nothing calls `Instant::now()` directly
//! - [`ManualClock`] advances virtual time on `sleep`, so throttling completes instantly in tests

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::{self, BoxFuture, FutureExt};

/// Source of time for every kernel component.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Wall-clock now, used only for timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock handle shared between components.
pub type SharedClock = Arc<dyn Clock>;

/// Real time backed by the OS and the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Deterministic clock for tests.
///
/// Time only moves through [`ManualClock::advance`] or [`Clock::sleep`];
/// sleeping returns immediately after moving virtual time forward.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_system: SystemTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_system: SystemTime::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    /// Total virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.advance(duration);
        future::ready(()).boxed()
    }
}
