//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call for a source:
//!     → registry.rs (one breaker per source name, created lazily)
//!     → circuit_breaker.rs (fail fast while open)
//!     → outbound throttle for the source's host
//!     → timeouts.rs (enforce the source's call timeout)
//!     → result folded back into breaker state and metrics
//!
//! Several sources at once:
//!     → fanout.rs (one task per target, bounded overall deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries inside the kernel; a connector's retry loop is one attempt
//! - Every path resolves to an Outcome, nothing panics out of a call

pub mod circuit_breaker;
pub mod fanout;
pub mod registry;
pub mod timeouts;
pub mod types;

pub use circuit_breaker::{BreakerSettings, BreakerStats, CircuitBreaker};
pub use fanout::{fan_out, FanoutReport, FanoutTarget};
pub use registry::BreakerRegistry;
pub use types::{fallback, CircuitState, DegradedReason, Fallback, FetchError, KernelError, Outcome};
