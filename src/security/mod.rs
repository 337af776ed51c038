//! Rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound (kernel → upstream):
//!     CircuitBreaker::call
//!     → outbound.rs (wait for the host's next free slot)
//!     → connector fetch
//!
//! Inbound (client → dashboard):
//!     → rate_limit.rs (sliding window per client key)
//!     → 429 + Retry-After on rejection, never touches a breaker
//! ```
//!
//! # Design Decisions
//! - Outbound throttling blocks the caller instead of rejecting
//! - One map entry per host/client; no global lock

pub mod outbound;
pub mod rate_limit;

pub use outbound::{host_key, OutboundLimiter};
pub use rate_limit::{inbound_limit_middleware, InboundLimiter, InboundPolicy};
