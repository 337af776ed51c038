//! Connector-facing kernel.
//!
//! # Data Flow
//! ```text
//! Connector builds a SourceRequest and a fetch closure:
//!     → request.rs (cache key from source + params)
//!     → engine.rs Kernel::fetch
//!         → cache hit: Success, breaker untouched
//!         → cache miss: breaker (throttle → timeout → fetch)
//!         → Success written back with the source's TTL
//! ```
//!
//! # Design Decisions
//! - One Kernel per process, constructed at startup and shared behind an `Arc`
//! - Connectors supply only the fetch closure and an optional fallback
//! - Configuration is swapped atomically; in-flight calls keep the snapshot they started with

pub mod engine;
pub mod request;

pub use engine::Kernel;
pub use request::SourceRequest;
