//! Upstream payload caching.
//!
//! # Data Flow
//! ```text
//! Kernel::fetch
//!     → key.rs (source + ":" + hash of normalized params)
//!     → ttl.rs get: hit short-circuits the breaker entirely
//!     → on miss: breaker call, successful payload written back with the source's TTL
//! ```
//!
//! # Design Decisions
//! - TTL is chosen per source class, not globally
//! - Entries are replaced whole, never edited in place
//! - Expired entries are removed by explicit sweeps, not by reads

pub mod key;
pub mod ttl;

pub use key::cache_key;
pub use ttl::{CacheSnapshot, ClearReport, TtlCache};
