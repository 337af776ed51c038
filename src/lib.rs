//! Resilience kernel for unreliable upstream data sources.
//!
//! Connectors hand the kernel a fetch closure and get back an [`Outcome`]:
//! live data, cached data, a degraded fallback, or an error value. The kernel
//! never panics out of a call.

// Kernel core
pub mod cache;
pub mod clock;
pub mod kernel;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod security;

// Ops surface
pub mod admin;

pub use config::KernelConfig;
pub use kernel::{Kernel, SourceRequest};
pub use resilience::{fallback, FetchError, KernelError, Outcome};
