//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, cache lookups, limiters produce:
//!     → collector.rs (ring buffer + running totals per source)
//!     → metrics.rs (Prometheus counters, gauges, histograms)
//!     → logging.rs (structured tracing events)
//!
//! Consumers:
//!     → alerts.rs (recomputed on each summary request)
//!     → ops endpoint (PerformanceSummary JSON)
//!     → Prometheus scrape
//! ```
//!
//! # Design Decisions
//! - Alerts are stateless; there is no alert log
//! - The collector is constructed once and injected, never a global

pub mod alerts;
pub mod collector;
pub mod logging;
pub mod metrics;

pub use alerts::{Alert, AlertLevel, AlertThresholds};
pub use collector::{
    CacheEventKind, CacheStats, CircuitEventKind, CircuitStats, MetricRecord, MetricsCollector,
    PerformanceSummary, SourceStats,
};
