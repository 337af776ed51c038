//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! kernel.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → KernelConfig (validated, immutable)
//!     → Kernel::new / Kernel::apply_config
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Kernel swaps the Arc<KernelConfig> and retunes limiters
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Breaker thresholds are first-writer-wins; a reload does not rebuild live breakers

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, KernelConfig, MetricsConfig, ObservabilityConfig, OpsConfig, SourceConfig,
    TtlClass,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
