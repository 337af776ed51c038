//! Resilience kernel (v1)
//!
//! Hosts the kernel, the ops endpoint and the background housekeeping tasks.
//!
//! # Architecture Overview
//!
//! ```text
//!     Connector
//!         │  Kernel::fetch(request, fetch_fn)
//!         ▼
//!     ┌──────────┐  hit   ┌──────────────────────────────────────────┐
//!     │ TtlCache │──────▶ │ Outcome::Success                          │
//!     └────┬─────┘        └──────────────────────────────────────────┘
//!          │ miss
//!          ▼
//!     ┌────────────────┐   open   ┌──────────────────────────────────┐
//!     │ CircuitBreaker │────────▶ │ Outcome::Degraded (fallback)      │
//!     └────┬───────────┘          └──────────────────────────────────┘
//!          │ closed / half-open
//!          ▼
//!     OutboundLimiter → timeout → fetch_fn → cache write-back
//!
//!     Cross-cutting: MetricsCollector, Prometheus, tracing, config hot reload
//!     Ops: axum router on [ops].bind_address (bearer token, inbound rate limit)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_kernel::admin;
use resilience_kernel::config::{load_config, ConfigWatcher, KernelConfig};
use resilience_kernel::kernel::Kernel;
use resilience_kernel::lifecycle::{wait_for_shutdown_signal, Shutdown};
use resilience_kernel::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilience-kernel", version, about = "Resilience kernel host process")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "kernel.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_exists = args.config.exists();
    let config = if config_exists {
        load_config(&args.config)?
    } else {
        KernelConfig::default()
    };

    logging::init(&config.observability.log_level);
    tracing::info!("resilience-kernel v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_exists {
        tracing::warn!(path = ?args.config, "Config file not found, using defaults");
    }

    tracing::info!(
        sources = config.sources.len(),
        ops_enabled = config.ops.enabled,
        metrics_capacity = config.metrics.capacity,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let kernel = Arc::new(Kernel::new(config.clone()));
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    // Hot reload
    let _watcher = if config_exists {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config);
        let watcher = watcher.run()?;
        let kernel = kernel.clone();
        let mut stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(new_config) = updates.recv() => kernel.apply_config(new_config),
                    _ = stop.recv() => break,
                }
            }
        }));
        Some(watcher)
    } else {
        None
    };

    // Cache sweeper
    if config.cache.sweep_interval_secs > 0 {
        let kernel = kernel.clone();
        let mut stop = shutdown.subscribe();
        let period = Duration::from_secs(config.cache.sweep_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let deleted = kernel.sweep();
                        tracing::debug!(deleted, "Cache sweep finished");
                    }
                    _ = stop.recv() => break,
                }
            }
        }));
    }

    // Ops endpoint
    if config.ops.enabled {
        let listener = TcpListener::bind(&config.ops.bind_address).await?;
        let kernel = kernel.clone();
        let stop = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(kernel, listener, stop).await {
                tracing::error!(error = %e, "Ops endpoint failed");
            }
        }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!(tasks = shutdown.trigger(), "Shutting down");

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
