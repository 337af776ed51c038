//! Ops endpoint.
//!
//! # Routes
//! ```text
//! GET  /ops/status                   version and liveness
//! GET  /ops/summary                  PerformanceSummary (stats, alerts, recommendations)
//! GET  /ops/breakers                 snapshot of every breaker
//! POST /ops/breakers/reset           force every breaker closed
//! POST /ops/breakers/{name}/reset    force one breaker closed
//! GET  /ops/cache                    cache size snapshot
//! POST /ops/cache/clear-expired      sweep expired entries (?dry_run=true to count only)
//! GET  /ops/metrics/recent           newest metric records (?limit=N)
//! POST /ops/metrics/clear            drop the ring buffer and all aggregates
//! ```
//!
//! # Design Decisions
//! - Bearer token read from live config, so a reload rotates it
//! - The ops router is rate limited like any other inbound surface

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::ops_auth_middleware;
use self::handlers::*;
use crate::kernel::Kernel;
use crate::security::rate_limit::inbound_limit_middleware;

/// Inbound limiter name applied to the ops router.
pub const OPS_SOURCE: &str = "ops";

/// State shared by ops handlers.
#[derive(Clone, Debug)]
pub struct OpsState {
    pub kernel: Arc<Kernel>,
}

impl OpsState {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }
}

pub fn setup_ops_router(kernel: Arc<Kernel>) -> Router {
    let limiter = kernel.inbound_limiter(OPS_SOURCE);
    let state = OpsState::new(kernel);

    Router::new()
        .route("/ops/status", get(get_status))
        .route("/ops/summary", get(get_summary))
        .route("/ops/breakers", get(get_breakers))
        .route("/ops/breakers/reset", post(reset_all_breakers))
        .route("/ops/breakers/{name}/reset", post(reset_breaker))
        .route("/ops/cache", get(get_cache))
        .route("/ops/cache/clear-expired", post(clear_expired))
        .route("/ops/metrics/recent", get(get_recent_metrics))
        .route("/ops/metrics/clear", post(clear_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), ops_auth_middleware))
        .layer(middleware::from_fn_with_state(limiter, inbound_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the ops router until `shutdown` fires.
pub async fn serve(
    kernel: Arc<Kernel>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Ops endpoint listening");

    let app = setup_ops_router(kernel);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
        tracing::info!("Ops endpoint shutting down");
    })
    .await
}
