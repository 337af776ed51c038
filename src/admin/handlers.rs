use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::OpsState;
use crate::cache::{CacheSnapshot, ClearReport};
use crate::observability::collector::{MetricRecord, PerformanceSummary};
use crate::resilience::circuit_breaker::BreakerStats;

const DEFAULT_RECENT_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub breakers: usize,
    pub cache_entries: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub reset: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearExpiredParams {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

pub async fn get_status(State(state): State<OpsState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        breakers: state.kernel.breakers().len(),
        cache_entries: state.kernel.cache().len(),
    })
}

pub async fn get_summary(State(state): State<OpsState>) -> Json<PerformanceSummary> {
    Json(state.kernel.performance_summary())
}

pub async fn get_breakers(State(state): State<OpsState>) -> Json<BTreeMap<String, BreakerStats>> {
    Json(state.kernel.breakers().all_stats())
}

pub async fn reset_breaker(
    State(state): State<OpsState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStats>, StatusCode> {
    let breaker = state.kernel.breakers().get(&name).ok_or(StatusCode::NOT_FOUND)?;
    breaker.reset();
    tracing::info!(breaker = %name, "Breaker reset via ops endpoint");
    Ok(Json(breaker.snapshot()))
}

pub async fn reset_all_breakers(State(state): State<OpsState>) -> Json<ResetResponse> {
    let reset = state.kernel.breakers().reset_all();
    tracing::info!(count = reset, "All breakers reset via ops endpoint");
    Json(ResetResponse { reset })
}

pub async fn get_cache(State(state): State<OpsState>) -> Json<CacheSnapshot> {
    Json(state.kernel.cache().snapshot())
}

pub async fn clear_expired(
    State(state): State<OpsState>,
    Query(params): Query<ClearExpiredParams>,
) -> Json<ClearReport> {
    Json(state.kernel.cache().clear_expired(params.dry_run))
}

pub async fn get_recent_metrics(
    State(state): State<OpsState>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<MetricRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(state.kernel.metrics().recent(limit))
}

pub async fn clear_metrics(State(state): State<OpsState>) -> StatusCode {
    state.kernel.metrics().clear();
    tracing::info!("Metrics cleared via ops endpoint");
    StatusCode::NO_CONTENT
}
