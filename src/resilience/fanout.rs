//! Concurrent fan-out across several sources.
//!
//! Each target runs through [`Kernel::fetch`] on its own task, so every target
//! keeps its own breaker and call timeout. The overall deadline bounds how long
//! the caller waits; targets that have not finished by then are reported as
//! missing and left to complete in the background so their breakers still see
//! the result.
//!
//! Results are keyed by the request's cache key, so two queries against the
//! same source are reported separately. Identical queries share one entry.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::kernel::{Kernel, SourceRequest};
use crate::resilience::types::{FetchError, Outcome};

type BoxedFetch = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, FetchError>> + Send>;

/// One upstream in a fan-out.
pub struct FanoutTarget {
    request: SourceRequest,
    fetch: BoxedFetch,
}

impl FanoutTarget {
    pub fn new<F>(request: SourceRequest, fetch: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value, FetchError>> + Send + 'static,
    {
        Self {
            request,
            fetch: Box::new(fetch),
        }
    }

    pub fn source(&self) -> &str {
        self.request.source()
    }
}

impl std::fmt::Debug for FanoutTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutTarget")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Whatever finished before the deadline, keyed by cache key.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub completed: BTreeMap<String, Outcome>,
    pub missing: Vec<String>,
}

impl FanoutReport {
    /// Outcome of `request`, if it finished in time.
    pub fn outcome(&self, request: &SourceRequest) -> Option<&Outcome> {
        self.completed.get(&request.cache_key())
    }

    /// Targets that returned live data.
    pub fn successes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.completed.iter().filter_map(|(key, outcome)| match outcome {
            Outcome::Success(data) => Some((key.as_str(), data)),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Run every target concurrently and collect results until `deadline`.
pub async fn fan_out(kernel: Arc<Kernel>, targets: Vec<FanoutTarget>, deadline: Duration) -> FanoutReport {
    let deadline_at = tokio::time::Instant::now() + deadline;
    let mut pending: Vec<String> = Vec::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    for target in targets {
        let FanoutTarget { request, fetch } = target;
        let key = request.cache_key();
        pending.push(key.clone());
        let kernel = kernel.clone();
        tasks.spawn(async move {
            let outcome = kernel.fetch(&request, fetch).await;
            (key, outcome)
        });
    }

    let mut report = FanoutReport::default();
    loop {
        match tokio::time::timeout_at(deadline_at, tasks.join_next()).await {
            Ok(Some(Ok((key, outcome)))) => {
                report.completed.insert(key, outcome);
            }
            Ok(Some(Err(e))) => {
                tracing::error!(error = %e, "Fan-out task failed");
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    outstanding = tasks.len(),
                    deadline_ms = deadline.as_millis() as u64,
                    "Fan-out deadline reached"
                );
                break;
            }
        }
    }
    tasks.detach_all();

    let mut seen = HashSet::new();
    pending.retain(|key| !report.completed.contains_key(key) && seen.insert(key.clone()));
    report.missing = pending;
    report
}
