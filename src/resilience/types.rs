//! Shared resilience types and error definitions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, calls reach the upstream.
    Closed,
    /// Upstream assumed down, calls fail fast.
    Open,
    /// Reset timeout elapsed, the next call is a trial.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Gauge encoding: 0=closed, 1=half-open, 2=open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a connector's fetch function reports back to the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, reset.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Upstream did not answer within the call timeout.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered 2xx but the payload could not be parsed.
    ///
    /// The upstream is reachable, so this does not count against the breaker.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors the kernel hands back to callers inside an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Breaker is open and no fallback is registered.
    #[error("circuit '{0}' is open")]
    CircuitOpen(String),

    /// Upstream call failed and no fallback is registered.
    #[error("upstream '{source_name}' failed: {error}")]
    Upstream {
        source_name: String,
        error: FetchError,
    },

    /// Upstream reachable but returned unusable content.
    #[error("malformed response from '{source_name}': {detail}")]
    Malformed { source_name: String, detail: String },

    /// Inbound client exceeded its sliding window.
    #[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
}

/// Why a degraded payload was served instead of live data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    CircuitOpen,
    UpstreamFailure(String),
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::CircuitOpen => f.write_str("circuit open"),
            DegradedReason::UpstreamFailure(e) => write!(f, "upstream failure: {}", e),
        }
    }
}

/// Result of a guarded upstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Authoritative data, live or from cache.
    Success(Value),
    /// Fallback data served because the upstream is unavailable.
    Degraded { data: Value, reason: DegradedReason },
    /// Nothing to serve.
    Failure(KernelError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Success(data) | Outcome::Degraded { data, .. } => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            Outcome::Success(data) | Outcome::Degraded { data, .. } => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    /// Render the 200-shaped response body the dashboard consumes.
    pub fn to_envelope(&self) -> Value {
        match self {
            Outcome::Success(data) => json!({
                "success": true,
                "degraded": false,
                "data": data,
            }),
            Outcome::Degraded { data, reason } => json!({
                "success": false,
                "degraded": true,
                "reason": reason.to_string(),
                "data": data,
            }),
            Outcome::Failure(error) => json!({
                "success": false,
                "degraded": false,
                "error": error.to_string(),
                "data": Value::Null,
            }),
        }
    }
}

/// Zero-argument producer of a substitute payload.
///
/// Must not panic; the breaker does not guard against it.
pub type Fallback = Arc<dyn Fn() -> Value + Send + Sync>;

/// Wrap a closure as a [`Fallback`].
pub fn fallback<F>(f: F) -> Fallback
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}
