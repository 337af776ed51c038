//! Inbound sliding-window rate limiting.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::observability::metrics;
use crate::resilience::types::KernelError;

/// Header a client may send to be limited by key instead of address.
pub const CLIENT_KEY_HEADER: &str = "x-api-key";

/// Window parameters of an inbound limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPolicy {
    pub max_per_window: usize,
    pub window: Duration,
}

/// Per-client sliding-window limiter.
#[derive(Debug)]
pub struct InboundLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    policy: ArcSwap<InboundPolicy>,
    clock: SharedClock,
}

impl InboundLimiter {
    pub fn new(policy: InboundPolicy, clock: SharedClock) -> Self {
        Self {
            windows: DashMap::new(),
            policy: ArcSwap::from_pointee(policy),
            clock,
        }
    }

    pub fn policy(&self) -> InboundPolicy {
        **self.policy.load()
    }

    /// Replace the window parameters; existing timestamps are kept.
    pub fn set_policy(&self, policy: InboundPolicy) {
        self.policy.store(Arc::new(policy));
    }

    /// Admit or reject one request from `client`.
    ///
    /// Rejections carry a retry hint equal to the window size.
    pub fn allow(&self, client: &str) -> Result<(), KernelError> {
        let policy = self.policy();
        let now = self.clock.now();

        let mut window = self.windows.entry(client.to_string()).or_default();
        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= policy.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < policy.max_per_window {
            window.push_back(now);
            Ok(())
        } else {
            Err(KernelError::RateLimited {
                retry_after: policy.window,
            })
        }
    }

    /// Drop clients whose windows have fully drained.
    pub fn purge_idle(&self) -> usize {
        let window = self.policy().window;
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < window)
        });
        before - self.windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Middleware applying an [`InboundLimiter`] per client.
///
/// Clients are keyed by `x-api-key` when present, otherwise by peer IP.
pub async fn inbound_limit_middleware(
    State(limiter): State<Arc<InboundLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.allow(&key) {
        Ok(()) => next.run(request).await,
        Err(KernelError::RateLimited { retry_after }) => {
            tracing::warn!(client = %key, retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");
            metrics::record_rate_limited("inbound");
            let mut response = Response::new(Body::from("Rate limit exceeded"));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Err(e) => {
            tracing::error!(client = %key, error = %e, "Unexpected limiter error");
            next.run(request).await
        }
    }
}

fn client_key(request: &Request<Body>) -> String {
    if let Some(key) = request
        .headers()
        .get(CLIENT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return format!("key:{}", key);
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}
