//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every upstream fetch with its source's call timeout
//! - Map an elapsed deadline to [`FetchError::Timeout`]
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timeout counts against the breaker exactly like a network error

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::resilience::types::FetchError;

/// Run `fetch` with a deadline of `limit`.
pub async fn with_timeout<Fut>(limit: Duration, fetch: Fut) -> Result<Value, FetchError>
where
    Fut: Future<Output = Result<Value, FetchError>>,
{
    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(limit)),
    }
}
