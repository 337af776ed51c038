//! Property tests for breaker and limiter invariants.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use resilience_kernel::clock::{Clock, ManualClock};
use resilience_kernel::resilience::{BreakerSettings, CircuitBreaker, CircuitState};
use resilience_kernel::security::{InboundLimiter, InboundPolicy};
use resilience_kernel::FetchError;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn breaker_opens_after_threshold_and_stays_shut(
        threshold in 1u32..8,
        extra_calls in 0u32..10,
        reset_secs in 1u64..1000,
    ) {
        let rt = runtime();
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new(
            "prop",
            BreakerSettings {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(reset_secs),
                call_timeout: Duration::from_secs(5),
                throttle_key: None,
            },
            clock.clone(),
        );
        let calls = AtomicU32::new(0);

        rt.block_on(async {
            for _ in 0..threshold {
                breaker.call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Status(503))
                }).await;
            }
        });
        prop_assert_eq!(breaker.state(), CircuitState::Open);

        rt.block_on(async {
            for _ in 0..extra_calls {
                breaker.call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(1))
                }).await;
            }
        });
        prop_assert_eq!(calls.load(Ordering::SeqCst), threshold);

        clock.advance(Duration::from_secs(reset_secs));
        let outcome = rt.block_on(breaker.call(|| async { Ok(json!(1)) }));
        prop_assert!(outcome.is_success());
        prop_assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn inbound_window_never_exceeds_limit(
        max_per_window in 1usize..20,
        window_secs in 1u64..120,
        gaps_ms in proptest::collection::vec(0u64..5_000, 1..200),
    ) {
        let clock = Arc::new(ManualClock::new());
        let window = Duration::from_secs(window_secs);
        let limiter = InboundLimiter::new(InboundPolicy { max_per_window, window }, clock.clone());
        let mut accepted = Vec::new();

        for gap in gaps_ms {
            clock.advance(Duration::from_millis(gap));
            if limiter.allow("client").is_ok() {
                accepted.push(clock.now());
            }
            let now = clock.now();
            let in_window = accepted
                .iter()
                .filter(|&&t| now.saturating_duration_since(t) < window)
                .count();
            prop_assert!(in_window <= max_per_window);
        }
    }
}
