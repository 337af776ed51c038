//! Shared kernel components driven from many tasks at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::task::JoinSet;

use resilience_kernel::clock::{ManualClock, SystemClock};
use resilience_kernel::observability::{AlertThresholds, MetricsCollector};
use resilience_kernel::resilience::CircuitState;
use resilience_kernel::security::{InboundLimiter, InboundPolicy, OutboundLimiter};
use resilience_kernel::{FetchError, Outcome, SourceRequest};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_throttle_keeps_spacing() {
    let interval = Duration::from_millis(100);
    let limiter = Arc::new(OutboundLimiter::new(Duration::ZERO, SystemClock::shared()));
    limiter.set_interval("api.bls.gov", interval);

    let n = 5;
    let start = Instant::now();
    let mut tasks = JoinSet::new();
    for _ in 0..n {
        let limiter = limiter.clone();
        tasks.spawn(async move {
            limiter.throttle("api.bls.gov").await;
            start.elapsed()
        });
    }

    let mut finished = Vec::with_capacity(n);
    while let Some(elapsed) = tasks.join_next().await {
        finished.push(elapsed.unwrap());
    }
    finished.sort();

    for (i, elapsed) in finished.iter().enumerate() {
        assert!(*elapsed >= interval * i as u32, "call {} finished after {:?}", i, elapsed);
    }
    assert!(finished[n - 1] >= interval * (n as u32 - 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_breaker_once() {
    let (kernel, _) = common::test_kernel([("nvd", common::source(3, 600))]);

    let n = 32;
    let mut tasks = JoinSet::new();
    for i in 0..n {
        let kernel = kernel.clone();
        tasks.spawn(async move {
            let request = SourceRequest::new("nvd").param("cve", format!("CVE-2024-{:04}", i));
            kernel
                .fetch(&request, || async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Err(FetchError::Status(503))
                })
                .await
        });
    }
    while let Some(outcome) = tasks.join_next().await {
        assert!(matches!(outcome.unwrap(), Outcome::Failure(_)));
    }

    let breaker = kernel.breaker("nvd");
    let stats = breaker.snapshot();
    assert_eq!(stats.state, CircuitState::Open);
    assert!(stats.failures >= 3);
    assert_eq!(stats.failures + stats.rejected, n);
    assert_eq!(breaker.failure_count() as u64, stats.failures);

    let circuit = &kernel.performance_summary().circuit_breaker_stats["nvd"];
    assert_eq!(circuit.times_opened, 1);
    assert_eq!(circuit.failures, stats.failures);
    assert_eq!(circuit.rejected, stats.rejected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inbound_never_exceeds_window() {
    let limiter = Arc::new(InboundLimiter::new(
        InboundPolicy {
            max_per_window: 10,
            window: Duration::from_secs(60),
        },
        Arc::new(ManualClock::new()),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..100 {
        let limiter = limiter.clone();
        tasks.spawn(async move { limiter.allow("203.0.113.7").is_ok() });
    }

    let mut admitted = 0;
    while let Some(ok) = tasks.join_next().await {
        if ok.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_are_all_counted() {
    let collector = MetricsCollector::shared(50, AlertThresholds::default(), Arc::new(ManualClock::new()));

    let mut tasks = JoinSet::new();
    for worker in 0..8 {
        let collector = collector.clone();
        tasks.spawn(async move {
            for i in 0..100 {
                collector.record_request(
                    "fred",
                    "series",
                    Duration::from_millis(10),
                    (worker + i) % 4 != 0,
                    false,
                    CircuitState::Closed,
                );
            }
        });
    }
    while let Some(done) = tasks.join_next().await {
        done.unwrap();
    }

    let stats = collector.get_source_stats("fred").unwrap();
    assert_eq!(stats.total_requests, 800);
    assert_eq!(stats.successes + stats.failures, 800);
    assert_eq!(collector.recent(usize::MAX).len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_share_one_cached_payload() {
    let (kernel, _) = common::test_kernel([("ofac", common::source(3, 600))]);
    let request = SourceRequest::new("ofac").param("name", "acme");
    kernel.fetch(&request, || async { Ok(json!({"entries": 1})) }).await;

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let kernel = kernel.clone();
        let request = request.clone();
        tasks.spawn(async move {
            kernel
                .fetch(&request, || async { Err(FetchError::Transport("unused".into())) })
                .await
        });
    }
    while let Some(outcome) = tasks.join_next().await {
        assert_eq!(outcome.unwrap().data(), Some(&json!({"entries": 1})));
    }
    assert_eq!(kernel.breakers().all_stats()["ofac"].total_calls, 1);
}
