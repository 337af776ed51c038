//! Ops router tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use resilience_kernel::admin::{self, setup_ops_router, OPS_SOURCE};
use resilience_kernel::config::{KernelConfig, SourceConfig};
use resilience_kernel::lifecycle::Shutdown;
use resilience_kernel::resilience::CircuitState;
use resilience_kernel::{FetchError, Kernel, SourceRequest};

mod common;

const KEY: &str = "CHANGE_ME_IN_PRODUCTION";

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_breaker(kernel: &Kernel, source: &str) {
    let request = SourceRequest::new(source);
    kernel
        .fetch(&request, || async { Err(FetchError::Status(503)) })
        .await;
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let (kernel, _) = common::bare_kernel();
    let app = setup_ops_router(kernel);

    let response = app
        .clone()
        .oneshot(Request::get("/ops/summary").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::get("/ops/summary")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_summary_shape() {
    let (kernel, _) = common::test_kernel([("fred", common::source(1, 600))]);
    open_breaker(&kernel, "fred").await;
    let app = setup_ops_router(kernel);

    let response = app.oneshot(request(Method::GET, "/ops/summary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    for key in ["sourceStats", "circuitBreakerStats", "cacheStats", "alerts", "recommendations"] {
        assert!(body.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(body["circuitBreakerStats"]["fred"]["state"], "OPEN");
    assert!(body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["source"] == "fred" && a["level"] == "error"));
}

#[tokio::test]
async fn test_reset_breakers() {
    let (kernel, _) = common::test_kernel([
        ("fred", common::source(1, 600)),
        ("bls", common::source(1, 600)),
    ]);
    open_breaker(&kernel, "fred").await;
    open_breaker(&kernel, "bls").await;
    let app = setup_ops_router(kernel.clone());

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/ops/breakers/fred/reset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["state"], "CLOSED");
    assert_eq!(kernel.breaker("fred").state(), CircuitState::Closed);
    assert_eq!(kernel.breaker("bls").state(), CircuitState::Open);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/ops/breakers/unknown/reset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/ops/breakers/reset"))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({"reset": 2}));
    assert_eq!(kernel.breaker("bls").state(), CircuitState::Closed);

    let response = app.oneshot(request(Method::GET, "/ops/breakers")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["bls"]["failureCount"], 0);
}

#[tokio::test]
async fn test_clear_expired_dry_run_then_real() {
    let (kernel, clock) = common::bare_kernel();
    kernel.cache().set("a:1", json!("short"), Duration::from_secs(5));
    kernel.cache().set("b:1", json!("long"), Duration::from_secs(500));
    clock.advance(Duration::from_secs(10));
    let app = setup_ops_router(kernel.clone());

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/ops/cache/clear-expired?dry_run=true"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["deletedCount"], 1);
    assert_eq!(body["dryRun"], true);
    assert_eq!(kernel.cache().len(), 2);

    let response = app
        .oneshot(request(Method::POST, "/ops/cache/clear-expired"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["deletedCount"], 1);
    assert_eq!(body["reclaimedBytes"], "\"short\"".len());
    assert_eq!(kernel.cache().len(), 1);
}

#[tokio::test]
async fn test_recent_and_clear_metrics() {
    let (kernel, _) = common::test_kernel([("fred", common::source(5, 600))]);
    for _ in 0..3 {
        open_breaker(&kernel, "fred").await;
    }
    let app = setup_ops_router(kernel.clone());

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/ops/metrics/recent?limit=2"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["source"], "fred");

    let response = app
        .oneshot(request(Method::POST, "/ops/metrics/clear"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(kernel.metrics().recent(10).is_empty());
}

#[tokio::test]
async fn test_ops_router_is_rate_limited() {
    let mut config = KernelConfig::default();
    config.sources.insert(
        OPS_SOURCE.to_string(),
        SourceConfig {
            inbound_max_per_window: 2,
            inbound_window_secs: 60,
            ..SourceConfig::default()
        },
    );
    let kernel = Arc::new(Kernel::new(config));
    let app = setup_ops_router(kernel);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/ops/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(request(Method::GET, "/ops/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
}

#[tokio::test]
async fn test_serve_over_tcp_until_shutdown() {
    let (kernel, _) = common::bare_kernel();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(admin::serve(kernel, listener, shutdown.subscribe()));

    let res = common::client()
        .get(format!("http://{}/ops/status", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "operational");

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
