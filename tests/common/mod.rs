//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use resilience_kernel::clock::ManualClock;
use resilience_kernel::config::{KernelConfig, SourceConfig};
use resilience_kernel::{FetchError, Kernel};

/// Kernel on a manual clock with the given per-source sections.
pub fn test_kernel<I>(sources: I) -> (Arc<Kernel>, Arc<ManualClock>)
where
    I: IntoIterator<Item = (&'static str, SourceConfig)>,
{
    let mut config = KernelConfig::default();
    for (name, source) in sources {
        config.sources.insert(name.to_string(), source);
    }
    let clock = Arc::new(ManualClock::new());
    (Arc::new(Kernel::with_clock(config, clock.clone())), clock)
}

/// Kernel on a manual clock with default configuration.
pub fn bare_kernel() -> (Arc<Kernel>, Arc<ManualClock>) {
    test_kernel(Vec::<(&'static str, SourceConfig)>::new())
}

/// Source section with the given breaker settings and no throttling.
pub fn source(failure_threshold: u32, reset_timeout_secs: u64) -> SourceConfig {
    SourceConfig {
        failure_threshold,
        reset_timeout_secs,
        ..SourceConfig::default()
    }
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A connector-style fetch: GET `url`, map transport, status and parse errors.
pub async fn http_fetch(client: reqwest::Client, url: String) -> Result<Value, FetchError> {
    let res = client
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    if !res.status().is_success() {
        return Err(FetchError::Status(res.status().as_u16()));
    }

    let text = res
        .text()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| FetchError::Malformed(e.to_string()))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
