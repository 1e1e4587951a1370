//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use limit_gateway::config::{GatewayConfig, StoreBackend};
use limit_gateway::lifecycle::startup::build_state_with_store;
use limit_gateway::store::{CounterStore, MemoryCounterStore, StoreError, WindowCount};
use limit_gateway::{HttpServer, Shutdown};

/// A request as the mock upstream saw it on the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request line and headers, lowercased.
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn has_header(&self, name: &str) -> bool {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head.lines().any(|line| line.starts_with(&prefix))
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find_map(|line| line.strip_prefix(&prefix).map(|v| v.trim().to_string()))
    }
}

pub type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// Raw HTTP/1.1 response with `Content-Length` and `Connection: close`.
pub fn raw_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Start a programmable mock upstream on an ephemeral port.
///
/// Every request is recorded before `respond` is called.
pub async fn start_upstream<F, Fut>(respond: F) -> (SocketAddr, Recorded)
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded: Recorded = Arc::default();
    let respond = Arc::new(respond);

    let log = recorded.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let respond = respond.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let Some((mut socket, request)) = read_request(socket).await else {
                    return;
                };
                log.lock().unwrap().push(request.clone());
                let bytes = respond(request).await;
                let _ = socket.write_all(&bytes).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, recorded)
}

/// Upstream that answers every request with `200 OK` and `body`.
pub async fn start_fixed_upstream(body: &'static str) -> (SocketAddr, Recorded) {
    start_upstream(move |_| async move { raw_response("200 OK", &[], body.as_bytes()) }).await
}

/// Upstream that waits `delay` before answering `200 OK`.
pub async fn start_slow_upstream(delay: Duration) -> (SocketAddr, Recorded) {
    start_upstream(move |_| async move {
        tokio::time::sleep(delay).await;
        raw_response("200 OK", &[], b"slow")
    })
    .await
}

async fn read_request(mut socket: TcpStream) -> Option<(TcpStream, RecordedRequest)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some((socket, RecordedRequest { head, body }))
}

/// Config pointed at `upstream` with an in-memory store and a small quota.
pub fn gateway_config(upstream: SocketAddr, max_requests: u64) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.origin = format!("http://{upstream}");
    config.upstream.timeout_secs = 5;
    config.store.backend = StoreBackend::Memory;
    config.rate_limit.max_requests = max_requests;
    config.rate_limit.window_secs = 60;
    config
}

/// A running gateway. Dropping it does not stop the server; call `stop`.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Build state around `store` and serve on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig, store: Arc<dyn CounterStore>) -> TestGateway {
    let state = build_state_with_store(&config, store).await.expect("gateway state");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = HttpServer::new(config, state);
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestGateway { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Memory store that counts increments and can be switched off.
#[derive(Default)]
pub struct TestStore {
    inner: MemoryCounterStore,
    down: AtomicBool,
    increments: AtomicUsize,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for TestStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("switched off".into()));
        }
        self.inner.increment(key, window).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("switched off".into()));
        }
        Ok(())
    }
}
