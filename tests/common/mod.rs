//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use file_relay::config::RelayConfig;
use file_relay::{HttpServer, Shutdown};

/// A raw-TCP upstream whose behaviour is scripted per connection.
pub struct MockUpstream {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start an upstream; `handler` gets each socket and its 0-based connection index.
pub async fn start_upstream<F, Fut>(handler: F) -> MockUpstream
where
    F: Fn(TcpStream, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let index = counter.fetch_add(1, Ordering::SeqCst);
                    let handler = handler.clone();
                    tokio::spawn(async move { handler(socket, index).await });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, connections }
}

/// Read until the end of the request head and return it.
pub async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Write a complete response with a Content-Length and close.
pub async fn respond(socket: &mut TcpStream, status: &str, extra_headers: &[&str], body: &[u8]) {
    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for header in extra_headers {
        head.push_str(header);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(body).await;
    let _ = socket.shutdown().await;
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Defaults tuned for tests: loopback bind, no storage, fast retries.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.storage.enabled = false;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 10;
    config.upstream.connect_timeout_secs = 2;
    config.upstream.header_timeout_secs = 5;
    config.upstream.idle_timeout_secs = 5;
    config
}

/// Start the relay on an ephemeral port.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// An upstream that accepts and reads the request but never answers.
pub async fn silent_upstream() -> MockUpstream {
    start_upstream(|mut socket, _| async move {
        read_request_head(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    })
    .await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// POST `{"fileUrl": file_url}` to the relay.
pub async fn request_stream(relay: SocketAddr, file_url: &str) -> reqwest::Response {
    client()
        .post(format!("http://{}/api/stream", relay))
        .json(&serde_json::json!({ "fileUrl": file_url }))
        .send()
        .await
        .expect("Relay unreachable")
}
