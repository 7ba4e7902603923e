//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use edge_proxy::config::{ProxyConfig, RouteConfig};
use edge_proxy::lifecycle::Shutdown;
use edge_proxy::{ForwardingEngine, HttpServer};

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub engine: Arc<ForwardingEngine>,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the proxy with `config`, ignoring its bind address.
pub async fn spawn_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&config).expect("proxy config should build");
    let engine = server.engine();
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    TestProxy {
        addr,
        shutdown,
        engine,
        updates,
        handle,
    }
}

pub fn route(name: &str, prefix: &str, backend: SocketAddr) -> RouteConfig {
    RouteConfig::new(name, prefix, format!("http://{backend}"))
}

/// Config with a single default route to `backend`.
pub fn single_route_config(backend: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        routes: vec![route("default", "/", backend)],
        ..ProxyConfig::default()
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Start an HTTP backend that describes the request it received.
///
/// Response headers carry `x-echo-method`, `x-echo-uri` and
/// `x-echo-body-len`; the body lists the received headers one per line.
/// `/status/<code>` answers with that status and paths containing `slow`
/// wait half a second first.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    if path.contains("slow") {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    let status = path
        .strip_prefix("/status/")
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut listing = String::new();
    for (name, value) in &parts.headers {
        listing.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("")));
    }

    Response::builder()
        .status(status)
        .header("x-echo-method", parts.method.as_str())
        .header("x-echo-uri", parts.uri.to_string())
        .header("x-echo-body-len", body.len())
        .body(Body::from(listing))
        .unwrap()
}

/// Parse the header listing returned by the echo backend.
pub fn parse_echo(listing: &str) -> HashMap<String, String> {
    listing
        .lines()
        .filter_map(|line| line.split_once(": "))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Start a backend that writes `response` verbatim after reading the
/// request head, then closes the connection.
pub async fn start_raw_backend(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Start a backend streaming `total` bytes of `x` in `chunk`-sized frames
/// on every request. The counter holds the bytes produced so far across all
/// requests; frames are only produced when the connection asks for more.
pub async fn start_streaming_backend(total: usize, chunk: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            let frames = total.div_ceil(chunk);
            let body = stream::iter((0..frames).map(move |i| {
                let len = chunk.min(total - i * chunk);
                counter.fetch_add(len, Ordering::Relaxed);
                Ok::<_, std::io::Error>(vec![b'x'; len])
            }));
            Body::from_stream(body)
        }
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, produced)
}

/// Start a backend that sends headers, then one small chunk every 50ms
/// forever. The receiver fires once a write fails, i.e. once the proxy has
/// closed the upstream connection.
pub async fn start_trickle_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n";
                if socket.write_all(head).await.is_err() {
                    let _ = closed_tx.send(());
                    return;
                }
                loop {
                    if socket.write_all(b"5\r\ntick\n\r\n").await.is_err() || socket.flush().await.is_err() {
                        let _ = closed_tx.send(());
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            });
        }
    });
    (addr, closed_rx)
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
