//! Per-connection serving.
//!
//! # Responsibilities
//! - Serve one accepted caller connection (HTTP/1.1 or h2c)
//! - Hand the caller address and an abort handle to every request on it
//! - Drain on shutdown; close at once when a relay aborts the connection

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tower::ServiceExt;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a caller connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle that closes the caller connection a request arrived on.
///
/// Every request carries one in its extensions. The response relay fires it
/// when the relay fails, so a caller that stopped reading does not keep the
/// connection (and graceful shutdown) waiting forever.
#[derive(Debug, Clone)]
pub struct ConnectionAbort {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectionAbort {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Resolve once [`abort`](Self::abort) has been called on any clone.
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|aborted| *aborted).await;
    }
}

impl Default for ConnectionAbort {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `stream` with `router` until the caller closes it, a relay aborts
/// it, or `draining` flips and in-flight requests finish.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    mut draining: watch::Receiver<bool>,
) {
    let id = ConnectionId::new();
    let abort = ConnectionAbort::new();
    tracing::trace!(connection_id = %id, peer_addr = %peer, "Connection accepted");

    let service = {
        let abort = abort.clone();
        hyper::service::service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer));
            request.extensions_mut().insert(abort.clone());
            router.clone().oneshot(request)
        })
    };

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(connection_id = %id, error = %e, "Connection error");
            }
        }
        _ = draining.changed() => {
            tracing::debug!(connection_id = %id, "Draining connection");
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(connection_id = %id, error = %e, "Connection error while draining");
                    }
                }
                _ = abort.aborted() => {
                    tracing::debug!(connection_id = %id, "Connection aborted while draining");
                }
            }
        }
        _ = abort.aborted() => {
            tracing::debug!(connection_id = %id, peer_addr = %peer, "Connection aborted by failed relay");
        }
    }
    tracing::trace!(connection_id = %id, "Connection closed");
}
