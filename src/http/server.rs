//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: every method and path goes to the proxy handler
//! - Wire up middleware (request id, tracing, panic isolation)
//! - Accept callers and serve each connection on its own task
//! - Drain open connections on shutdown
//! - Apply routing table updates from the config watcher

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, request_id::SetRequestIdLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::ForwardError;
use crate::http::connection::serve_connection;
use crate::http::request::{request_id_of, MakeRequestUuidV4, X_REQUEST_ID};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::proxy::ForwardingEngine;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForwardingEngine>,
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    router: Router,
    engine: Arc<ForwardingEngine>,
}

impl HttpServer {
    /// Create the server and its forwarding engine from a validated config.
    pub fn new(config: &ProxyConfig) -> Result<Self, ForwardError> {
        let engine = Arc::new(ForwardingEngine::new(config)?);
        let router = Self::build_router(AppState {
            engine: engine.clone(),
        });
        Ok(Self { router, engine })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            request_id = %request_id_of(request),
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    }))
                    .layer(CatchPanicLayer::new()),
            )
    }

    /// Serve until `shutdown` fires, then drain open connections.
    /// Configurations arriving on `config_updates` replace the routing table.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.engine.routes().len(), "HTTP server starting");

        let engine = self.engine.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = engine.reload_from_config(&config) {
                    tracing::error!(error = %e, "Rejected routing table update, keeping current table");
                }
            }
        });

        let (draining_tx, draining) = watch::channel(false);
        let mut connections = JoinSet::new();
        let shutdown = shutdown::triggered(shutdown);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        connections.spawn(serve_connection(stream, peer, self.router.clone(), draining.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        draining_tx.send_replace(true);
        tracing::info!(connections = connections.len(), "Draining connections");
        while connections.join_next().await.is_some() {}

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn engine(&self) -> Arc<ForwardingEngine> {
        self.engine.clone()
    }
}

/// Forward any request through the engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = match state.engine.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}
