//! The forwarding engine.
//!
//! One call to [`ForwardingEngine::forward`] takes an inbound request through
//! route lookup, admission, outbound rewrite, the upstream exchange and hands
//! back a response whose body streams from upstream. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::time::{timeout_at, Instant};

use crate::config::ProxyConfig;
use crate::error::ForwardError;
use crate::headers::HeaderPolicy;
use crate::http::connection::ConnectionAbort;
use crate::http::request::request_id_of;
use crate::observability::metrics;
use crate::proxy::client::{build_client, is_connect_timeout, UpstreamClient};
use crate::proxy::limiter::ConcurrencyLimiter;
use crate::proxy::outbound::build_outbound;
use crate::proxy::relay::{RelayBody, RelayContext};
use crate::proxy::state::{RequestLifecycle, RequestPhase};
use crate::routing::{RoutingError, RoutingTable};

/// Shared forwarding engine. Cheap to share behind an `Arc`; the routing
/// table can be swapped while requests are in flight.
pub struct ForwardingEngine {
    routes: ArcSwap<RoutingTable>,
    client: UpstreamClient,
    limiter: ConcurrencyLimiter,
    headers: HeaderPolicy,
    headers_timeout: Duration,
    request_timeout: Duration,
}

impl ForwardingEngine {
    /// Build an engine from an already validated configuration.
    pub fn new(config: &ProxyConfig) -> Result<Self, ForwardError> {
        let routes = RoutingTable::from_config(&config.routes).map_err(|e| ForwardError::Config(e.to_string()))?;
        let headers = HeaderPolicy::from_config(&config.headers).map_err(|e| ForwardError::Config(e.to_string()))?;
        let client = build_client(&config.timeouts)?;

        tracing::info!(
            routes = routes.len(),
            max_in_flight = config.limits.max_in_flight,
            overload = ?config.limits.overload,
            strip_hop_by_hop = headers.strips_hop_by_hop(),
            "Forwarding engine ready"
        );

        Ok(Self {
            routes: ArcSwap::from_pointee(routes),
            client,
            limiter: ConcurrencyLimiter::from_config(&config.limits),
            headers,
            headers_timeout: config.timeouts.headers(),
            request_timeout: config.timeouts.request(),
        })
    }

    /// Forward one request and return the upstream response.
    ///
    /// The returned body keeps streaming from upstream. The relay behind it
    /// holds the in-flight slot and enforces the request deadline whether or
    /// not the caller keeps reading.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let received_at = Instant::now();
        let request_deadline = received_at + self.request_timeout;
        let headers_deadline = request_deadline.min(received_at + self.headers_timeout);

        let mut lifecycle = RequestLifecycle::new(request_id_of(&request));
        let (parts, body) = request.into_parts();

        let table = self.routes.load_full();
        let Some(route) = table.lookup(parts.uri.path()).cloned() else {
            tracing::warn!(request_id = %lifecycle.request_id(), path = %parts.uri.path(), "No route matched");
            metrics::record_forward_error("no_route_match", "none");
            return Err(ForwardError::NoRouteMatch {
                path: parts.uri.path().to_string(),
            });
        };
        lifecycle.advance(RequestPhase::Routed);

        let permit = match self.limiter.acquire(request_deadline).await {
            Ok(permit) => permit,
            Err(e) => {
                lifecycle.fail();
                tracing::warn!(
                    request_id = %lifecycle.request_id(),
                    route = %route.name(),
                    in_flight = self.limiter.in_flight(),
                    "Rejecting request, in-flight limit reached"
                );
                metrics::record_forward_error(e.kind(), route.name());
                return Err(e);
            }
        };

        let method = parts.method.clone();
        let connection = parts.extensions.get::<ConnectionAbort>().cloned();
        let outbound = match build_outbound(parts, body, &route, &self.headers) {
            Ok(outbound) => outbound,
            Err(e) => {
                lifecycle.fail();
                metrics::record_forward_error(e.kind(), route.name());
                return Err(e);
            }
        };
        lifecycle.advance(RequestPhase::Forwarding);

        tracing::debug!(
            request_id = %lifecycle.request_id(),
            route = %route.name(),
            method = %method,
            upstream = %outbound.uri(),
            "Forwarding request"
        );

        let origin = route.origin().to_string();
        let response = match timeout_at(headers_deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                lifecycle.fail();
                let err = if is_connect_timeout(&e) {
                    ForwardError::UpstreamTimeout {
                        origin,
                        elapsed: received_at.elapsed(),
                    }
                } else {
                    ForwardError::UpstreamUnreachable {
                        origin,
                        reason: error_chain(&e),
                    }
                };
                tracing::warn!(request_id = %lifecycle.request_id(), route = %route.name(), error = %err, "Upstream request failed");
                metrics::record_forward_error(err.kind(), route.name());
                return Err(err);
            }
            Err(_) => {
                // Dropping the client future here closes the upstream connection.
                lifecycle.fail();
                let err = ForwardError::UpstreamTimeout {
                    origin,
                    elapsed: received_at.elapsed(),
                };
                tracing::warn!(request_id = %lifecycle.request_id(), route = %route.name(), error = %err, "Upstream response headers timed out");
                metrics::record_forward_error(err.kind(), route.name());
                return Err(err);
            }
        };
        lifecycle.advance(RequestPhase::Relaying);

        let (mut parts, upstream_body) = response.into_parts();
        self.headers.apply_response(&mut parts.headers);

        tracing::debug!(
            request_id = %lifecycle.request_id(),
            route = %route.name(),
            status = parts.status.as_u16(),
            "Relaying upstream response"
        );
        metrics::record_upstream_response(route.name(), parts.status.as_u16());

        let relay = RelayBody::spawn(
            upstream_body,
            request_deadline,
            Some(permit),
            RelayContext {
                lifecycle,
                route: route.name().to_string(),
                received_at: received_at.into_std(),
                connection,
            },
        );
        Ok(Response::from_parts(parts, Body::new(relay)))
    }

    /// Swap in a new routing table. Requests already routed keep the route
    /// they resolved.
    pub fn reload(&self, routes: RoutingTable) {
        let count = routes.len();
        self.routes.store(Arc::new(routes));
        tracing::info!(routes = count, "Routing table reloaded");
    }

    /// Rebuild the routing table from `config` and swap it in. On error the
    /// current table stays active.
    pub fn reload_from_config(&self, config: &ProxyConfig) -> Result<usize, RoutingError> {
        let routes = RoutingTable::from_config(&config.routes)?;
        let count = routes.len();
        self.reload(routes);
        Ok(count)
    }

    /// Snapshot of the active routing table.
    pub fn routes(&self) -> Arc<RoutingTable> {
        self.routes.load_full()
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
