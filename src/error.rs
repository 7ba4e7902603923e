//! Forwarding error taxonomy.
//!
//! Every failure of a single forwarded request is one of these variants.
//! None of them is fatal to the process and none is retried here; a calling
//! layer that wants retries has to build them on top.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced by [`ForwardingEngine::forward`](crate::proxy::ForwardingEngine::forward).
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No rule matched the path. Load-time validation requires a default
    /// route, so this only happens with hand-built tables.
    #[error("no route matches path {path}")]
    NoRouteMatch { path: String },

    /// Connection to the upstream failed or it hung up before sending
    /// response headers.
    #[error("upstream {origin} unreachable: {reason}")]
    UpstreamUnreachable { origin: String, reason: String },

    /// The deadline elapsed before upstream response headers arrived.
    #[error("upstream {origin} did not respond within {elapsed:?}")]
    UpstreamTimeout { origin: String, elapsed: Duration },

    /// The body stream broke after headers were already sent to the caller.
    #[error("body stream interrupted: {reason}")]
    BodyStreamError { reason: String },

    /// The in-flight limit was reached and the overload policy gave up.
    #[error("service overloaded ({in_flight} requests in flight)")]
    ServiceOverloaded { in_flight: usize },

    /// The inbound request could not be turned into an upstream request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream HTTP client could not be constructed.
    #[error("upstream client setup failed: {0}")]
    Client(String),

    /// Routes or header rules could not be built from configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ForwardError {
    /// Nearest HTTP status for the caller.
    ///
    /// `BodyStreamError` never reaches the caller as a status line in
    /// practice; it maps to 502 only if it is raised before headers go out.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::NoRouteMatch { .. } => StatusCode::NOT_FOUND,
            ForwardError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            ForwardError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::BodyStreamError { .. } => StatusCode::BAD_GATEWAY,
            ForwardError::ServiceOverloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ForwardError::Client(_) | ForwardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::NoRouteMatch { .. } => "no_route_match",
            ForwardError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ForwardError::UpstreamTimeout { .. } => "upstream_timeout",
            ForwardError::BodyStreamError { .. } => "body_stream_error",
            ForwardError::ServiceOverloaded { .. } => "service_overloaded",
            ForwardError::InvalidRequest(_) => "invalid_request",
            ForwardError::Client(_) => "client",
            ForwardError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_gateway_semantics() {
        let unreachable = ForwardError::UpstreamUnreachable {
            origin: "http://a".into(),
            reason: "refused".into(),
        };
        assert_eq!(unreachable.status(), StatusCode::BAD_GATEWAY);

        let timeout = ForwardError::UpstreamTimeout {
            origin: "http://a".into(),
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let overloaded = ForwardError::ServiceOverloaded { in_flight: 4 };
        assert_eq!(overloaded.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(overloaded.kind(), "service_overloaded");
    }
}
