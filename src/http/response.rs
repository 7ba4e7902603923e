//! Error responses.
//!
//! Failures raised before upstream headers arrive become a short plain-text
//! response with the status from [`ForwardError::status`]. Failures after
//! that point abort the connection instead; see the relay body.

use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use crate::error::ForwardError;

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ForwardError::NoRouteMatch { .. } => "No matching route found".to_string(),
            ForwardError::UpstreamUnreachable { .. } => "Upstream unreachable".to_string(),
            ForwardError::UpstreamTimeout { .. } => "Upstream timed out".to_string(),
            ForwardError::ServiceOverloaded { .. } => "Service overloaded".to_string(),
            ForwardError::InvalidRequest(reason) => format!("Invalid request: {reason}"),
            ForwardError::BodyStreamError { .. } | ForwardError::Client(_) | ForwardError::Config(_) => {
                status.canonical_reason().unwrap_or("Error").to_string()
            }
        };
        (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}
