//! Request and response header rewrite policy.

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::schema::HeaderConfig;
use crate::headers::hop_by_hop;
use crate::headers::transform::{self, HeaderTransform, TransformError};
use crate::routing::Route;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Process-wide header policy. Route-specific transforms live on [`Route`].
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    strip_hop_by_hop: bool,
    forwarded: bool,
    request: Vec<HeaderTransform>,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            strip_hop_by_hop: true,
            forwarded: false,
            request: Vec::new(),
        }
    }
}

impl HeaderPolicy {
    pub fn from_config(config: &HeaderConfig) -> Result<Self, TransformError> {
        Ok(Self {
            strip_hop_by_hop: config.strip_hop_by_hop,
            forwarded: config.forwarded,
            request: transform::parse_all(&config.request)?,
        })
    }

    pub fn strips_hop_by_hop(&self) -> bool {
        self.strip_hop_by_hop
    }

    /// Rewrite inbound headers into outbound headers for `route`.
    ///
    /// Order: strip hop-by-hop, drop the caller's `Host`, add `X-Forwarded-*`
    /// if enabled, set `Host` to the origin authority, then run the global
    /// transforms followed by the route's own.
    pub fn apply_request(&self, headers: &mut HeaderMap, route: &Route, client: Option<SocketAddr>) {
        hop_by_hop::strip(headers, self.strip_hop_by_hop);
        let caller_host = headers.remove(header::HOST);

        if self.forwarded {
            append_forwarded(headers, client, caller_host);
        }

        headers.insert(header::HOST, route.origin().host_header());

        transform::apply_all(&self.request, headers);
        transform::apply_all(route.request_headers(), headers);
    }

    /// Response headers pass through untouched apart from hop-by-hop
    /// stripping, and only when the policy enables it.
    pub fn apply_response(&self, headers: &mut HeaderMap) {
        if self.strip_hop_by_hop {
            hop_by_hop::strip(headers, true);
        }
    }
}

fn append_forwarded(headers: &mut HeaderMap, client: Option<SocketAddr>, caller_host: Option<HeaderValue>) {
    if let Some(addr) = client {
        let ip = addr.ip().to_string();
        let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    if let Some(host) = caller_host {
        headers.insert(X_FORWARDED_HOST, host);
    }
}
