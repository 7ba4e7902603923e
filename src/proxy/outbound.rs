//! Inbound to outbound request rewrite.
//!
//! Pure request construction, no I/O: the route decides the origin, the
//! header policy decides the headers, the method decides whether the body
//! travels.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{Method, Request, Uri, Version};

use crate::error::ForwardError;
use crate::headers::HeaderPolicy;
use crate::routing::Route;

/// GET and HEAD never carry a body upstream.
pub fn method_carries_body(method: &Method) -> bool {
    method != Method::GET && method != Method::HEAD
}

/// Target URI: origin scheme and authority, inbound path and query.
pub fn target_uri(inbound: &Uri, route: &Route) -> Result<Uri, ForwardError> {
    let path_and_query = inbound
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    Uri::builder()
        .scheme(route.origin().scheme().clone())
        .authority(route.origin().authority().clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ForwardError::InvalidRequest(e.to_string()))
}

/// Build the upstream request for `route` from the inbound parts and body.
pub fn build_outbound(
    parts: Parts,
    body: Body,
    route: &Route,
    policy: &HeaderPolicy,
) -> Result<Request<Body>, ForwardError> {
    let uri = target_uri(&parts.uri, route)?;
    let client = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut headers = parts.headers;
    policy.apply_request(&mut headers, route, client);

    let body = if method_carries_body(&parts.method) {
        body
    } else {
        // The body is dropped, so its framing headers must go too.
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        Body::empty()
    };

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11)
        .body(body)
        .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
    *outbound.headers_mut() = headers;
    Ok(outbound)
}
