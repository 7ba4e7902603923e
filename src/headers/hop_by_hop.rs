//! Hop-by-hop header stripping (RFC 9110 section 7.6.1).

use axum::http::header::{self, HeaderMap, HeaderName};

/// Hop-by-hop headers removed when the standard stripping policy is on.
pub const STANDARD: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Removes `Connection` together with every header it names.
///
/// Tokens that are not valid header names (`close`, garbage) are skipped.
pub fn strip_connection(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| {
            let token = token.trim();
            if token.is_empty() {
                None
            } else {
                HeaderName::from_bytes(token.to_ascii_lowercase().as_bytes()).ok()
            }
        })
        .collect();

    headers.remove(header::CONNECTION);
    for name in listed {
        headers.remove(name);
    }
}

/// Strips `Connection` and its listed headers, plus the [`STANDARD`] set
/// and `Upgrade` when `standard` is true.
pub fn strip(headers: &mut HeaderMap, standard: bool) {
    strip_connection(headers);
    if standard {
        let present: Vec<HeaderName> = headers.keys().filter(|name| is_hop_by_hop(name)).cloned().collect();
        for name in present {
            headers.remove(name);
        }
    }
}

/// True if `name` belongs to the standard hop-by-hop set.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::UPGRADE || STANDARD.iter().any(|h| h == name)
}
