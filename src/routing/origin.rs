//! Upstream origin (scheme + host + port).

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, Scheme};
use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

/// Reasons an origin string is rejected.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("not a valid URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("origin must not carry a path (found '{0}')")]
    HasPath(String),

    #[error("origin must not carry a query or fragment")]
    HasQuery,

    #[error("origin must not carry credentials")]
    HasCredentials,

    #[error("'{0}' is not usable as an HTTP authority")]
    InvalidAuthority(String),
}

/// A parsed upstream origin.
///
/// Only scheme, host and port survive parsing; the authority and the `Host`
/// header value are precomputed because every forwarded request needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: Scheme,
    authority: Authority,
    host: String,
    port: Option<u16>,
    host_header: HeaderValue,
}

impl Origin {
    /// Parse an origin such as `https://upstream.example` or
    /// `http://127.0.0.1:3000/`.
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        let url = Url::parse(input.trim())?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(OriginError::UnsupportedScheme(other.to_string())),
        };
        if !url.username().is_empty() || url.password().is_some() {
            return Err(OriginError::HasCredentials);
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(OriginError::HasQuery);
        }
        if !matches!(url.path(), "" | "/") {
            return Err(OriginError::HasPath(url.path().to_string()));
        }

        let host = url.host_str().ok_or(OriginError::MissingHost)?.to_string();
        // `Url::port` is None when the port is the scheme default.
        let port = url.port();
        let authority = match port {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };
        let host_header =
            HeaderValue::from_str(&authority).map_err(|_| OriginError::InvalidAuthority(authority.clone()))?;
        let authority =
            Authority::from_str(&authority).map_err(|_| OriginError::InvalidAuthority(authority.clone()))?;

        Ok(Self {
            scheme,
            authority,
            host,
            port,
            host_header,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// `host[:port]`, port omitted when it is the scheme default.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit, non-default port if one was configured.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Value for the outbound `Host` header.
    pub fn host_header(&self) -> HeaderValue {
        self.host_header.clone()
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Origin::parse(s)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_dropped_from_authority() {
        let origin = Origin::parse("https://upstream.example:443").unwrap();
        assert_eq!(origin.authority().as_str(), "upstream.example");
        assert_eq!(origin.port(), None);
        assert_eq!(origin.to_string(), "https://upstream.example");
    }

    #[test]
    fn explicit_port_is_kept() {
        let origin = Origin::parse("http://127.0.0.1:3000/").unwrap();
        assert_eq!(origin.authority().as_str(), "127.0.0.1:3000");
        assert_eq!(origin.host(), "127.0.0.1");
        assert_eq!(origin.host_header(), "127.0.0.1:3000");
    }

    #[test]
    fn international_host_header_is_ascii() {
        let origin = Origin::parse("https://bücher.example:8443").unwrap();
        assert_eq!(origin.host(), "xn--bcher-kva.example");
        assert_eq!(origin.host_header(), "xn--bcher-kva.example:8443");
        assert_eq!(origin.authority().as_str(), "xn--bcher-kva.example:8443");
    }

    #[test]
    fn rejects_paths_queries_and_other_schemes() {
        assert!(matches!(
            Origin::parse("https://a.example/base"),
            Err(OriginError::HasPath(_))
        ));
        assert!(matches!(
            Origin::parse("https://a.example/?x=1"),
            Err(OriginError::HasQuery)
        ));
        assert!(matches!(
            Origin::parse("ftp://a.example"),
            Err(OriginError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Origin::parse("https://user:pw@a.example"),
            Err(OriginError::HasCredentials)
        ));
        assert!(Origin::parse("not a url").is_err());
    }
}
