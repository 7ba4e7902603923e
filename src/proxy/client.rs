//! Upstream HTTP client.
//!
//! A pooled hyper-util client behind an HTTPS-or-HTTP rustls connector.
//! Upstream connections always speak HTTP/1.1 so the rewritten `Host`
//! header is what the origin sees.

use std::sync::OnceLock;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::schema::TimeoutConfig;
use crate::error::ForwardError;

/// Client type used for every outbound request.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared upstream client.
pub fn build_client(timeouts: &TimeoutConfig) -> Result<UpstreamClient, ForwardError> {
    install_crypto_provider()?;

    let mut http = HttpConnector::new();
    // https URIs are handed to the TLS layer, so the TCP connector must accept them.
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(timeouts.connect()));

    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(timeouts.idle())
        .build(https))
}

fn install_crypto_provider() -> Result<(), ForwardError> {
    static RUSTLS_INIT: OnceLock<bool> = OnceLock::new();
    let installed = *RUSTLS_INIT.get_or_init(|| {
        // Another component may already have installed a provider; that is fine.
        rustls::crypto::ring::default_provider().install_default().is_ok()
            || rustls::crypto::CryptoProvider::get_default().is_some()
    });
    if installed {
        Ok(())
    } else {
        Err(ForwardError::Client("failed to install rustls crypto provider".into()))
    }
}

/// Classify a client error raised before response headers arrived.
///
/// Connect timeouts are reported by hyper-util as connect errors whose
/// source chain ends in an `io::ErrorKind::TimedOut`.
pub fn is_connect_timeout(error: &hyper_util::client::legacy::Error) -> bool {
    chain_has_timeout(std::error::Error::source(error))
}

fn chain_has_timeout(mut source: Option<&(dyn std::error::Error + 'static)>) -> bool {
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_builds_with_default_timeouts() {
        assert!(build_client(&TimeoutConfig::default()).is_ok());
        // Second construction reuses the installed provider.
        assert!(build_client(&TimeoutConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn refused_connection_is_not_a_timeout() {
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let client = build_client(&TimeoutConfig::default()).unwrap();
        let request = axum::http::Request::builder()
            .uri(format!("http://{addr}/"))
            .body(Body::empty())
            .unwrap();

        let err = client.request(request).await.unwrap_err();
        assert!(err.is_connect());
        assert!(!is_connect_timeout(&err));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("client error")]
    struct Wrapped(#[source] std::io::Error);

    #[test]
    fn io_timeout_in_source_chain_is_a_timeout() {
        let timed_out = Wrapped(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect"));
        assert!(chain_has_timeout(Some(&timed_out)));

        let refused = Wrapped(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(!chain_has_timeout(Some(&refused)));
        assert!(!chain_has_timeout(None));
    }
}
