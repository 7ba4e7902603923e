//! Edge proxy library: a path-prefix reverse proxy that forwards each
//! request to one configured origin and streams the response back.

pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::ForwardError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ForwardingEngine;
