//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Routing table: path prefix to upstream origin.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// In-flight request limits and overload policy.
    pub limits: LimitsConfig,

    /// Header rewrite policy.
    pub headers: HeaderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Config file hot reload.
    pub reload: ReloadConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One routing rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match. `/` is the default route.
    pub path_prefix: String,

    /// Upstream origin, scheme + host + optional port.
    pub origin: String,

    /// Header transforms applied after the global ones.
    #[serde(default)]
    pub request_headers: Vec<HeaderTransformConfig>,
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, path_prefix: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            origin: origin.into(),
            request_headers: Vec::new(),
        }
    }

    pub fn with_request_headers(mut self, transforms: Vec<HeaderTransformConfig>) -> Self {
        self.request_headers = transforms;
        self
    }
}

/// A header transform as written in the config file.
///
/// ```toml
/// request_headers = [
///     { op = "set", name = "x-edge", value = "1" },
///     { op = "remove", name = "cookie" },
///     { op = "copy_unless_present", from = "x-request-id", to = "x-correlation-id" },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HeaderTransformConfig {
    Remove { name: String },
    Set { name: String, value: String },
    CopyUnlessPresent { from: String, to: String },
}

/// Timeout configuration for the forwarding path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment (TCP + TLS) timeout in seconds.
    pub connect_secs: u64,

    /// Time from receiving a request to receiving upstream headers, in seconds.
    pub headers_secs: u64,

    /// Total time from receiving a request to relaying the last body byte.
    pub request_secs: u64,

    /// Idle pooled upstream connection lifetime in seconds.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn headers(&self) -> Duration {
        Duration::from_secs(self.headers_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            headers_secs: 30,
            request_secs: 300,
            idle_secs: 90,
        }
    }
}

/// What happens when `max_in_flight` requests are already being served.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverloadMode {
    /// Fail immediately with 503.
    #[default]
    Reject,
    /// Wait up to `queue_timeout_ms` for a slot, then fail with 503.
    Queue,
}

/// Concurrency limits (backpressure).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent forwarded requests, counted until the body is relayed.
    pub max_in_flight: usize,

    /// Overload policy.
    pub overload: OverloadMode,

    /// Maximum queueing time for `overload = "queue"`, in milliseconds.
    pub queue_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1024,
            overload: OverloadMode::Reject,
            queue_timeout_ms: 100,
        }
    }
}

/// Header rewrite policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HeaderConfig {
    /// Strip the standard hop-by-hop set from requests and responses.
    /// `Connection` and the headers it lists are always removed from requests.
    pub strip_hop_by_hop: bool,

    /// Add X-Forwarded-For / -Proto / -Host to outbound requests.
    pub forwarded: bool,

    /// Global request transforms, applied before the route's own.
    pub request: Vec<HeaderTransformConfig>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            strip_hop_by_hop: true,
            forwarded: false,
            request: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Hot reload of the routing table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Watch the config file and swap in new routing tables.
    pub enabled: bool,

    /// Poll interval for the file watcher backend, in seconds.
    pub poll_interval_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 2,
        }
    }
}
