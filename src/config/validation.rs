//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate every route: prefix shape, origin, transforms
//! - Detect conflicting routes and a missing default route
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::headers::transform::{self, TransformError};
use crate::routing::{Route, RoutingError, DEFAULT_PREFIX};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error(transparent)]
    Route(#[from] RoutingError),

    #[error("headers.request: {0}")]
    HeaderTransform(#[from] TransformError),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.max_in_flight must be greater than zero")]
    ZeroMaxInFlight,
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    validate_routes(config, &mut errors);

    if let Err(e) = transform::parse_all(&config.headers.request) {
        errors.push(e.into());
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("headers_secs", timeouts.headers_secs),
        ("request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if config.limits.max_in_flight == 0 {
        errors.push(ValidationError::ZeroMaxInFlight);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routes(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for route in &config.routes {
        if let Err(e) = Route::from_config(route) {
            errors.push(e.into());
        }
        if let Some(first) = seen.insert(route.path_prefix.as_str(), route.name.as_str()) {
            errors.push(
                RoutingError::DuplicatePrefix {
                    prefix: route.path_prefix.clone(),
                    first: first.to_string(),
                    second: route.name.clone(),
                }
                .into(),
            );
        }
    }

    if !seen.contains_key(DEFAULT_PREFIX) {
        errors.push(RoutingError::MissingDefault.into());
    }
}
