//! Route table with longest-prefix lookup.
//!
//! # Responsibilities
//! - Compile `RouteConfig`s into immutable `Route`s
//! - Reject conflicting or incomplete tables at load time
//! - Resolve a request path to exactly one route
//!
//! # Design Decisions
//! - Rules are indexed by prefix in a HashMap; lookup probes only the
//!   distinct prefix lengths, longest first, so cost grows with the number of
//!   distinct lengths rather than the number of rules
//! - Matching is byte-wise and case-sensitive (`/api` also matches `/apiary`)
//! - The prefix `/` is the default route and must exist

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::RouteConfig;
use crate::headers::transform::{self, HeaderTransform, TransformError};
use crate::routing::origin::{Origin, OriginError};

/// Prefix of the catch-all rule.
pub const DEFAULT_PREFIX: &str = "/";

/// Errors raised while compiling a routing table.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("route '{route}': invalid origin '{origin}': {source}")]
    InvalidOrigin {
        route: String,
        origin: String,
        #[source]
        source: OriginError,
    },

    #[error("route '{route}': path prefix '{prefix}' must start with '/'")]
    InvalidPrefix { route: String, prefix: String },

    #[error("route '{route}': path prefix '{prefix}' must be ASCII, percent-encode other characters")]
    NonAsciiPrefix { route: String, prefix: String },

    #[error("routes '{first}' and '{second}' share the path prefix '{prefix}'")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },

    #[error("route '{route}': {source}")]
    InvalidTransform {
        route: String,
        #[source]
        source: TransformError,
    },

    #[error("no default route (path prefix '/')")]
    MissingDefault,
}

/// A compiled routing rule.
#[derive(Debug)]
pub struct Route {
    name: String,
    prefix: String,
    origin: Origin,
    request_headers: Vec<HeaderTransform>,
}

impl Route {
    /// Compile one rule. Prefix uniqueness is the table's job.
    pub fn from_config(config: &RouteConfig) -> Result<Self, RoutingError> {
        if !config.path_prefix.starts_with('/') {
            return Err(RoutingError::InvalidPrefix {
                route: config.name.clone(),
                prefix: config.path_prefix.clone(),
            });
        }
        // Request paths arrive percent-encoded, so a raw non-ASCII prefix
        // could never match.
        if !config.path_prefix.is_ascii() {
            return Err(RoutingError::NonAsciiPrefix {
                route: config.name.clone(),
                prefix: config.path_prefix.clone(),
            });
        }
        let origin = Origin::parse(&config.origin).map_err(|source| RoutingError::InvalidOrigin {
            route: config.name.clone(),
            origin: config.origin.clone(),
            source,
        })?;
        let request_headers =
            transform::parse_all(&config.request_headers).map_err(|source| RoutingError::InvalidTransform {
                route: config.name.clone(),
                source,
            })?;

        Ok(Self {
            name: config.name.clone(),
            prefix: config.path_prefix.clone(),
            origin,
            request_headers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Transforms applied after the global ones.
    pub fn request_headers(&self) -> &[HeaderTransform] {
        &self.request_headers
    }
}

/// Immutable prefix index over compiled routes.
#[derive(Debug, Default)]
pub struct RoutingTable {
    by_prefix: HashMap<String, Arc<Route>>,
    /// Distinct prefix lengths, longest first.
    lengths: Vec<usize>,
}

impl RoutingTable {
    /// Compile and validate a full table.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RoutingError> {
        let by_prefix = index(configs)?;
        if !by_prefix.contains_key(DEFAULT_PREFIX) {
            return Err(RoutingError::MissingDefault);
        }
        Ok(Self::from_routes(by_prefix))
    }

    fn from_routes(by_prefix: HashMap<String, Arc<Route>>) -> Self {
        let mut lengths: Vec<usize> = by_prefix.keys().map(String::len).collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths.dedup();
        Self { by_prefix, lengths }
    }

    /// Longest-prefix match for `path`.
    pub fn lookup(&self, path: &str) -> Option<&Arc<Route>> {
        self.lengths.iter().find_map(|&len| {
            // `get` is None when the path is shorter or `len` splits a char.
            path.get(..len).and_then(|candidate| self.by_prefix.get(candidate))
        })
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

fn index(configs: &[RouteConfig]) -> Result<HashMap<String, Arc<Route>>, RoutingError> {
    let mut by_prefix: HashMap<String, Arc<Route>> = HashMap::with_capacity(configs.len());
    for config in configs {
        let route = Route::from_config(config)?;
        if let Some(existing) = by_prefix.get(route.prefix()) {
            return Err(RoutingError::DuplicatePrefix {
                prefix: route.prefix.clone(),
                first: existing.name.clone(),
                second: route.name.clone(),
            });
        }
        by_prefix.insert(route.prefix.clone(), Arc::new(route));
    }
    Ok(by_prefix)
}
