//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!     → routing table compiled and shared via Arc
//!
//! On change (reload.enabled):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → engine swaps the routing table atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the routing table is reloadable; timeouts, limits and the global
//!   header policy are fixed for the process lifetime

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    HeaderConfig, HeaderTransformConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    OverloadMode, ProxyConfig, ReloadConfig, RouteConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
