//! Header rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound headers
//!     → hop_by_hop.rs (Connection + listed tokens, standard set)
//!     → policy.rs (drop caller Host, X-Forwarded-*, set origin Host)
//!     → transform.rs (global then per-route ordered transforms)
//!     → Outbound headers
//!
//! Upstream response headers
//!     → hop_by_hop.rs (only when strip_hop_by_hop is on)
//!     → Caller
//! ```
//!
//! # Design Decisions
//! - Pure functions over `HeaderMap`, testable without network I/O
//! - Transforms parsed once at load time; applying them cannot fail
//! - `Host` and `Connection` are owned by the proxy and never transformable

pub mod hop_by_hop;
pub mod policy;
pub mod transform;

pub use policy::HeaderPolicy;
pub use transform::{HeaderTransform, TransformError};
