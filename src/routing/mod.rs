//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → table.rs (longest-prefix lookup)
//!     → Return: matched Route (origin + per-route transforms) or no match
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → origin.rs (parse scheme/host/port)
//!     → table.rs (prefix index, duplicate + default checks)
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Tables are compiled once and never mutated; reload swaps a whole table
//! - Deterministic: the same path always resolves to the same route
//! - Conflicts fail at load time, never per request

pub mod origin;
pub mod table;

pub use origin::{Origin, OriginError};
pub use table::{Route, RoutingError, RoutingTable, DEFAULT_PREFIX};
