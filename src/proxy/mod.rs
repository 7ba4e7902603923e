//! Request forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (RECEIVED)
//!     → routing table lookup         (ROUTED, or NoRouteMatch)
//!     → limiter.rs (in-flight slot)  (ServiceOverloaded)
//!     → outbound.rs (URI + headers + body rule)
//!     → client.rs (pooled upstream)  (FORWARDING; Unreachable / Timeout)
//!     → relay.rs (relay task)        (RELAYING → COMPLETE | FAILED)
//! ```
//!
//! # Design Decisions
//! - One attempt per request, no retries or failover
//! - Response bodies stream frame by frame; nothing is buffered whole
//! - The total deadline and the in-flight slot belong to the relay task, not
//!   to the caller's reads

pub mod client;
pub mod engine;
pub mod limiter;
pub mod outbound;
pub mod relay;
pub mod state;

pub use engine::ForwardingEngine;
pub use limiter::{ConcurrencyLimiter, InFlightPermit, OverloadPolicy};
pub use relay::RelayBody;
pub use state::{RequestLifecycle, RequestPhase};
