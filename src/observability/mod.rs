//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http handler, engine, relay body
//!     → logging.rs (structured events, request id on every line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
