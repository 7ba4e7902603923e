//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown
//!     SIGHUP         → re-read config, swap routing table
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → drain in-flight relays → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{next_signal, SignalEvent};
