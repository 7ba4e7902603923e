//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (HTTP/1.1 or h2c)
//!     → server.rs (accept loop, Axum setup, middleware)
//!     → connection.rs (per-connection task, abort handle)
//!     → request.rs (request id)
//!     → proxy engine (route, admit, forward, relay)
//!     → response.rs (errors raised before upstream headers)
//!     → Send to client
//! ```

pub mod connection;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
