//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded connection
//!     → server.rs (axum::serve, router, graceful shutdown)
//!     → request.rs (request ID set and propagated)
//!     → handler (decode body → dispatcher → JSON response)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
