//! URL fetch fan-out subsystem.
//!
//! # Data Flow
//! ```text
//! JSON body
//!     → types.rs (FetchRequest, limit check)
//!     → dispatcher.rs (one task per URL, per-URL deadline, join all)
//!     → client.rs (GET url → status line)
//!     → FetchResults, or Cancelled if the request's token fired
//! ```

pub mod client;
pub mod dispatcher;
pub mod types;

pub use client::{status_line, FetchError, Fetcher, HttpFetcher};
pub use dispatcher::{DispatchError, Dispatcher};
pub use types::{FetchRequest, FetchResponse, FetchResults, RequestError};
