//! Concurrent URL status fetcher.
//!
//! Accepts a JSON list of URLs, fetches each concurrently under a per-URL
//! deadline, and answers with the status line of every URL that responded.
//! Accepted connections are bounded by an admission gate.

pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::FanoutConfig;
pub use fetch::{Dispatcher, Fetcher, HttpFetcher};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use net::{AdmissionGate, LimitedListener};
