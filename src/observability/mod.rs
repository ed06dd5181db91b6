//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net, fetch, http produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows into handler log lines
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
