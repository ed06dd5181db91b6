//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_signal resolves
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server closes gate → drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop admitting, drain, cancel stragglers
//! - Shutdown has a grace period: requests still open after it are cancelled

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
