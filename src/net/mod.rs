//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → gate.rs (take a capacity token, or wait for one)
//!     → listener.rs (transport accept, token released on failure)
//!     → connection.rs (guarded stream, token released on close)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The token is taken before the transport accept so excess connections
//!   stay in the kernel backlog
//! - Closing the gate stops admission only; open connections drain normally

pub mod connection;
pub mod gate;
pub mod listener;

pub use connection::{ConnectionId, GuardedConnection};
pub use gate::{AdmissionGate, CapacityToken, GateClosed};
pub use listener::{AcceptError, Acceptor, LimitedListener, ListenerError};
