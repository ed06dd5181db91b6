//! Admission gate bounding concurrently open connections.
//!
//! # Responsibilities
//! - Own the fixed-size pool of capacity tokens
//! - Hand out tokens, waiting while the pool is exhausted
//! - Refuse every pending and future acquisition once closed
//!
//! # Design Decisions
//! - The pool is a Tokio semaphore; a token is an owned permit, so a token
//!   can only go back to the pool once
//! - Closing never revokes tokens already handed out

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Returned when acquisition is refused because the gate has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission gate is closed")]
pub struct GateClosed;

/// Shared handle to a pool of `capacity` connection slots.
///
/// Clones observe the same pool and the same closed flag.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    permits: Arc<Semaphore>,
    capacity: usize,
    closed: AtomicBool,
}

impl AdmissionGate {
    /// Create a gate with `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Wait for a token.
    ///
    /// Resolves with [`GateClosed`] as soon as the gate is closed, including
    /// for callers that were already waiting.
    pub async fn acquire(&self) -> Result<CapacityToken, GateClosed> {
        if self.is_closed() {
            return Err(GateClosed);
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(CapacityToken { _permit: permit })
    }

    /// Take a token only if one is free right now.
    pub fn try_acquire(&self) -> Option<CapacityToken> {
        if self.is_closed() {
            return None;
        }
        Arc::clone(&self.inner.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| CapacityToken { _permit: permit })
    }

    /// Close the gate.
    ///
    /// Returns `true` for the one call that actually performed the close.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.permits.close();
        tracing::info!(
            capacity = self.inner.capacity,
            in_use = self.in_use(),
            "Admission gate closed"
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Configured number of tokens.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tokens currently sitting in the pool.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Tokens currently held by connections.
    pub fn in_use(&self) -> usize {
        self.inner.capacity.saturating_sub(self.available())
    }
}

/// One unit of connection capacity.
///
/// Returned to the pool when released or dropped.
#[derive(Debug)]
pub struct CapacityToken {
    _permit: OwnedSemaphorePermit,
}

impl CapacityToken {
    /// Give the token back to its gate.
    pub fn release(self) {
        drop(self);
    }
}
