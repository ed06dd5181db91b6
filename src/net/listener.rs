//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming connections only while holding an admission token
//! - Release the token if the transport accept fails
//! - Feed guarded connections into `axum::serve`

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::net::connection::GuardedConnection;
use crate::net::gate::AdmissionGate;

/// Error type for binding a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] io::Error),
}

/// Error type for a single accept.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The gate is closed; any connection the transport produced was dropped.
    #[error("listener is closed")]
    Closed,
    /// The transport's own accept failed.
    #[error("Failed to accept: {0}")]
    Io(#[from] io::Error),
}

/// Source of raw connections behind the admission gate.
pub trait Acceptor: Send + Sync + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Addr: fmt::Debug + Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Io, Self::Addr)>> + Send;

    fn local_addr(&self) -> io::Result<Self::Addr>;
}

impl Acceptor for TcpListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A listener that keeps at most `max_connections` accepted connections open.
///
/// When the limit is reached, accept waits until a connection closes or the
/// gate is closed.
pub struct LimitedListener<A> {
    inner: A,
    gate: AdmissionGate,
}

impl LimitedListener<TcpListener> {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self::new(listener, config.max_connections))
    }
}

impl<A: Acceptor> LimitedListener<A> {
    pub fn new(inner: A, max_connections: usize) -> Self {
        Self::with_gate(inner, AdmissionGate::new(max_connections))
    }

    /// Wrap `inner` behind an existing gate.
    pub fn with_gate(inner: A, gate: AdmissionGate) -> Self {
        Self { inner, gate }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The transport accept runs even when the gate refuses, so transport
    /// failures keep their native cause.
    pub async fn accept(&self) -> Result<(GuardedConnection<A::Io>, A::Addr), AcceptError> {
        let token = self.gate.acquire().await;
        let accepted = self.inner.accept().await;

        match (token, accepted) {
            (Ok(token), Ok((stream, addr))) => {
                let conn = GuardedConnection::new(stream, token);
                tracing::debug!(
                    connection_id = %conn.id(),
                    peer_addr = ?addr,
                    available_permits = self.gate.available(),
                    "Connection accepted"
                );
                Ok((conn, addr))
            }
            (Ok(token), Err(e)) => {
                token.release();
                Err(AcceptError::Io(e))
            }
            (Err(_), Ok((_stream, addr))) => {
                tracing::debug!(peer_addr = ?addr, "Gate closed, dropping connection");
                Err(AcceptError::Closed)
            }
            (Err(_), Err(e)) => Err(AcceptError::Io(e)),
        }
    }

    /// Stop admitting connections. Open connections are left alone.
    pub fn close(&self) -> bool {
        self.gate.close()
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<A::Addr> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.gate.available()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.gate.capacity()
    }
}

impl<A: Acceptor> axum::serve::Listener for LimitedListener<A> {
    type Io = GuardedConnection<A::Io>;
    type Addr = A::Addr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match LimitedListener::accept(self).await {
                Ok(accepted) => return accepted,
                Err(AcceptError::Closed) => {
                    // Graceful shutdown stops polling us from here on.
                    std::future::pending::<()>().await;
                }
                Err(AcceptError::Io(e)) if is_connection_error(&e) => {}
                Err(AcceptError::Io(e)) => {
                    tracing::error!(error = %e, "Accept failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Errors that only concern the one connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
