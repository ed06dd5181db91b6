//! Accepted connections and their capacity tokens.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Tie each accepted stream to the token it consumed
//! - Return the token exactly once, whichever way the connection ends

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::net::gate::CapacityToken;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A stream accepted through an admission gate.
///
/// Holds the gate token until the connection is closed: by [`close`],
/// by an `AsyncWrite` shutdown, or by being dropped. Only the first of
/// those returns the token.
///
/// [`close`]: GuardedConnection::close
#[derive(Debug)]
pub struct GuardedConnection<S> {
    stream: S,
    token: Option<CapacityToken>,
    id: ConnectionId,
}

impl<S> GuardedConnection<S> {
    pub(crate) fn new(stream: S, token: CapacityToken) -> Self {
        let id = ConnectionId::new();
        metrics::record_connection_opened();
        tracing::trace!(connection_id = %id, "Connection admitted");
        Self {
            stream,
            token: Some(token),
            id,
        }
    }

    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the capacity token has already gone back to the gate.
    pub fn is_released(&self) -> bool {
        self.token.is_none()
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            token.release();
            metrics::record_connection_closed();
            tracing::trace!(connection_id = %self.id, "Connection closed");
        }
    }
}

impl<S: AsyncWrite + Unpin> GuardedConnection<S> {
    /// Shut the stream down and release the token.
    ///
    /// Safe to call more than once; the token is released on the first call
    /// even if the shutdown itself fails.
    pub async fn close(&mut self) -> io::Result<()> {
        let result = self.stream.shutdown().await;
        self.release();
        result
    }
}

impl<S> Drop for GuardedConnection<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for GuardedConnection<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for GuardedConnection<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let result = ready!(Pin::new(&mut this.stream).poll_shutdown(cx));
        this.release();
        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::gate::AdmissionGate;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn double_close_releases_once() {
        let gate = AdmissionGate::new(2);
        let (local, _remote) = duplex(64);
        let mut conn = GuardedConnection::new(local, gate.acquire().await.unwrap());
        assert_eq!(gate.in_use(), 1);

        conn.close().await.unwrap();
        assert!(conn.is_released());
        assert_eq!(gate.available(), 2);

        let _ = conn.close().await;
        drop(conn);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn drop_releases_token() {
        let gate = AdmissionGate::new(1);
        let (local, _remote) = duplex(64);
        let conn = GuardedConnection::new(local, gate.acquire().await.unwrap());
        assert!(gate.try_acquire().is_none());

        drop(conn);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn write_shutdown_releases_token() {
        let gate = AdmissionGate::new(1);
        let (local, _remote) = duplex(64);
        let mut conn = GuardedConnection::new(local, gate.acquire().await.unwrap());

        AsyncWriteExt::shutdown(&mut conn).await.unwrap();
        assert!(conn.is_released());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn stream_io_passes_through() {
        let gate = AdmissionGate::new(1);
        let (local, mut remote) = duplex(64);
        let mut conn = GuardedConnection::new(local, gate.acquire().await.unwrap());

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").await.unwrap();
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
