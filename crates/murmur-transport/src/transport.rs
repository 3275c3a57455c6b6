//! Transport trait abstraction.
//!
//! The protocol engine talks to the network exclusively through this
//! trait, which lets tests substitute an in-memory bus for real multicast.
//! The destination is fixed when the transport is constructed (joining the
//! multicast group), so `send` takes no address.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport has been closed (expected during shutdown)
    #[error("transport is closed")]
    Closed,

    /// Joining the multicast group failed
    #[error("failed to join multicast group: {0}")]
    JoinFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Async best-effort datagram transport to a fixed group destination.
///
/// Sends may be silently dropped by the network; only local resource
/// failures surface as errors. `recv` blocks until a datagram arrives or
/// the transport is closed, in which case it fails with
/// [`TransportError::Closed`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a datagram to the group.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` only on local failure; network loss is
    /// silent.
    async fn send(&self, buf: &[u8]) -> TransportResult<usize>;

    /// Receive the next datagram into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the transport has been
    /// closed, and `TransportError::Io` on socket failure.
    async fn recv(&self, buf: &mut [u8]) -> TransportResult<usize>;

    /// The local address this transport is bound to.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the address cannot be determined.
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the transport; subsequent operations fail with
    /// [`TransportError::Closed`].
    async fn close(&self) -> TransportResult<()>;

    /// Whether the transport has been closed.
    fn is_closed(&self) -> bool;
}
