//! # MURMUR Transport
//!
//! Network transport layer for the MURMUR group-chat protocol.
//!
//! This crate provides:
//! - The async [`Transport`](transport::Transport) trait the protocol
//!   engine is written against
//! - [`MulticastTransport`](multicast::MulticastTransport), the UDP
//!   multicast implementation used in production
//!
//! Delivery is best-effort: datagrams may be lost, duplicated, or
//! reordered, and the engine is expected to tolerate all three.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod multicast;
pub mod transport;

pub use multicast::MulticastTransport;
pub use transport::{Transport, TransportError, TransportResult};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Receive buffer size requested from the kernel
    pub recv_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
        }
    }
}
