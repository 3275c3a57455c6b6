//! UDP multicast transport implementation.
//!
//! Joins an IPv4 multicast group and sends every datagram to it, so a
//! single send reaches all participants. Note that multicast loops the
//! sender's own packets back to it; the protocol layer is responsible for
//! self-suppression.

use crate::TransportConfig;
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;

/// UDP multicast transport.
///
/// Binds the multicast port with `SO_REUSEADDR` so several peers can run
/// on one host, joins the group on all interfaces, and sends to the fixed
/// `(group, port)` destination.
///
/// # Examples
///
/// ```no_run
/// use murmur_transport::{MulticastTransport, Transport, TransportConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport =
///     MulticastTransport::join("239.255.42.7".parse()?, 50407, &TransportConfig::default())?;
/// transport.send(b"hello group").await?;
/// # Ok(())
/// # }
/// ```
pub struct MulticastTransport {
    socket: Arc<UdpSocket>,
    destination: SocketAddr,
    closed: Arc<AtomicBool>,
}

impl MulticastTransport {
    /// Join a multicast group and bind its port.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::JoinFailed`] if the socket cannot be
    /// created, bound, or added to the group membership.
    pub fn join(group: Ipv4Addr, port: u16, config: &TransportConfig) -> TransportResult<Self> {
        if !group.is_multicast() {
            return Err(TransportError::JoinFailed(format!(
                "{group} is not a multicast address"
            )));
        }

        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        // Several peers on the same host share the port
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;
        socket
            .set_recv_buffer_size(config.recv_buffer_size)
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&SocketAddr::from(bind_addr).into())
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        tracing::debug!(%group, port, "joined multicast group");

        Ok(Self {
            socket: Arc::new(socket),
            destination: SocketAddr::from(SocketAddrV4::new(group, port)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The fixed multicast destination this transport sends to
    #[must_use]
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

#[async_trait]
impl Transport for MulticastTransport {
    async fn send(&self, buf: &[u8]) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        Ok(self.socket.send_to(buf, self.destination).await?)
    }

    async fn recv(&self, buf: &mut [u8]) -> TransportResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        let (size, _from) = self.socket.recv_from(buf).await?;
        Ok(size)
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const TEST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 99, 1);

    #[test]
    fn test_join_rejects_unicast_address() {
        let result = MulticastTransport::join(
            Ipv4Addr::new(127, 0, 0, 1),
            50999,
            &TransportConfig::default(),
        );
        assert!(matches!(result, Err(TransportError::JoinFailed(_))));
    }

    #[tokio::test]
    async fn test_join_and_local_addr() {
        let transport =
            MulticastTransport::join(TEST_GROUP, 50901, &TransportConfig::default()).unwrap();
        assert_eq!(transport.local_addr().unwrap().port(), 50901);
        assert_eq!(transport.destination().port(), 50901);
    }

    #[tokio::test]
    async fn test_two_members_share_port() {
        // SO_REUSEADDR lets two peers on one host join the same group
        let a = MulticastTransport::join(TEST_GROUP, 50902, &TransportConfig::default()).unwrap();
        let _b = MulticastTransport::join(TEST_GROUP, 50902, &TransportConfig::default()).unwrap();
        assert!(!a.is_closed());
    }

    #[tokio::test]
    async fn test_sender_receives_own_datagram() {
        // Multicast loopback: a member hears its own sends. The protocol
        // layer relies on this being filtered above the transport.
        let transport =
            MulticastTransport::join(TEST_GROUP, 50903, &TransportConfig::default()).unwrap();

        transport.send(b"echo to self").await.unwrap();

        let mut buf = vec![0u8; 1500];
        let size = timeout(Duration::from_secs(2), transport.recv(&mut buf))
            .await
            .expect("timed out waiting for loopback")
            .unwrap();
        assert_eq!(&buf[..size], b"echo to self");
    }

    #[tokio::test]
    async fn test_ops_after_close_fail() {
        let transport =
            MulticastTransport::join(TEST_GROUP, 50904, &TransportConfig::default()).unwrap();

        transport.close().await.unwrap();
        assert!(transport.is_closed());

        assert!(matches!(
            transport.send(b"x").await,
            Err(TransportError::Closed)
        ));
        let mut buf = vec![0u8; 16];
        assert!(matches!(
            transport.recv(&mut buf).await,
            Err(TransportError::Closed)
        ));
    }
}
