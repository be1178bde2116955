use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::info;

use crate::ports::{MessageSender, NetworkError};
use crate::service::DiscoveryError;

/// The discovery UDP socket.
///
/// Shared between the receive loop (`recv`) and every sending task
/// (`MessageSender`); tokio sockets allow concurrent send and receive
/// through `&self`.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    max_packet_size: usize,
}

impl UdpTransport {
    /// Bind the discovery endpoint.
    ///
    /// # Errors
    ///
    /// `DiscoveryError::Bind` when the address is unavailable. This is the
    /// one failure that stops the service.
    pub async fn bind(addr: SocketAddr, max_packet_size: usize) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| DiscoveryError::Bind { addr, source })?;
        if let Ok(local) = socket.local_addr() {
            info!(addr = %local, "discovery socket bound");
        }
        Ok(Self {
            socket,
            max_packet_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive one datagram into `buf`.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), NetworkError> {
        Ok(self.socket.recv_from(buf).await?)
    }
}

#[async_trait]
impl MessageSender for UdpTransport {
    async fn send_packet(&self, bytes: &[u8], to: SocketAddr) -> Result<(), NetworkError> {
        if bytes.len() > self.max_packet_size {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                max: self.max_packet_size,
            });
        }
        self.socket.send_to(bytes, to).await?;
        Ok(())
    }
}
