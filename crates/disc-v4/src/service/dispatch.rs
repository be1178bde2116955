//! Inbound path: the receive loop and packet dispatch.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::adapters::UdpTransport;
use crate::codec::{open_envelope, Message, MAX_PACKET_SIZE};
use crate::domain::Penalty;
use crate::handlers::{EnrHandler, FindNodeHandler, Inbound, NeighborsHandler, PingHandler};

use super::core::stopped;
use super::{DiscoveryError, DiscoveryService};

impl DiscoveryService {
    /// Authenticate one datagram and hand it to its handler.
    ///
    /// Never fails: anything that does not verify is logged and dropped.
    /// A correctly signed packet whose payload is garbage costs the sender a
    /// `BadData` penalty.
    pub async fn dispatch(&self, raw: &[u8], from: SocketAddr) {
        let envelope = match open_envelope(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                trace!(%from, len = raw.len(), reason = %err, "dropped datagram");
                return;
            }
        };
        if envelope.sender == self.local_id() {
            trace!(%from, "dropped own packet");
            return;
        }

        let message = match envelope.message(self.now()) {
            Ok(message) => message,
            Err(err) => {
                debug!(%from, node_id = %envelope.sender.short(), reason = %err, "dropped packet");
                if err.is_bad_payload() {
                    self.penalize(envelope.sender, Penalty::BadData);
                }
                return;
            }
        };

        let inbound = Inbound {
            sender: envelope.sender,
            hash: envelope.hash,
            from,
        };
        trace!(%from, node_id = %inbound.sender.short(), kind = ?message.packet_type(), "received");

        match message {
            Message::Ping(ping) => PingHandler::new(self).on_ping(ping, &inbound).await,
            Message::Pong(pong) => PingHandler::new(self).on_pong(pong, &inbound).await,
            Message::FindNode(request) => FindNodeHandler::new(self).handle(request, &inbound).await,
            Message::Neighbors(neighbors) => {
                NeighborsHandler::new(self).handle(neighbors, &inbound).await
            }
            Message::EnrRequest(request) => EnrHandler::new(self).on_request(request, &inbound).await,
            Message::EnrResponse(response) => {
                EnrHandler::new(self).on_response(response, &inbound).await
            }
        }
    }

    /// Serve `transport` until shutdown.
    ///
    /// Starts bootstrap followed by the maintenance tickers in the
    /// background, then reads datagrams and dispatches each inline so that
    /// one sender's packets are handled in arrival order.
    pub async fn run(&self, transport: Arc<UdpTransport>) -> Result<(), DiscoveryError> {
        info!(
            node_id = %self.local_id(),
            listen = %transport.local_addr()?,
            advertised = %self.local_address(),
            "discovery started"
        );

        let background = self.clone();
        self.spawn(async move {
            background.bootstrap().await;
            background.run_maintenance().await;
        });

        let mut shutdown = self.inner.shutdown.subscribe();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                received = transport.recv(&mut buf) => match received {
                    Ok((len, from)) => self.dispatch(&buf[..len], from).await,
                    Err(err) => warn!(reason = %err, "receive failed"),
                },
            }
        }
        debug!("receive loop stopped");
        Ok(())
    }
}
