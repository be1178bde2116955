//! # Packet Handlers
//!
//! One handler per packet kind. The service's dispatch decodes and
//! authenticates a datagram, then hands the message plus its [`Inbound`]
//! context to the matching handler.
//!
//! Handlers never wait on a challenge themselves: anything that needs a
//! liveness proof first (bonding, endpoint changes, evictions) is spawned so
//! the receive loop keeps draining the socket.

mod enr;
mod find_node;
mod neighbors;
mod ping;

pub use enr::EnrHandler;
pub use find_node::FindNodeHandler;
pub use neighbors::NeighborsHandler;
pub use ping::PingHandler;

use std::net::SocketAddr;

use crate::domain::{Hash32, NodeId};

/// Authenticated origin of an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    /// Identity recovered from the packet signature.
    pub sender: NodeId,
    /// Envelope hash, echoed by Pong and ENRResponse.
    pub hash: Hash32,
    /// Observed UDP source endpoint.
    pub from: SocketAddr,
}

#[cfg(test)]
mod tests;
