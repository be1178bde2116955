//! # Discovery v4
//!
//! UDP node discovery for a peer-to-peer blockchain node: a Kademlia-style
//! table of peers ranked by distance, filled and kept fresh by iterative
//! lookups, where every piece of routing data must be backed by a
//! ping/pong exchange before it is trusted.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** identities, XOR distance, the bucketed `NodeDb`,
//!   challenge and lookup trackers. No I/O.
//! - **Codec:** the signed packet envelope, RLP payloads, node records.
//! - **Ports Layer:** traits the host implements (sender, clock, config,
//!   persistence) and the API it calls.
//! - **Handlers:** one per packet kind.
//! - **Service Layer:** dispatch, challenges, lookups, timers.
//! - **Adapters Layer:** UDP socket, system clock, TOML config, JSON store.
//!
//! ## Security
//!
//! - Packets are self-certifying: the sender identity is recovered from the
//!   signature, never read from the payload.
//! - Expired packets are dropped before any handler runs.
//! - An endpoint is stored as verified only after it answered our ping, and
//!   a stored endpoint only moves after the new one answered.
//! - FindNode is only answered for bonded peers; Neighbors only accepted in
//!   reply to our own FindNode.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use disc_v4::{adapters::{SystemTimeSource, UdpTransport}, DiscoveryConfig, DiscoveryService};
//!
//! let config = DiscoveryConfig::default();
//! let transport = Arc::new(UdpTransport::bind(listen, config.max_packet_size).await?);
//! let service = DiscoveryService::builder(key, advertised, config)
//!     .bootnodes(bootnodes)
//!     .build(transport.clone(), Arc::new(SystemTimeSource::new()))?;
//! service.run(transport).await?;
//! ```

pub mod adapters;
pub mod codec;
pub mod domain;
pub mod handlers;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types for convenience
pub use codec::{Enode, EnrRecord, Message};
pub use domain::{
    DiscoveryConfig, NodeAddress, NodeDb, NodeEntry, NodeId, NodeRecord, Penalty,
    PeerPenalization, Timestamp, VerifiedPeer,
};
pub use ports::{DiscoveryApi, MessageSender, NodeStore, TimeSource};
pub use service::{DiscoveryBuilder, DiscoveryError, DiscoveryService, PingOutcome};
