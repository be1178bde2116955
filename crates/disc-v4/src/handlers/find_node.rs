//! FindNode: answer bonded peers with the closest known nodes.

use tracing::{debug, trace, warn};

use crate::codec::{encode_neighbors, FindNode};
use crate::domain::{NodeAddress, NodeEntry};
use crate::service::DiscoveryService;

use super::Inbound;

pub struct FindNodeHandler<'a> {
    service: &'a DiscoveryService,
}

impl<'a> FindNodeHandler<'a> {
    pub fn new(service: &'a DiscoveryService) -> Self {
        Self { service }
    }

    /// Reply with up to `bucket_size` nodes closest to the target.
    ///
    /// Only a sender that answered our ping recently, from the endpoint we
    /// stored for it, gets an answer. Anyone else gets silence and, if we
    /// have never heard of them, a bond attempt.
    pub async fn handle(&self, request: FindNode, inbound: &Inbound) {
        let service = self.service;
        let now = service.now();
        let stored = service.node_db().get(&inbound.sender);

        let bonded = stored.as_ref().is_some_and(|record| {
            record.is_alive(now, service.config().bond_expiration_secs)
                && record.address.udp_addr() == inbound.from
        });
        if !bonded {
            debug!(
                from = %inbound.from,
                node_id = %inbound.sender.short(),
                "find_node from unbonded peer"
            );
            match stored {
                None => service.spawn_bond(NodeEntry::new(
                    inbound.sender,
                    NodeAddress::from_socket(inbound.from),
                )),
                Some(record) if record.address.udp_addr() == inbound.from => {
                    service.spawn_bond(NodeEntry::from(&record));
                }
                // A different endpoint has to prove itself through a ping of its own.
                Some(_) => {}
            }
            return;
        }

        let closest: Vec<NodeEntry> = service
            .node_db()
            .closest_excluding(&request.target, service.config().bucket_size, &inbound.sender)
            .iter()
            .map(NodeEntry::from)
            .collect();

        let packets = match encode_neighbors(
            &closest,
            service.expiration(),
            service.signing_key(),
            service.config().max_packet_size,
            service.config().max_neighbors_per_packet,
        ) {
            Ok(packets) => packets,
            Err(err) => {
                warn!(reason = %err, "failed to encode neighbors");
                return;
            }
        };

        trace!(
            to = %inbound.from,
            nodes = closest.len(),
            packets = packets.len(),
            "answering find_node"
        );
        for packet in &packets {
            if let Err(err) = service.send_encoded(packet, inbound.from).await {
                warn!(to = %inbound.from, reason = %err, "failed to send neighbors");
                return;
            }
        }
    }
}
