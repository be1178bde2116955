//! Neighbors: replies to our own FindNode requests.

use tracing::{debug, trace};

use crate::codec::Neighbors;
use crate::domain::{NeighborBatch, NodeEntry, Penalty, Upsert};
use crate::service::DiscoveryService;

use super::Inbound;

pub struct NeighborsHandler<'a> {
    service: &'a DiscoveryService,
}

impl<'a> NeighborsHandler<'a> {
    pub fn new(service: &'a DiscoveryService) -> Self {
        Self { service }
    }

    /// Store advertised nodes as unverified and pass them to the lookup
    /// waiting on this sender.
    ///
    /// Neighbors nobody asked for, or more nodes than one request allows,
    /// are dropped and the sender penalized.
    pub async fn handle(&self, neighbors: Neighbors, inbound: &Inbound) {
        let service = self.service;
        let Some(results) = service
            .lookups()
            .accept(&inbound.sender, neighbors.nodes.len())
        else {
            debug!(
                from = %inbound.from,
                node_id = %inbound.sender.short(),
                nodes = neighbors.nodes.len(),
                "unsolicited neighbors"
            );
            service.penalize(inbound.sender, Penalty::ProtocolViolation);
            return;
        };

        let received = neighbors.nodes.len();
        let now = service.now();
        let local = service.local_id();
        let db = service.node_db();
        let mut usable: Vec<NodeEntry> = Vec::with_capacity(received);
        let mut queued = false;
        for entry in neighbors.nodes {
            if entry.node_id == local || !entry.address.is_valid() {
                continue;
            }
            // Third-party claims never move a stored endpoint.
            match db.upsert(entry.node_id, entry.address, 0, now) {
                Upsert::Rejected(_) => continue,
                Upsert::EndpointChangePending { current, .. } => {
                    usable.push(NodeEntry::new(entry.node_id, current));
                }
                Upsert::Queued => {
                    queued = true;
                    usable.push(entry);
                }
                Upsert::Inserted | Upsert::Updated => usable.push(entry),
            }
        }
        if queued {
            service.check_evictions();
        }

        trace!(from = %inbound.from, nodes = usable.len(), "neighbors accepted");
        // The lookup may have given up already.
        let _ = results.try_send(NeighborBatch {
            nodes: usable,
            received,
        });
    }
}
