//! FindNode requests and the iterative lookup driver.

use std::collections::HashSet;

use rand::RngCore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace};

use crate::codec::{FindNode, Message};
use crate::domain::{compare_distance, NodeEntry, NodeId, NODE_ID_LEN};

use super::{DiscoveryError, DiscoveryService};

impl DiscoveryService {
    /// Ask `peer` for the nodes it knows closest to `target`.
    ///
    /// Collects Neighbors batches until the peer has sent `bucket_size`
    /// nodes, sends a packet shorter than a full one, or the FindNode
    /// timeout passes. The Neighbors handler has already stored every
    /// returned node as unverified.
    pub async fn find_node(&self, peer: NodeEntry, target: NodeId) -> Result<Vec<NodeEntry>, DiscoveryError> {
        let mut batches = self.lookups().register(peer.node_id)?;

        let request = Message::FindNode(FindNode {
            target,
            expiration: self.expiration(),
        });
        if let Err(err) = self.send(&request, peer.address.udp_addr()).await {
            self.lookups().finish(&peer.node_id);
            return Err(err);
        }

        let deadline = Instant::now() + self.config().find_node_timeout();
        let wanted = self.lookups().max_results();
        let per_packet = self.config().max_neighbors_per_packet;
        let mut found = Vec::new();

        while let Ok(Some(batch)) = timeout_at(deadline, batches.recv()).await {
            let last = batch.received < per_packet;
            found.extend(batch.nodes);
            if last || found.len() >= wanted {
                break;
            }
        }

        let elapsed = self.lookups().finish(&peer.node_id);
        trace!(
            peer = %peer.node_id.short(),
            found = found.len(),
            ?elapsed,
            "find_node finished"
        );
        Ok(found)
    }

    /// Iterative Kademlia lookup of the nodes closest to `target`.
    ///
    /// Each round queries up to `alpha` not yet asked nodes among the
    /// current `bucket_size` closest, bonding with them first and letting
    /// them bond back. The lookup ends when every one of the closest has
    /// been asked or after `max_lookup_rounds` rounds.
    pub async fn lookup(&self, target: NodeId) -> Vec<NodeEntry> {
        let k = self.config().bucket_size;
        let alpha = self.config().alpha.max(1);
        let target_hash = target.id_hash();
        let local = self.local_id();

        let mut seen: HashSet<NodeId> = HashSet::from([local]);
        let mut asked: HashSet<NodeId> = HashSet::new();
        let mut failed: HashSet<NodeId> = HashSet::new();
        let mut candidates: Vec<(NodeEntry, [u8; 32])> = self
            .node_db()
            .closest(&target, k)
            .iter()
            .map(NodeEntry::from)
            .filter(|entry| seen.insert(entry.node_id))
            .map(|entry| (entry, entry.node_id.id_hash()))
            .collect();

        for round in 0..self.config().max_lookup_rounds {
            if self.is_shutting_down() {
                break;
            }
            candidates.sort_by(|a, b| compare_distance(&target_hash, &a.1, &b.1));

            let batch: Vec<NodeEntry> = candidates
                .iter()
                .filter(|(entry, _)| !failed.contains(&entry.node_id))
                .take(k)
                .filter(|(entry, _)| !asked.contains(&entry.node_id))
                .take(alpha)
                .map(|(entry, _)| *entry)
                .collect();
            if batch.is_empty() {
                break;
            }

            let mut queries = JoinSet::new();
            for peer in batch {
                asked.insert(peer.node_id);
                let service = self.clone();
                queries.spawn(async move {
                    if !service.bond(peer).await {
                        return (peer.node_id, None);
                    }
                    service.await_remote_bond(&peer).await;
                    match service.find_node(peer, target).await {
                        Ok(found) => (peer.node_id, Some(found)),
                        Err(err) => {
                            debug!(peer = %peer.node_id.short(), reason = %err, "find_node failed");
                            (peer.node_id, None)
                        }
                    }
                });
            }

            let mut learned = 0usize;
            while let Some(joined) = queries.join_next().await {
                let Ok((peer, result)) = joined else {
                    continue;
                };
                match result {
                    Some(found) => {
                        for entry in found {
                            if seen.insert(entry.node_id) {
                                learned += 1;
                                candidates.push((entry, entry.node_id.id_hash()));
                            }
                        }
                    }
                    None => {
                        failed.insert(peer);
                    }
                }
            }
            trace!(round, learned, candidates = candidates.len(), "lookup round");
        }

        candidates.sort_by(|a, b| compare_distance(&target_hash, &a.1, &b.1));
        candidates
            .into_iter()
            .map(|(entry, _)| entry)
            .filter(|entry| !failed.contains(&entry.node_id))
            .take(k)
            .collect()
    }

    /// One table refresh: a lookup for our own id, then one for a random
    /// target.
    pub async fn refresh(&self) {
        let own = self.lookup(self.local_id()).await;

        let mut bytes = [0u8; NODE_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let random = self.lookup(NodeId::new(bytes)).await;

        let stats = self.stats();
        info!(
            self_lookup = own.len(),
            random_lookup = random.len(),
            nodes = stats.total,
            alive = stats.alive,
            buckets = stats.buckets_used,
            replacements = stats.replacements,
            "table refreshed"
        );
    }
}
