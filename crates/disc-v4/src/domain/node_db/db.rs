//! Shared, internally synchronized handle over [`NodeTable`].

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::domain::{DiscoveryConfig, NodeAddress, NodeDbError, NodeId, NodeRecord, Timestamp};

use super::table::{FailOutcome, NodeDbStats, NodeTable, Upsert};

/// Cloneable handle to the node table.
///
/// Every method takes the lock for the duration of one table operation and
/// returns owned data, so no caller can hold the lock across an `.await`.
#[derive(Debug, Clone)]
pub struct NodeDb {
    inner: Arc<Mutex<NodeTable>>,
}

impl NodeDb {
    pub fn new(local_id: NodeId, config: DiscoveryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NodeTable::new(local_id, config))),
        }
    }

    pub fn local_id(&self) -> NodeId {
        *self.inner.lock().local_id()
    }

    pub fn upsert(&self, node_id: NodeId, address: NodeAddress, seq: u64, now: Timestamp) -> Upsert {
        self.inner.lock().upsert(node_id, address, seq, now)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.inner.lock().get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.inner.lock().contains(node_id)
    }

    pub fn closest(&self, target: &NodeId, k: usize) -> Vec<NodeRecord> {
        self.inner.lock().closest(target, k)
    }

    pub fn closest_excluding(&self, target: &NodeId, k: usize, exclude: &NodeId) -> Vec<NodeRecord> {
        self.inner.lock().closest_excluding(target, k, exclude)
    }

    pub fn closest_verified(
        &self,
        target: &NodeId,
        k: usize,
        exclude: &NodeId,
        now: Timestamp,
    ) -> Vec<NodeRecord> {
        self.inner.lock().closest_verified(target, k, exclude, now)
    }

    /// Whether `node_id` answered one of our pings within the bond window.
    pub fn is_alive(&self, node_id: &NodeId, now: Timestamp) -> bool {
        let table = self.inner.lock();
        let bond = table.config().bond_expiration_secs;
        table
            .get(node_id)
            .is_some_and(|record| record.is_alive(now, bond))
    }

    pub fn mark_alive(&self, node_id: &NodeId, now: Timestamp) -> Result<bool, NodeDbError> {
        self.inner.lock().mark_alive(node_id, now)
    }

    pub fn mark_alive_at(
        &self,
        node_id: &NodeId,
        address: NodeAddress,
        now: Timestamp,
    ) -> Result<bool, NodeDbError> {
        self.inner.lock().mark_alive_at(node_id, address, now)
    }

    pub fn mark_ping_received(&self, node_id: &NodeId, now: Timestamp) -> bool {
        self.inner.lock().mark_ping_received(node_id, now)
    }

    pub fn mark_unresponsive(&self, node_id: &NodeId) -> Result<FailOutcome, NodeDbError> {
        self.inner.lock().mark_unresponsive(node_id)
    }

    pub fn set_enr(&self, node_id: &NodeId, seq: u64, enr: Vec<u8>) -> Result<(), NodeDbError> {
        self.inner.lock().set_enr(node_id, seq, enr)
    }

    pub fn evict_if_needed(&self) -> Vec<NodeRecord> {
        self.inner.lock().evict_if_needed()
    }

    pub fn resolve_eviction(
        &self,
        node_id: &NodeId,
        alive: bool,
        now: Timestamp,
    ) -> Result<Option<NodeRecord>, NodeDbError> {
        self.inner.lock().resolve_eviction(node_id, alive, now)
    }

    pub fn revalidation_candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeRecord> {
        self.inner.lock().revalidation_candidate(rng)
    }

    pub fn remove(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.inner.lock().remove(node_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self, now: Timestamp) -> NodeDbStats {
        self.inner.lock().stats(now)
    }

    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.inner.lock().snapshot()
    }

    /// Insert previously persisted records as unverified entries.
    ///
    /// Liveness is not carried over: every seeded node must answer a fresh ping.
    pub fn seed(&self, records: Vec<NodeRecord>, now: Timestamp) -> usize {
        let mut table = self.inner.lock();
        records
            .into_iter()
            .filter(|r| {
                matches!(
                    table.upsert(r.node_id, r.address, r.enr_seq, now),
                    Upsert::Inserted
                )
            })
            .count()
    }
}
