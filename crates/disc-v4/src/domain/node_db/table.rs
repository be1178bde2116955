//! The single-threaded node table.

use rand::Rng;

use crate::domain::{
    bucket_index, closest_first, log_distance, DiscoveryConfig, Hash32, Liveness, NodeAddress,
    NodeDbError, NodeId, NodeRecord, Timestamp,
};

use super::bucket::KBucket;

/// Result of offering a node to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// New record stored as unverified.
    Inserted,
    /// Known record with the same endpoint; sequence number refreshed.
    Updated,
    /// Known record claims a new endpoint. Nothing changed; the new endpoint
    /// must pass a liveness check before `mark_alive_at` switches to it.
    EndpointChangePending {
        current: NodeAddress,
        proposed: NodeAddress,
    },
    /// Bucket full; the node waits in the replacement queue.
    Queued,
    Rejected(NodeDbError),
}

/// What a failed liveness check did to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    Retained { fail_count: u32 },
    Removed { promoted: Option<NodeRecord> },
}

/// Aggregate counters for logs and the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeDbStats {
    pub total: usize,
    pub alive: usize,
    pub buckets_used: usize,
    pub replacements: usize,
}

/// Distance-bucketed table of known peers.
#[derive(Debug)]
pub struct NodeTable {
    local_id: NodeId,
    local_hash: Hash32,
    buckets: Vec<KBucket>,
    config: DiscoveryConfig,
}

impl NodeTable {
    pub fn new(local_id: NodeId, config: DiscoveryConfig) -> Self {
        let bucket_count = config.bucket_count.clamp(1, 256);
        Self {
            local_id,
            local_hash: local_id.id_hash(),
            buckets: (0..bucket_count).map(|_| KBucket::new()).collect(),
            config,
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn buckets(&self) -> &[KBucket] {
        &self.buckets
    }

    fn bucket_of(&self, node_id: &NodeId) -> usize {
        let dist = log_distance(&self.local_hash, &node_id.id_hash());
        bucket_index(dist, self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.buckets[self.bucket_of(node_id)].get(node_id).cloned()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.buckets[self.bucket_of(node_id)].get(node_id).is_some()
    }

    /// Offer a node seen on the wire or learned from a neighbor.
    pub fn upsert(
        &mut self,
        node_id: NodeId,
        address: NodeAddress,
        enr_seq: u64,
        now: Timestamp,
    ) -> Upsert {
        if node_id == self.local_id {
            return Upsert::Rejected(NodeDbError::SelfInsertion);
        }
        if !address.is_valid() {
            return Upsert::Rejected(NodeDbError::InvalidEndpoint);
        }

        let k = self.config.bucket_size;
        let max_replacements = self.config.max_replacements;
        let idx = self.bucket_of(&node_id);
        let bucket = &mut self.buckets[idx];

        if let Some(existing) = bucket.get_mut(&node_id) {
            if existing.address != address {
                return Upsert::EndpointChangePending {
                    current: existing.address,
                    proposed: address,
                };
            }
            existing.enr_seq = existing.enr_seq.max(enr_seq);
            return Upsert::Updated;
        }

        if !bucket.is_full(k) {
            bucket.replacements.retain(|r| r.node_id != node_id);
            bucket.entries.push(NodeRecord::new(node_id, address, enr_seq, now));
            return Upsert::Inserted;
        }

        if max_replacements == 0 {
            return Upsert::Rejected(NodeDbError::BucketFull);
        }
        let record = match bucket.replacement_mut(&node_id) {
            // Queued records move only after a proof, like stored ones.
            Some(queued) if queued.address != address => {
                return Upsert::EndpointChangePending {
                    current: queued.address,
                    proposed: address,
                };
            }
            Some(queued) => {
                queued.enr_seq = queued.enr_seq.max(enr_seq);
                queued.clone()
            }
            None => NodeRecord::new(node_id, address, enr_seq, now),
        };
        bucket.push_replacement(record, max_replacements);
        Upsert::Queued
    }

    /// Record a successful liveness check. Returns `true` when the node was not
    /// alive before (a newly verified peer).
    pub fn mark_alive(&mut self, node_id: &NodeId, now: Timestamp) -> Result<bool, NodeDbError> {
        self.apply_alive(node_id, None, now)
    }

    /// Liveness check against `address` succeeded: switch the record to it.
    pub fn mark_alive_at(
        &mut self,
        node_id: &NodeId,
        address: NodeAddress,
        now: Timestamp,
    ) -> Result<bool, NodeDbError> {
        self.apply_alive(node_id, Some(address), now)
    }

    fn apply_alive(
        &mut self,
        node_id: &NodeId,
        address: Option<NodeAddress>,
        now: Timestamp,
    ) -> Result<bool, NodeDbError> {
        let bond = self.config.bond_expiration_secs;
        let idx = self.bucket_of(node_id);
        let bucket = &mut self.buckets[idx];
        // A queued replacement may be bonded before it gets a slot.
        let record = if bucket.position(node_id).is_some() {
            bucket.get_mut(node_id)
        } else {
            bucket.replacement_mut(node_id)
        }
        .ok_or(NodeDbError::NodeNotFound)?;

        let newly_alive = !record.is_alive(now, bond);
        if let Some(address) = address {
            if !address.is_valid() {
                return Err(NodeDbError::InvalidEndpoint);
            }
            record.address = address;
        }
        record.last_verified = Some(now);
        record.liveness = Liveness::Alive;
        record.fail_count = 0;
        Ok(newly_alive)
    }

    /// Note an inbound ping from a stored node.
    pub fn mark_ping_received(&mut self, node_id: &NodeId, now: Timestamp) -> bool {
        let idx = self.bucket_of(node_id);
        match self.buckets[idx].get_mut(node_id) {
            Some(record) => {
                record.last_ping_received = Some(now);
                true
            }
            None => false,
        }
    }

    /// Record a failed liveness check. Drops the node after `max_fail_count`
    /// consecutive failures and promotes a queued replacement.
    pub fn mark_unresponsive(&mut self, node_id: &NodeId) -> Result<FailOutcome, NodeDbError> {
        let k = self.config.bucket_size;
        let max_fail = self.config.max_fail_count.max(1);
        let idx = self.bucket_of(node_id);
        let bucket = &mut self.buckets[idx];

        let record = bucket.get_mut(node_id).ok_or(NodeDbError::NodeNotFound)?;
        record.fail_count = record.fail_count.saturating_add(1);
        // A node that never answered has nothing to lose by being dropped early.
        let drop_now = record.fail_count >= max_fail || !record.was_verified();
        if !drop_now {
            record.liveness = Liveness::Unresponsive;
            return Ok(FailOutcome::Retained {
                fail_count: record.fail_count,
            });
        }

        bucket.remove(node_id);
        let promoted = bucket.promote_replacement(k);
        Ok(FailOutcome::Removed { promoted })
    }

    /// Store a verified node record and its sequence number.
    pub fn set_enr(&mut self, node_id: &NodeId, seq: u64, enr: Vec<u8>) -> Result<(), NodeDbError> {
        let idx = self.bucket_of(node_id);
        let record = self.buckets[idx]
            .get_mut(node_id)
            .ok_or(NodeDbError::NodeNotFound)?;
        if seq >= record.enr_seq {
            record.enr_seq = seq;
            record.enr = Some(enr);
        }
        Ok(())
    }

    /// Full buckets with a queued candidate hand out their least recently
    /// verified incumbent for a liveness check. At most one check per bucket
    /// is outstanding.
    pub fn evict_if_needed(&mut self) -> Vec<NodeRecord> {
        let k = self.config.bucket_size;
        let mut candidates = Vec::new();
        for bucket in &mut self.buckets {
            if bucket.replacements.is_empty() || bucket.has_eviction_check() {
                continue;
            }
            if !bucket.is_full(k) {
                bucket.promote_replacement(k);
                continue;
            }
            if let Some(incumbent) = bucket.least_recently_verified().cloned() {
                bucket.eviction_check = Some(incumbent.node_id);
                candidates.push(incumbent);
            }
        }
        candidates
    }

    /// Outcome of an eviction check handed out by `evict_if_needed`.
    ///
    /// Alive: the incumbent stays and the newest candidate is discarded.
    /// Dead: the incumbent is removed and the newest candidate takes its slot.
    /// Returns the promoted record, if any.
    pub fn resolve_eviction(
        &mut self,
        node_id: &NodeId,
        alive: bool,
        now: Timestamp,
    ) -> Result<Option<NodeRecord>, NodeDbError> {
        let k = self.config.bucket_size;
        let idx = self.bucket_of(node_id);
        let bucket = &mut self.buckets[idx];
        if bucket.eviction_check.as_ref() != Some(node_id) {
            return Err(NodeDbError::NodeNotFound);
        }
        bucket.eviction_check = None;

        if alive {
            if let Some(record) = bucket.get_mut(node_id) {
                record.last_verified = Some(now);
                record.liveness = Liveness::Alive;
                record.fail_count = 0;
            }
            bucket.replacements.pop_front();
            return Ok(None);
        }

        bucket.remove(node_id);
        Ok(bucket.promote_replacement(k))
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeRecord> {
        let idx = self.bucket_of(node_id);
        self.buckets[idx].remove(node_id)
    }

    /// Up to `k` stored records closest to `target`.
    pub fn closest(&self, target: &NodeId, k: usize) -> Vec<NodeRecord> {
        self.closest_matching(target, k, |_| true)
    }

    /// As `closest`, never including `exclude`.
    pub fn closest_excluding(&self, target: &NodeId, k: usize, exclude: &NodeId) -> Vec<NodeRecord> {
        self.closest_matching(target, k, |r| &r.node_id != exclude)
    }

    /// Closest records that are currently alive, excluding `exclude`.
    pub fn closest_verified(
        &self,
        target: &NodeId,
        k: usize,
        exclude: &NodeId,
        now: Timestamp,
    ) -> Vec<NodeRecord> {
        let bond = self.config.bond_expiration_secs;
        self.closest_matching(target, k, |r| &r.node_id != exclude && r.is_alive(now, bond))
    }

    fn closest_matching<F>(&self, target: &NodeId, k: usize, keep: F) -> Vec<NodeRecord>
    where
        F: Fn(&NodeRecord) -> bool,
    {
        let target_hash = target.id_hash();
        let candidates = self
            .buckets
            .iter()
            .flat_map(|b| b.entries.iter())
            .filter(|&r| keep(r))
            .map(|r| (r.node_id.id_hash(), r.clone()))
            .collect();
        closest_first(candidates, &target_hash, k)
    }

    /// Least recently verified record of a random non-empty bucket.
    pub fn revalidation_candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeRecord> {
        let non_empty: Vec<&KBucket> = self.buckets.iter().filter(|b| !b.is_empty()).collect();
        if non_empty.is_empty() {
            return None;
        }
        let bucket = non_empty[rng.gen_range(0..non_empty.len())];
        bucket.least_recently_verified().cloned()
    }

    pub fn stats(&self, now: Timestamp) -> NodeDbStats {
        let bond = self.config.bond_expiration_secs;
        NodeDbStats {
            total: self.len(),
            alive: self
                .buckets
                .iter()
                .flat_map(|b| b.entries.iter())
                .filter(|r| r.is_alive(now, bond))
                .count(),
            buckets_used: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            replacements: self.buckets.iter().map(|b| b.replacements.len()).sum(),
        }
    }

    /// Every stored record (not replacements).
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.buckets
            .iter()
            .flat_map(|b| b.entries.iter().cloned())
            .collect()
    }
}
