//! K-bucket: up to K records at one distance range, plus queued replacements.

use std::collections::VecDeque;

use crate::domain::{NodeId, NodeRecord};

/// A k-bucket storing up to K records and a bounded replacement queue.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    pub(crate) entries: Vec<NodeRecord>,
    /// Candidates waiting for a slot, most recently seen first.
    pub(crate) replacements: VecDeque<NodeRecord>,
    /// Incumbent currently being liveness-checked for eviction.
    pub(crate) eviction_check: Option<NodeId>,
}

impl KBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self, k: usize) -> bool {
        self.entries.len() >= k
    }

    pub fn entries(&self) -> &[NodeRecord] {
        &self.entries
    }

    pub fn replacements(&self) -> impl Iterator<Item = &NodeRecord> {
        self.replacements.iter()
    }

    pub fn has_eviction_check(&self) -> bool {
        self.eviction_check.is_some()
    }

    /// Least recently verified incumbent; never-verified entries come first,
    /// then the oldest insertion.
    pub fn least_recently_verified(&self) -> Option<&NodeRecord> {
        self.entries
            .iter()
            .min_by_key(|r| (r.last_verified, r.added_at))
    }

    pub(crate) fn position(&self, node_id: &NodeId) -> Option<usize> {
        self.entries.iter().position(|r| &r.node_id == node_id)
    }

    pub(crate) fn get(&self, node_id: &NodeId) -> Option<&NodeRecord> {
        self.entries.iter().find(|r| &r.node_id == node_id)
    }

    pub(crate) fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeRecord> {
        self.entries.iter_mut().find(|r| &r.node_id == node_id)
    }

    pub(crate) fn replacement_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeRecord> {
        self.replacements.iter_mut().find(|r| &r.node_id == node_id)
    }

    pub(crate) fn remove(&mut self, node_id: &NodeId) -> Option<NodeRecord> {
        if self.eviction_check.as_ref() == Some(node_id) {
            self.eviction_check = None;
        }
        self.position(node_id).map(|pos| self.entries.remove(pos))
    }

    /// Queue a candidate at the front, dropping the oldest beyond `max`.
    pub(crate) fn push_replacement(&mut self, record: NodeRecord, max: usize) {
        if max == 0 {
            return;
        }
        self.replacements.retain(|r| r.node_id != record.node_id);
        self.replacements.push_front(record);
        self.replacements.truncate(max);
    }

    /// Move the most recent replacement into the bucket if there is room.
    pub(crate) fn promote_replacement(&mut self, k: usize) -> Option<NodeRecord> {
        if self.is_full(k) {
            return None;
        }
        let record = self.replacements.pop_front()?;
        self.entries.push(record.clone());
        Some(record)
    }
}
