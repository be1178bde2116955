//! Distance ordering helpers.

use crate::domain::{compare_distance, Hash32, NodeRecord};

/// Sort records by ascending distance to `target`, most recently verified first on ties.
pub fn sort_by_distance(records: Vec<NodeRecord>, target: &Hash32) -> Vec<NodeRecord> {
    let count = records.len();
    let keyed = records.into_iter().map(|r| (r.node_id.id_hash(), r)).collect();
    closest_first(keyed, target, count)
}

/// The `k` records closest to `target`, in order.
///
/// Partitions around the k-th element before sorting so that only the
/// selected prefix is fully ordered.
pub fn closest_first(mut candidates: Vec<(Hash32, NodeRecord)>, target: &Hash32, k: usize) -> Vec<NodeRecord> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }
    let cmp = |a: &(Hash32, NodeRecord), b: &(Hash32, NodeRecord)| {
        compare_distance(target, &a.0, &b.0).then_with(|| b.1.last_verified.cmp(&a.1.last_verified))
    };
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, cmp);
        candidates.truncate(k);
    }
    candidates.sort_by(cmp);
    candidates.into_iter().map(|(_, record)| record).collect()
}
