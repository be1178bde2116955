//! Kademlia distance calculations on `keccak256(NodeId)`.

use std::cmp::Ordering;

use crate::domain::Hash32;

/// Bitwise XOR of two identifier hashes.
pub fn xor_distance(a: &Hash32, b: &Hash32) -> Hash32 {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a[i] ^ b[i];
    }
    out
}

/// Logarithmic distance: index (1..=256) of the highest differing bit, 0 when equal.
pub fn log_distance(a: &Hash32, b: &Hash32) -> u16 {
    for i in 0..32 {
        let xor = a[i] ^ b[i];
        if xor != 0 {
            let leading = (i as u16) * 8 + xor.leading_zeros() as u16;
            return 256 - leading;
        }
    }
    0
}

/// Orders `a` and `b` by XOR distance to `target` (closest first).
pub fn compare_distance(target: &Hash32, a: &Hash32, b: &Hash32) -> Ordering {
    for i in 0..32 {
        let da = a[i] ^ target[i];
        let db = b[i] ^ target[i];
        if da != db {
            return da.cmp(&db);
        }
    }
    Ordering::Equal
}

/// Maps a log distance onto one of `bucket_count` buckets.
///
/// The last bucket holds the farthest half of the key space; distances at or
/// below `257 - bucket_count` all land in bucket 0.
pub fn bucket_index(log_dist: u16, bucket_count: usize) -> usize {
    let bucket_count = bucket_count.clamp(1, 256);
    let min_distance = (256 - bucket_count) as u16;
    if log_dist <= min_distance {
        0
    } else {
        (log_dist - min_distance - 1) as usize
    }
}
