//! Tests for distance and ordering helpers.

use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr};

use super::*;
use crate::domain::{Hash32, NodeAddress, NodeId, NodeRecord, Timestamp};

fn hash_with_first_byte(b: u8) -> Hash32 {
    let mut h = [0u8; 32];
    h[0] = b;
    h
}

fn record(seed: u8) -> NodeRecord {
    NodeRecord::new(
        NodeId::new([seed; 64]),
        NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, seed)), 30303, 30303),
        0,
        Timestamp::new(1),
    )
}

#[test]
fn test_log_distance_of_equal_hashes_is_zero() {
    let a = [0x5a; 32];
    assert_eq!(log_distance(&a, &a), 0);
}

#[test]
fn test_log_distance_uses_highest_differing_bit() {
    let zero = [0u8; 32];
    assert_eq!(log_distance(&zero, &hash_with_first_byte(0x80)), 256);
    assert_eq!(log_distance(&zero, &hash_with_first_byte(0x01)), 249);

    let mut low = [0u8; 32];
    low[31] = 0x01;
    assert_eq!(log_distance(&zero, &low), 1);
}

#[test]
fn test_log_distance_is_symmetric() {
    let a = hash_with_first_byte(0x13);
    let b = hash_with_first_byte(0x70);
    assert_eq!(log_distance(&a, &b), log_distance(&b, &a));
    assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
}

#[test]
fn test_compare_distance_orders_by_xor() {
    let target = [0u8; 32];
    let near = hash_with_first_byte(0x01);
    let far = hash_with_first_byte(0x80);
    assert_eq!(compare_distance(&target, &near, &far), Ordering::Less);
    assert_eq!(compare_distance(&target, &far, &near), Ordering::Greater);
    assert_eq!(compare_distance(&target, &near, &near), Ordering::Equal);
}

#[test]
fn test_bucket_index_compresses_near_distances() {
    // 17 buckets: distances 0..=239 share bucket 0, 256 lands in bucket 16.
    assert_eq!(bucket_index(0, 17), 0);
    assert_eq!(bucket_index(239, 17), 0);
    assert_eq!(bucket_index(240, 17), 0);
    assert_eq!(bucket_index(241, 17), 1);
    assert_eq!(bucket_index(256, 17), 16);

    // 256 buckets: one per distance.
    assert_eq!(bucket_index(1, 256), 0);
    assert_eq!(bucket_index(256, 256), 255);
}

#[test]
fn test_closest_first_truncates_and_orders() {
    let target = record(1).node_id.id_hash();
    let candidates: Vec<_> = (1..=20u8)
        .map(|i| {
            let r = record(i);
            (r.node_id.id_hash(), r)
        })
        .collect();

    let closest = closest_first(candidates, &target, 5);
    assert_eq!(closest.len(), 5);
    assert_eq!(closest[0].node_id, record(1).node_id);
    for pair in closest.windows(2) {
        assert_ne!(
            compare_distance(&target, &pair[0].node_id.id_hash(), &pair[1].node_id.id_hash()),
            Ordering::Greater
        );
    }
}

#[test]
fn test_sort_by_distance_keeps_all_records() {
    let target = [0u8; 32];
    let sorted = sort_by_distance((1..=6u8).map(record).collect(), &target);
    assert_eq!(sorted.len(), 6);
    for pair in sorted.windows(2) {
        assert_ne!(
            compare_distance(&target, &pair[0].node_id.id_hash(), &pair[1].node_id.id_hash()),
            Ordering::Greater
        );
    }
}
