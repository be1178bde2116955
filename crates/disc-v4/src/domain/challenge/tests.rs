//! Tests for challenge and lookup correlation.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::*;
use crate::domain::{ChallengeError, NodeAddress, NodeEntry, NodeId};

fn peer(n: u8) -> NodeId {
    NodeId::new([n; 64])
}

fn addr(n: u8) -> NodeAddress {
    NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 30303, 30303)
}

fn pong() -> Reply {
    Reply::Pong { enr_seq: None }
}

// =============================================================================
// PendingChallenges
// =============================================================================

#[tokio::test]
async fn test_matching_reply_resolves_once() {
    let challenges = PendingChallenges::new();
    let rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();

    let resolved = challenges.resolve(&[1; 32], &peer(1), pong()).unwrap();
    assert_eq!(resolved.node_id, peer(1));
    assert_eq!(resolved.purpose, ChallengePurpose::Bond);
    assert_eq!(rx.await.unwrap(), pong());

    // Second pong with the same echo is discarded.
    assert!(challenges.resolve(&[1; 32], &peer(1), pong()).is_none());
    assert!(challenges.is_empty());
}

#[test]
fn test_one_challenge_per_peer_and_purpose() {
    let challenges = PendingChallenges::new();
    let _rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();

    assert_eq!(
        challenges
            .register([2; 32], peer(1), addr(1), ChallengePurpose::Bond)
            .unwrap_err(),
        ChallengeError::InProgress
    );
    // A different purpose may run concurrently.
    assert!(challenges
        .register([3; 32], peer(1), addr(1), ChallengePurpose::Enr)
        .is_ok());
}

#[test]
fn test_tokens_are_unique() {
    let challenges = PendingChallenges::new();
    let _rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();
    assert_eq!(
        challenges
            .register([1; 32], peer(2), addr(2), ChallengePurpose::Bond)
            .unwrap_err(),
        ChallengeError::DuplicateToken
    );
}

#[test]
fn test_reply_from_other_identity_is_ignored() {
    let challenges = PendingChallenges::new();
    let _rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();

    assert!(challenges.resolve(&[1; 32], &peer(2), pong()).is_none());
    assert!(challenges.is_pending(&peer(1), ChallengePurpose::Bond));
}

#[test]
fn test_reply_kind_must_match_purpose() {
    let challenges = PendingChallenges::new();
    let _rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Enr)
        .unwrap();

    assert!(challenges.resolve(&[1; 32], &peer(1), pong()).is_none());
    let enr = Reply::Enr {
        seq: 2,
        record: vec![0xc0],
    };
    assert!(challenges.resolve(&[1; 32], &peer(1), enr).is_some());
}

#[test]
fn test_cancelled_challenge_cannot_be_matched() {
    let challenges = PendingChallenges::new();
    let _rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Revalidate)
        .unwrap();

    assert!(challenges.cancel(&[1; 32]));
    assert!(!challenges.cancel(&[1; 32]));
    assert!(challenges.resolve(&[1; 32], &peer(1), pong()).is_none());
    assert!(!challenges.is_pending(&peer(1), ChallengePurpose::Revalidate));
}

#[tokio::test(start_paused = true)]
async fn test_expire_removes_only_stale() {
    let challenges = PendingChallenges::new();
    let _old = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();
    tokio::time::advance(Duration::from_millis(500)).await;
    let _new = challenges
        .register([2; 32], peer(2), addr(2), ChallengePurpose::Bond)
        .unwrap();

    let expired = challenges.expire(Duration::from_millis(300));
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].node_id, peer(1));
    assert_eq!(challenges.len(), 1);
}

#[tokio::test]
async fn test_clear_wakes_waiters() {
    let challenges = PendingChallenges::new();
    let rx = challenges
        .register([1; 32], peer(1), addr(1), ChallengePurpose::Bond)
        .unwrap();
    challenges.clear();
    assert!(rx.await.is_err());
    assert!(challenges.is_empty());
}

// =============================================================================
// PendingLookups
// =============================================================================

#[tokio::test]
async fn test_lookup_accepts_solicited_neighbors() {
    let lookups = PendingLookups::new(3);
    let mut rx = lookups.register(peer(1)).unwrap();

    let tx = lookups.accept(&peer(1), 2).unwrap();
    tx.send(NeighborBatch {
        nodes: vec![NodeEntry::new(peer(5), addr(5))],
        received: 2,
    })
    .await
    .unwrap();
    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.nodes.len(), 1);
    assert_eq!(batch.received, 2);

    assert!(lookups.finish(&peer(1)).is_some());
    assert!(!lookups.is_pending(&peer(1)));
}

#[test]
fn test_lookup_rejects_unsolicited_and_oversized() {
    let lookups = PendingLookups::new(3);
    assert!(lookups.accept(&peer(1), 1).is_none());

    let _rx = lookups.register(peer(1)).unwrap();
    assert!(lookups.accept(&peer(1), 2).is_some());
    assert!(lookups.accept(&peer(1), 2).is_none());
    assert!(lookups.accept(&peer(1), 1).is_some());
    assert_eq!(
        lookups.register(peer(1)).unwrap_err(),
        ChallengeError::InProgress
    );
}
