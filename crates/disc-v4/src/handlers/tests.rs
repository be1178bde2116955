use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use tokio::sync::mpsc;

use super::*;
use crate::codec::{
    local_node_id, EnrRecord, EnrRequest, EnrResponse, Message, Neighbors, Ping, PROTOCOL_VERSION,
};
use crate::domain::{
    log_distance, DiscoveryConfig, NodeAddress, NodeEntry, NodeId, Penalty, PeerPenalization,
    Timestamp,
};
use crate::service::DiscoveryService;
use crate::test_utils::{FixedTimeSource, RecordingSender};

const NOW: u64 = 1_700_000_000;

fn now() -> Timestamp {
    Timestamp::new(NOW)
}

fn local_address() -> NodeAddress {
    NodeAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 30303, 30303)
}

fn peer(seed: u8) -> (SigningKey, NodeEntry) {
    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    let port = 40_000 + u16::from(seed);
    let address = NodeAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port, port);
    let id = local_node_id(&key);
    (key, NodeEntry::new(id, address))
}

fn setup() -> (
    DiscoveryService,
    Arc<RecordingSender>,
    mpsc::Receiver<PeerPenalization>,
) {
    let sender = Arc::new(RecordingSender::new());
    let (tx, rx) = mpsc::channel(8);
    let service = DiscoveryService::builder(
        SigningKey::from_slice(&[0x42; 32]).unwrap(),
        local_address(),
        DiscoveryConfig::for_testing(),
    )
    .penalty_sink(tx)
    .build(sender.clone(), Arc::new(FixedTimeSource::new(NOW)))
    .unwrap();
    (service, sender, rx)
}

fn inbound(from: &NodeEntry) -> Inbound {
    Inbound {
        sender: from.node_id,
        hash: [0xab; 32],
        from: from.address.udp_addr(),
    }
}

fn bond(service: &DiscoveryService, entry: &NodeEntry) {
    service
        .node_db()
        .upsert(entry.node_id, entry.address, 0, now());
    service.node_db().mark_alive(&entry.node_id, now()).unwrap();
}

// =============================================================================
// ENR
// =============================================================================

#[tokio::test]
async fn test_enr_request_from_bonded_peer_gets_local_record() {
    let (service, sender, _) = setup();
    let (_, requester) = peer(1);
    bond(&service, &requester);
    let inbound = inbound(&requester);

    EnrHandler::new(&service)
        .on_request(EnrRequest { expiration: NOW + 20 }, &inbound)
        .await;

    let (packet, to) = sender.next_decoded(now()).await.unwrap();
    assert_eq!(to, requester.address.udp_addr());
    match packet.message {
        Message::EnrResponse(response) => {
            assert_eq!(response.request_hash, inbound.hash);
            let record = EnrRecord::decode(&response.record).unwrap();
            assert_eq!(record.node_id(), Some(service.local_id()));
            assert_eq!(record.address(), Some(local_address()));
        }
        other => panic!("expected enr response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_enr_request_from_stranger_is_ignored() {
    let (service, sender, _) = setup();
    let (_, stranger) = peer(1);

    EnrHandler::new(&service)
        .on_request(EnrRequest { expiration: NOW + 20 }, &inbound(&stranger))
        .await;

    assert_eq!(sender.sent_count(), 0);
}

#[tokio::test]
async fn test_malformed_enr_response_is_bad_data() {
    let (service, _, mut penalties) = setup();
    let (_, responder) = peer(1);
    bond(&service, &responder);

    let response = EnrResponse {
        request_hash: [1; 32],
        record: vec![0xc0],
    };
    EnrHandler::new(&service)
        .on_response(response, &inbound(&responder))
        .await;

    assert_eq!(
        penalties.try_recv().unwrap(),
        PeerPenalization::new(Penalty::BadData, responder.node_id)
    );
}

#[tokio::test]
async fn test_unrequested_enr_response_is_not_stored() {
    let (service, _, mut penalties) = setup();
    let (key, responder) = peer(1);
    bond(&service, &responder);

    let record = EnrRecord::build(&key, 9, &responder.address).unwrap();
    let response = EnrResponse {
        request_hash: [1; 32],
        record: record.into_bytes(),
    };
    EnrHandler::new(&service)
        .on_response(response, &inbound(&responder))
        .await;

    let stored = service.node_db().get(&responder.node_id).unwrap();
    assert_eq!(stored.enr_seq, 0);
    assert!(stored.enr.is_none());
    assert!(penalties.try_recv().is_err());
}

// =============================================================================
// Neighbors
// =============================================================================

#[tokio::test]
async fn test_neighbors_keep_stored_endpoint() {
    let (service, _, _) = setup();
    let (_, queried) = peer(1);
    let (_, known) = peer(2);
    bond(&service, &queried);
    bond(&service, &known);
    let mut results = service.lookups().register(queried.node_id).unwrap();

    let claimed = NodeEntry::new(
        known.node_id,
        NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)), 1234, 1234),
    );
    NeighborsHandler::new(&service)
        .handle(
            Neighbors {
                nodes: vec![claimed],
                expiration: NOW + 20,
            },
            &inbound(&queried),
        )
        .await;

    assert_eq!(results.recv().await.unwrap().nodes, vec![known]);
    assert_eq!(
        service.node_db().get(&known.node_id).unwrap().address,
        known.address
    );
}

#[tokio::test]
async fn test_neighbors_skip_self_and_unusable_endpoints() {
    let (service, _, _) = setup();
    let (_, queried) = peer(1);
    let (_, fresh) = peer(2);
    let (_, zero_port) = peer(3);
    let mut results = service.lookups().register(queried.node_id).unwrap();

    let nodes = vec![
        NodeEntry::new(service.local_id(), local_address()),
        NodeEntry::new(
            zero_port.node_id,
            NodeAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, 0),
        ),
        fresh,
    ];
    NeighborsHandler::new(&service)
        .handle(
            Neighbors {
                nodes,
                expiration: NOW + 20,
            },
            &inbound(&queried),
        )
        .await;

    let batch = results.recv().await.unwrap();
    assert_eq!(batch.nodes, vec![fresh]);
    assert_eq!(batch.received, 3);
    assert!(service.node_db().get(&zero_port.node_id).is_none());
    assert!(service.node_db().contains(&fresh.node_id));
}

#[tokio::test]
async fn test_neighbors_beyond_request_limit_are_rejected() {
    let (service, _, mut penalties) = setup();
    let (_, queried) = peer(1);
    let _results = service.lookups().register(queried.node_id).unwrap();
    let limit = service.config().bucket_size;

    let nodes: Vec<NodeEntry> = (10..10 + limit as u8 + 1).map(|seed| peer(seed).1).collect();
    NeighborsHandler::new(&service)
        .handle(
            Neighbors {
                nodes: nodes.clone(),
                expiration: NOW + 20,
            },
            &inbound(&queried),
        )
        .await;

    assert!(nodes.iter().all(|n| !service.node_db().contains(&n.node_id)));
    assert_eq!(
        penalties.try_recv().unwrap(),
        PeerPenalization::new(Penalty::ProtocolViolation, queried.node_id)
    );
}

/// Peers sharing the farthest bucket from `service`.
fn far_peers(service: &DiscoveryService, n: usize) -> Vec<NodeEntry> {
    let local = service.local_id().id_hash();
    (1..=u8::MAX)
        .filter(|seed| *seed != 0x42)
        .map(|seed| peer(seed).1)
        .filter(|entry| log_distance(&local, &entry.node_id.id_hash()) == 256)
        .take(n)
        .collect()
}

#[tokio::test]
async fn test_queued_neighbor_starts_eviction_check() {
    let (service, sender, _) = setup();
    let far = far_peers(&service, 5);
    let incumbents = &far[..3];
    for entry in incumbents {
        bond(&service, entry);
    }
    let queried = far[3];
    let candidate = far[4];
    let _results = service.lookups().register(queried.node_id).unwrap();

    NeighborsHandler::new(&service)
        .handle(
            Neighbors {
                nodes: vec![candidate],
                expiration: NOW + 20,
            },
            &inbound(&queried),
        )
        .await;

    assert!(!service.node_db().contains(&candidate.node_id));
    let (packet, to) = sender.next_decoded(now()).await.unwrap();
    assert!(matches!(packet.message, Message::Ping(_)));
    assert!(incumbents.iter().any(|entry| entry.address.udp_addr() == to));
}

// =============================================================================
// Ping / FindNode
// =============================================================================

fn ping_from(entry: &NodeEntry, enr_seq: Option<u64>) -> Ping {
    Ping {
        version: PROTOCOL_VERSION,
        from: entry.address,
        to: local_address(),
        expiration: NOW + 20,
        enr_seq,
    }
}

#[tokio::test]
async fn test_ping_with_newer_seq_from_bonded_peer_requests_record() {
    let (service, sender, _) = setup();
    let (_, pinger) = peer(1);
    bond(&service, &pinger);

    PingHandler::new(&service)
        .on_ping(ping_from(&pinger, Some(5)), &inbound(&pinger))
        .await;

    let (pong, _) = sender.next_decoded(now()).await.unwrap();
    assert!(matches!(pong.message, Message::Pong(_)));
    let (request, to) = sender.next_decoded(now()).await.unwrap();
    assert!(matches!(request.message, Message::EnrRequest(_)));
    assert_eq!(to, pinger.address.udp_addr());
}

#[tokio::test]
async fn test_ping_reports_observed_endpoint() {
    let (service, sender, _) = setup();
    let (_, pinger) = peer(1);
    let mut claimed = pinger.address;
    claimed.ip = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1));
    claimed.udp_port = 9;

    let mut ping = ping_from(&pinger, None);
    ping.from = claimed;
    PingHandler::new(&service)
        .on_ping(ping, &inbound(&pinger))
        .await;

    let (pong, to) = sender.next_decoded(now()).await.unwrap();
    assert_eq!(to, pinger.address.udp_addr());
    let Message::Pong(pong) = pong.message else {
        panic!("expected pong");
    };
    assert_eq!(pong.to.udp_addr(), pinger.address.udp_addr());
    assert_eq!(
        service.node_db().get(&pinger.node_id).unwrap().address.udp_addr(),
        pinger.address.udp_addr()
    );
}

#[tokio::test]
async fn test_find_node_from_known_but_lapsed_peer_triggers_bond() {
    let (service, sender, _) = setup();
    let (_, requester) = peer(1);
    service
        .node_db()
        .upsert(requester.node_id, requester.address, 0, now());

    FindNodeHandler::new(&service)
        .handle(
            crate::codec::FindNode {
                target: NodeId::new([1; 64]),
                expiration: NOW + 20,
            },
            &inbound(&requester),
        )
        .await;

    let (packet, to) = sender.next_decoded(now()).await.unwrap();
    assert!(matches!(packet.message, Message::Ping(_)));
    assert_eq!(to, requester.address.udp_addr());
}

#[tokio::test]
async fn test_empty_table_still_answers_with_one_packet() {
    let (service, sender, _) = setup();
    let (_, requester) = peer(1);
    bond(&service, &requester);

    FindNodeHandler::new(&service)
        .handle(
            crate::codec::FindNode {
                target: NodeId::new([1; 64]),
                expiration: NOW + 20,
            },
            &inbound(&requester),
        )
        .await;

    let (packet, _) = sender.next_decoded(now()).await.unwrap();
    assert_eq!(
        packet.message,
        Message::Neighbors(Neighbors {
            nodes: Vec::new(),
            expiration: NOW + 20,
        })
    );
    assert_eq!(sender.sent_count(), 1);
}

#[test]
fn test_inbound_is_copy() {
    let from: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let a = Inbound {
        sender: NodeId::new([3; 64]),
        hash: [0; 32],
        from,
    };
    let b = a;
    assert_eq!(a, b);
}
