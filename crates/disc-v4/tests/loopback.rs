//! Discovery over real UDP sockets on the loopback interface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::SigningKey;
use tokio::sync::broadcast;
use tokio::time::timeout;

use disc_v4::adapters::{SystemTimeSource, UdpTransport};
use disc_v4::{
    DiscoveryApi, DiscoveryConfig, DiscoveryService, Enode, NodeAddress, NodeId, VerifiedPeer,
};

const WAIT: Duration = Duration::from_secs(10);

struct Node {
    service: DiscoveryService,
    verified: broadcast::Receiver<VerifiedPeer>,
}

impl Node {
    async fn start(seed: u8, bootnodes: Vec<Enode>) -> Self {
        let config = DiscoveryConfig {
            ping_timeout_ms: 500,
            find_node_timeout_ms: 1_000,
            ..DiscoveryConfig::default()
        };
        let listen = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let transport = Arc::new(
            UdpTransport::bind(listen, config.max_packet_size)
                .await
                .unwrap(),
        );
        let bound = transport.local_addr().unwrap();

        let service = DiscoveryService::builder(
            SigningKey::from_slice(&[seed; 32]).unwrap(),
            NodeAddress::from_socket(bound),
            config,
        )
        .bootnodes(bootnodes)
        .build(transport.clone(), Arc::new(SystemTimeSource::new()))
        .unwrap();
        let verified = service.subscribe_verified();

        tokio::spawn({
            let service = service.clone();
            async move { service.run(transport).await }
        });
        Self { service, verified }
    }

    fn enode(&self) -> Enode {
        Enode {
            node_id: self.service.local_id(),
            address: self.service.local_address(),
        }
    }

    async fn wait_verified(&mut self, peer: NodeId) {
        timeout(WAIT, async {
            loop {
                if self.verified.recv().await.unwrap().node_id == peer {
                    return;
                }
            }
        })
        .await
        .expect("peer never verified");
    }
}

async fn eventually(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn test_bootnode_and_joiner_verify_each_other() {
    let mut boot = Node::start(1, Vec::new()).await;
    let mut joiner = Node::start(2, vec![boot.enode()]).await;

    joiner.wait_verified(boot.service.local_id()).await;
    boot.wait_verified(joiner.service.local_id()).await;

    assert!(joiner.service.stats().alive >= 1);
    assert!(boot
        .service
        .node_db()
        .get(&joiner.service.local_id())
        .is_some());

    boot.service.shutdown();
    joiner.service.shutdown();
}

#[tokio::test]
async fn test_third_node_learns_second_through_bootnode() {
    let mut boot = Node::start(11, Vec::new()).await;
    let mut second = Node::start(12, vec![boot.enode()]).await;
    second.wait_verified(boot.service.local_id()).await;
    boot.wait_verified(second.service.local_id()).await;

    // The joiner's bootstrap lookup asks the bootnode for its own id.
    let third = Node::start(13, vec![boot.enode()]).await;
    let target = second.service.local_id();
    eventually(|| third.service.node_db().contains(&target)).await;

    let found = third.service.closest(&target, 1);
    assert_eq!(found[0].address, second.service.local_address());

    for node in [&boot, &second, &third] {
        node.service.shutdown();
    }
}

#[tokio::test]
async fn test_node_record_is_served_to_bonded_peer() {
    let mut boot = Node::start(21, Vec::new()).await;
    let mut joiner = Node::start(22, vec![boot.enode()]).await;
    joiner.wait_verified(boot.service.local_id()).await;
    boot.wait_verified(joiner.service.local_id()).await;

    // Let any record fetch started by the pongs run out first.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let seq = joiner
        .service
        .request_enr(boot.service.local_id(), boot.service.local_address())
        .await
        .unwrap();
    assert_eq!(seq, Some(boot.service.local_enr().seq()));

    let stored = joiner
        .service
        .node_db()
        .get(&boot.service.local_id())
        .unwrap();
    assert_eq!(stored.enr.as_deref(), Some(boot.service.local_enr().as_bytes()));

    boot.service.shutdown();
    joiner.service.shutdown();
}
