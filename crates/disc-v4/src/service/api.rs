use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{NodeDbStats, NodeEntry, NodeId, NodeRecord, VerifiedPeer};
use crate::ports::DiscoveryApi;
use crate::service::DiscoveryService;

#[async_trait]
impl DiscoveryApi for DiscoveryService {
    async fn lookup(&self, target: NodeId) -> Vec<NodeEntry> {
        DiscoveryService::lookup(self, target).await
    }

    fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeRecord> {
        self.node_db().closest(target, count)
    }

    fn subscribe_verified(&self) -> broadcast::Receiver<VerifiedPeer> {
        DiscoveryService::subscribe_verified(self)
    }

    fn stats(&self) -> NodeDbStats {
        DiscoveryService::stats(self)
    }
}
