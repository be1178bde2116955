//! # Driving Port (Inbound API)
//!
//! What the host process calls on a running discovery service.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{NodeDbStats, NodeEntry, NodeId, NodeRecord, VerifiedPeer};

/// Public API of the discovery subsystem.
///
/// # Example
///
/// ```rust,ignore
/// use disc_v4::ports::DiscoveryApi;
///
/// async fn find(api: &impl DiscoveryApi, target: NodeId) {
///     let found = api.lookup(target).await;
///     println!("found {} nodes", found.len());
/// }
/// ```
#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    /// Iterative lookup of the nodes closest to `target`.
    async fn lookup(&self, target: NodeId) -> Vec<NodeEntry>;

    /// Closest stored records to `target`, without network traffic.
    fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeRecord>;

    /// Stream of peers that just proved liveness.
    fn subscribe_verified(&self) -> broadcast::Receiver<VerifiedPeer>;

    fn stats(&self) -> NodeDbStats;
}
