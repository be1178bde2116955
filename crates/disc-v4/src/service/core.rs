use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::codec::{encode, local_node_id, Enode, EncodedPacket, EnrRecord, Message};
use crate::domain::{
    DiscoveryConfig, NodeAddress, NodeDb, NodeDbStats, NodeEntry, NodeId, Penalty,
    PeerPenalization, PendingChallenges, PendingLookups, Timestamp, VerifiedPeer,
};
use crate::ports::{MessageSender, NodeStore, TimeSource};

use super::DiscoveryError;

/// Sequence number of the record built at startup.
const LOCAL_ENR_SEQ: u64 = 1;

/// Discovery v4 service.
///
/// Cheap to clone: every clone drives the same node table, challenge
/// trackers and socket. Handlers and spawned tasks hold clones.
///
/// # Example
///
/// ```rust,ignore
/// let transport = Arc::new(UdpTransport::bind(listen, config.max_packet_size).await?);
/// let service = DiscoveryService::builder(key, advertised, config)
///     .bootnodes(bootnodes)
///     .build(transport.clone(), Arc::new(SystemTimeSource::new()))?;
/// let mut verified = service.subscribe_verified();
/// tokio::spawn({
///     let service = service.clone();
///     async move { service.run(transport).await }
/// });
/// ```
#[derive(Clone)]
pub struct DiscoveryService {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) local: NodeEntry,
    pub(crate) key: SigningKey,
    pub(crate) config: DiscoveryConfig,
    pub(crate) local_enr: EnrRecord,
    pub(crate) db: NodeDb,
    pub(crate) challenges: PendingChallenges,
    pub(crate) lookups: PendingLookups,
    /// Cleared on shutdown so the socket closes once `run` returns.
    pub(crate) sender: RwLock<Option<Arc<dyn MessageSender>>>,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) bootnodes: Vec<Enode>,
    pub(crate) store: Option<Arc<dyn NodeStore>>,
    pub(crate) verified_tx: broadcast::Sender<VerifiedPeer>,
    pub(crate) penalty_tx: Option<mpsc::Sender<PeerPenalization>>,
    pub(crate) shutdown: watch::Sender<bool>,
}

/// Collects the optional collaborators before the service is shared.
pub struct DiscoveryBuilder {
    key: SigningKey,
    advertised: NodeAddress,
    config: DiscoveryConfig,
    bootnodes: Vec<Enode>,
    store: Option<Arc<dyn NodeStore>>,
    penalty_tx: Option<mpsc::Sender<PeerPenalization>>,
}

impl DiscoveryBuilder {
    pub fn bootnodes(mut self, bootnodes: Vec<Enode>) -> Self {
        self.bootnodes = bootnodes;
        self
    }

    /// Persist the node table to `store` on shutdown and reload it on build.
    pub fn node_store(mut self, store: Arc<dyn NodeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Channel receiving peer penalizations for the sync layer.
    pub fn penalty_sink(mut self, tx: mpsc::Sender<PeerPenalization>) -> Self {
        self.penalty_tx = Some(tx);
        self
    }

    pub fn build(
        self,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<DiscoveryService, DiscoveryError> {
        let node_id = local_node_id(&self.key);
        let local_enr = EnrRecord::build(&self.key, LOCAL_ENR_SEQ, &self.advertised)?;
        let db = NodeDb::new(node_id, self.config.clone());

        if let Some(store) = &self.store {
            let records = store.load()?;
            let seeded = db.seed(records, clock.now());
            debug!(seeded, "seeded node table from store");
        }

        let (verified_tx, _) = broadcast::channel(self.config.event_channel_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        Ok(DiscoveryService {
            inner: Arc::new(Inner {
                local: NodeEntry::new(node_id, self.advertised),
                lookups: PendingLookups::new(self.config.bucket_size),
                key: self.key,
                config: self.config,
                local_enr,
                db,
                challenges: PendingChallenges::new(),
                sender: RwLock::new(Some(sender)),
                clock,
                bootnodes: self.bootnodes,
                store: self.store,
                verified_tx,
                penalty_tx: self.penalty_tx,
                shutdown,
            }),
        })
    }
}

impl DiscoveryService {
    /// Start building a service for the identity `key`, advertising
    /// `advertised` as its endpoint.
    pub fn builder(key: SigningKey, advertised: NodeAddress, config: DiscoveryConfig) -> DiscoveryBuilder {
        DiscoveryBuilder {
            key,
            advertised,
            config,
            bootnodes: Vec::new(),
            store: None,
            penalty_tx: None,
        }
    }

    /// Build a service with no bootnodes, store or penalty sink.
    pub fn new(
        key: SigningKey,
        advertised: NodeAddress,
        config: DiscoveryConfig,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, DiscoveryError> {
        Self::builder(key, advertised, config).build(sender, clock)
    }

    pub fn local_id(&self) -> NodeId {
        self.inner.local.node_id
    }

    pub fn local_address(&self) -> NodeAddress {
        self.inner.local.address
    }

    pub fn local_enr(&self) -> &EnrRecord {
        &self.inner.local_enr
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner.key
    }

    pub fn bootnodes(&self) -> &[Enode] {
        &self.inner.bootnodes
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    pub fn node_db(&self) -> &NodeDb {
        &self.inner.db
    }

    pub fn challenges(&self) -> &PendingChallenges {
        &self.inner.challenges
    }

    pub(crate) fn lookups(&self) -> &PendingLookups {
        &self.inner.lookups
    }

    pub fn stats(&self) -> NodeDbStats {
        self.inner.db.stats(self.now())
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Absolute expiry stamped into outbound packets.
    pub(crate) fn expiration(&self) -> u64 {
        self.now()
            .add_secs(self.inner.config.packet_expiration_secs)
            .as_secs()
    }

    pub(crate) fn encode(&self, message: &Message) -> Result<EncodedPacket, DiscoveryError> {
        Ok(encode(message, &self.inner.key)?)
    }

    pub(crate) async fn send_encoded(&self, packet: &EncodedPacket, to: SocketAddr) -> Result<(), DiscoveryError> {
        let sender = self
            .inner
            .sender
            .read()
            .clone()
            .ok_or(DiscoveryError::ShuttingDown)?;
        sender.send_packet(&packet.bytes, to).await?;
        Ok(())
    }

    /// Encode, sign and send. Returns the packet hash.
    pub(crate) async fn send(&self, message: &Message, to: SocketAddr) -> Result<[u8; 32], DiscoveryError> {
        let packet = self.encode(message)?;
        self.send_encoded(&packet, to).await?;
        Ok(packet.hash)
    }

    /// Stream of peers that just proved liveness.
    pub fn subscribe_verified(&self) -> broadcast::Receiver<VerifiedPeer> {
        self.inner.verified_tx.subscribe()
    }

    pub(crate) fn emit_verified(&self, node_id: NodeId, address: NodeAddress) {
        info!(node_id = %node_id.short(), addr = %address, "peer verified");
        // No subscribers is fine.
        let _ = self.inner.verified_tx.send(VerifiedPeer { node_id, address });
    }

    /// Report `peer` to the sync layer. Never blocks; a full channel drops
    /// the signal.
    pub(crate) fn penalize(&self, peer: NodeId, penalty: Penalty) {
        let Some(tx) = &self.inner.penalty_tx else {
            return;
        };
        let penalization = PeerPenalization::new(penalty, peer);
        debug!(%penalization, "penalizing peer");
        if let Err(err) = tx.try_send(penalization) {
            warn!(reason = %err, "penalization dropped");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Run `task` in the background until it finishes or shutdown begins.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return;
        }
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = task => {}
                _ = stopped(&mut shutdown) => {}
            }
        });
    }

    /// Stop every task and release the sender so the socket closes once
    /// `run` returns. Outstanding challenges are dropped and the table saved.
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        self.inner.challenges.clear();
        self.inner.lookups.clear();
        self.inner.sender.write().take();

        if let Some(store) = &self.inner.store {
            let records = self.inner.db.snapshot();
            match store.save(&records) {
                Ok(()) => info!(records = records.len(), "node table saved"),
                Err(err) => warn!(reason = %err, "failed to save node table"),
            }
        }
        info!("discovery stopped");
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("local", &self.inner.local)
            .field("nodes", &self.inner.db.len())
            .finish()
    }
}

/// Resolves once shutdown has been signalled. The watch guard is dropped
/// before this returns, so callers may await freely afterwards.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}
