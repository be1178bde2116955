//! Table upkeep: bootstrap, revalidation and ping-before-evict.

use tracing::{debug, info, warn};

use crate::domain::{ChallengePurpose, NodeEntry, NodeRecord, Penalty, Upsert};

use super::core::stopped;
use super::{DiscoveryService, PingOutcome};

/// Outstanding challenges older than this many ping timeouts are dropped by
/// the revalidation tick.
const STALE_CHALLENGE_FACTOR: u32 = 4;

impl DiscoveryService {
    /// Insert the bootnodes, bond with them and look up our own id.
    ///
    /// Bootnodes go through the same endpoint proof as any other peer.
    pub async fn bootstrap(&self) {
        let now = self.now();
        let mut bonds = Vec::new();
        for enode in self.bootnodes() {
            match self
                .node_db()
                .upsert(enode.node_id, enode.address, 0, now)
            {
                Upsert::Rejected(err) => {
                    warn!(bootnode = %enode, reason = %err, "bootnode rejected");
                }
                _ => bonds.push(NodeEntry::from(*enode)),
            }
        }

        let bonded = bond_all(self, bonds).await;
        info!(
            bootnodes = self.bootnodes().len(),
            bonded,
            "bootstrap pings finished"
        );

        let found = self.lookup(self.local_id()).await;
        info!(found = found.len(), nodes = self.node_db().len(), "bootstrap lookup finished");
    }

    /// Ping the least recently verified record of a random bucket.
    pub async fn revalidate(&self) {
        let stale = self
            .challenges()
            .expire(self.config().ping_timeout() * STALE_CHALLENGE_FACTOR);
        if !stale.is_empty() {
            debug!(count = stale.len(), "dropped stale challenges");
        }

        let candidate = self
            .node_db()
            .revalidation_candidate(&mut rand::thread_rng());
        if let Some(record) = candidate {
            let peer = NodeEntry::from(&record);
            if let Err(err) = self.revalidate_peer(peer).await {
                debug!(node_id = %peer.node_id.short(), reason = %err, "revalidation skipped");
            }
        }

        self.check_evictions();
    }

    /// Start a liveness check for every full bucket with queued replacements.
    pub fn check_evictions(&self) {
        for incumbent in self.node_db().evict_if_needed() {
            let service = self.clone();
            self.spawn(async move {
                service.eviction_check(incumbent).await;
            });
        }
    }

    async fn eviction_check(&self, incumbent: NodeRecord) {
        let node_id = incumbent.node_id;
        let outcome = self
            .ping_check(node_id, incumbent.address, ChallengePurpose::EvictionCheck)
            .await;
        let now = self.now();
        let resolved = match outcome {
            // The pong handler already kept the incumbent.
            Ok(PingOutcome::Alive { .. }) | Ok(PingOutcome::AlreadyPending) => return,
            Ok(PingOutcome::Timeout) => {
                self.penalize(node_id, Penalty::Timeout);
                self.node_db().resolve_eviction(&node_id, false, now)
            }
            Err(err) => {
                // Could not check; keep the incumbent.
                debug!(node_id = %node_id.short(), reason = %err, "eviction check failed");
                self.node_db().resolve_eviction(&node_id, true, now)
            }
        };

        if let Ok(Some(promoted)) = resolved {
            debug!(
                evicted = %node_id.short(),
                promoted = %promoted.node_id.short(),
                "replaced unresponsive node"
            );
            self.spawn_bond(NodeEntry::from(&promoted));
        }
    }

    /// Tick loop for refresh and revalidation. Returns on shutdown.
    pub(crate) async fn run_maintenance(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut refresh = tokio::time::interval(self.config().refresh_interval());
        let mut revalidate = tokio::time::interval(self.config().revalidate_interval());
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        revalidate.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Both fire immediately; bootstrap already covers the first round.
        refresh.tick().await;
        revalidate.tick().await;

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = refresh.tick() => self.refresh().await,
                _ = revalidate.tick() => self.revalidate().await,
            }
        }
        debug!("maintenance loop stopped");
    }
}

/// Bond with every peer concurrently. Returns how many answered.
async fn bond_all(service: &DiscoveryService, peers: Vec<NodeEntry>) -> usize {
    let mut bonds = tokio::task::JoinSet::new();
    for peer in peers {
        let service = service.clone();
        bonds.spawn(async move { service.bond(peer).await });
    }
    let mut bonded = 0;
    while let Some(result) = bonds.join_next().await {
        if matches!(result, Ok(true)) {
            bonded += 1;
        }
    }
    bonded
}
