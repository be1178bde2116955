//! Outbound liveness checks: ping/pong challenges and ENR requests.

use tokio::time::timeout;
use tracing::{debug, trace};

use crate::codec::{EnrRequest, Message, Ping, PROTOCOL_VERSION};
use crate::domain::{
    ChallengeError, ChallengePurpose, FailOutcome, NodeAddress, NodeEntry, NodeId, Penalty, Reply,
};

use super::{DiscoveryError, DiscoveryService};

/// Result of a ping challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// A matching pong arrived in time. Carries the peer's record sequence.
    Alive { enr_seq: Option<u64> },
    /// No matching pong before the timeout; the challenge was removed.
    Timeout,
    /// A challenge for the same peer and purpose is already outstanding.
    AlreadyPending,
}

impl DiscoveryService {
    /// Ping `address`, expecting a pong signed by `node_id`.
    ///
    /// The pong handler applies the NodeDb update for `purpose` when the
    /// reply arrives; this only reports how the challenge ended.
    pub async fn ping_check(
        &self,
        node_id: NodeId,
        address: NodeAddress,
        purpose: ChallengePurpose,
    ) -> Result<PingOutcome, DiscoveryError> {
        let ping = Message::Ping(Ping {
            version: PROTOCOL_VERSION,
            from: self.local_address(),
            to: address,
            expiration: self.expiration(),
            enr_seq: Some(self.local_enr().seq()),
        });
        let packet = self.encode(&ping)?;

        // Register before sending so a fast pong finds its challenge.
        let reply = match self
            .challenges()
            .register(packet.hash, node_id, address, purpose)
        {
            Ok(rx) => rx,
            Err(ChallengeError::InProgress) => return Ok(PingOutcome::AlreadyPending),
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self.send_encoded(&packet, address.udp_addr()).await {
            self.challenges().cancel(&packet.hash);
            return Err(err);
        }
        trace!(node_id = %node_id.short(), to = %address, %purpose, "ping sent");

        match timeout(self.config().ping_timeout(), reply).await {
            Ok(Ok(Reply::Pong { enr_seq })) => Ok(PingOutcome::Alive { enr_seq }),
            Ok(Ok(Reply::Enr { .. })) => Ok(PingOutcome::Alive { enr_seq: None }),
            Ok(Err(_)) => Err(ChallengeError::Cancelled.into()),
            Err(_) => {
                if self.challenges().cancel(&packet.hash) {
                    debug!(node_id = %node_id.short(), to = %address, %purpose, "ping timed out");
                    Ok(PingOutcome::Timeout)
                } else {
                    // Matched between the timer firing and the cancel.
                    Ok(PingOutcome::Alive { enr_seq: None })
                }
            }
        }
    }

    /// Make sure `peer` is alive from our side, pinging it if needed.
    ///
    /// A peer that never answered is dropped from the table on timeout.
    pub(crate) async fn bond(&self, peer: NodeEntry) -> bool {
        if self.node_db().is_alive(&peer.node_id, self.now()) {
            return true;
        }
        match self
            .ping_check(peer.node_id, peer.address, ChallengePurpose::Bond)
            .await
        {
            Ok(PingOutcome::Alive { .. }) => true,
            Ok(PingOutcome::AlreadyPending) => false,
            Ok(PingOutcome::Timeout) => {
                if self
                    .node_db()
                    .get(&peer.node_id)
                    .is_some_and(|record| !record.was_verified())
                {
                    let _ = self.node_db().mark_unresponsive(&peer.node_id);
                }
                false
            }
            Err(err) => {
                debug!(node_id = %peer.node_id.short(), reason = %err, "bond failed");
                false
            }
        }
    }

    /// Give `peer` one ping timeout to ping us back when it has not done so
    /// recently, so that it has verified our endpoint before we query it.
    pub(crate) async fn await_remote_bond(&self, peer: &NodeEntry) {
        let now = self.now();
        let recent = self
            .node_db()
            .get(&peer.node_id)
            .and_then(|record| record.last_ping_received)
            .is_some_and(|at| now.since(at) < self.config().bond_expiration_secs);
        if !recent {
            tokio::time::sleep(self.config().ping_timeout()).await;
        }
    }

    pub(crate) fn spawn_bond(&self, peer: NodeEntry) {
        let service = self.clone();
        self.spawn(async move {
            service.bond(peer).await;
        });
    }

    /// Prove that `node_id` now answers at `proposed` before the table
    /// switches to it.
    pub(crate) fn spawn_endpoint_proof(&self, node_id: NodeId, proposed: NodeAddress) {
        let service = self.clone();
        self.spawn(async move {
            let outcome = service
                .ping_check(node_id, proposed, ChallengePurpose::EndpointProof)
                .await;
            trace!(node_id = %node_id.short(), to = %proposed, ?outcome, "endpoint proof finished");
        });
    }

    /// Ping a stored record on behalf of the revalidation timer.
    ///
    /// Unanswered pings count against the record; at the failure limit it is
    /// replaced from the bucket's queue.
    pub(crate) async fn revalidate_peer(&self, peer: NodeEntry) -> Result<PingOutcome, DiscoveryError> {
        let outcome = self
            .ping_check(peer.node_id, peer.address, ChallengePurpose::Revalidate)
            .await?;
        match outcome {
            PingOutcome::Alive { enr_seq } => self.maybe_request_enr(peer, enr_seq),
            PingOutcome::Timeout => {
                self.penalize(peer.node_id, Penalty::Timeout);
                match self.node_db().mark_unresponsive(&peer.node_id) {
                    Ok(FailOutcome::Retained { fail_count }) => {
                        debug!(node_id = %peer.node_id.short(), fail_count, "revalidation failed");
                    }
                    Ok(FailOutcome::Removed { promoted }) => {
                        debug!(
                            node_id = %peer.node_id.short(),
                            promoted = ?promoted.map(|r| r.node_id),
                            "dropped unresponsive node"
                        );
                    }
                    Err(_) => {}
                }
            }
            PingOutcome::AlreadyPending => {}
        }
        Ok(outcome)
    }

    /// Fetch the node record of `peer` when its advertised sequence is newer
    /// than the stored one.
    pub(crate) fn maybe_request_enr(&self, peer: NodeEntry, advertised_seq: Option<u64>) {
        let Some(seq) = advertised_seq else {
            return;
        };
        let stored = self
            .node_db()
            .get(&peer.node_id)
            .map(|record| (record.enr_seq, record.enr.is_some()));
        let wanted = match stored {
            Some((stored_seq, has_record)) => seq > stored_seq || !has_record,
            None => false,
        };
        if !wanted {
            return;
        }
        let service = self.clone();
        self.spawn(async move {
            if let Err(err) = service.request_enr(peer.node_id, peer.address).await {
                debug!(node_id = %peer.node_id.short(), reason = %err, "enr request failed");
            }
        });
    }

    /// Ask a peer for its node record. Returns the verified sequence number
    /// stored, or `None` on timeout.
    pub async fn request_enr(
        &self,
        node_id: NodeId,
        address: NodeAddress,
    ) -> Result<Option<u64>, DiscoveryError> {
        let request = Message::EnrRequest(EnrRequest {
            expiration: self.expiration(),
        });
        let packet = self.encode(&request)?;
        let reply = self
            .challenges()
            .register(packet.hash, node_id, address, ChallengePurpose::Enr)?;

        if let Err(err) = self.send_encoded(&packet, address.udp_addr()).await {
            self.challenges().cancel(&packet.hash);
            return Err(err);
        }

        match timeout(self.config().ping_timeout(), reply).await {
            Ok(Ok(Reply::Enr { seq, .. })) => Ok(Some(seq)),
            Ok(Ok(Reply::Pong { .. })) => Ok(None),
            Ok(Err(_)) => Err(ChallengeError::Cancelled.into()),
            Err(_) => {
                self.challenges().cancel(&packet.hash);
                Ok(None)
            }
        }
    }
}
