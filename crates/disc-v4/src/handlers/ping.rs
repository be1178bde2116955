//! Ping and Pong.

use tracing::{debug, trace, warn};

use crate::codec::{Message, Ping, Pong};
use crate::domain::{ChallengePurpose, NodeAddress, NodeDbError, NodeEntry, Reply, Upsert};
use crate::service::DiscoveryService;

use super::Inbound;

pub struct PingHandler<'a> {
    service: &'a DiscoveryService,
}

impl<'a> PingHandler<'a> {
    pub fn new(service: &'a DiscoveryService) -> Self {
        Self { service }
    }

    /// Answer a ping and start bonding with its sender.
    ///
    /// The reply echoes the ping hash and reports the endpoint we observed.
    /// The sender's claimed `from` endpoint is never stored: only the UDP
    /// source address is, and only as unverified until it answers our own
    /// ping.
    pub async fn on_ping(&self, ping: Ping, inbound: &Inbound) {
        let service = self.service;
        let local = service.local_address();
        if service.config().check_ping_recipient && ping.to.udp_port != local.udp_port {
            debug!(
                from = %inbound.from,
                to = %ping.to,
                "ping addressed to another endpoint"
            );
            return;
        }

        let observed = NodeAddress::new(inbound.from.ip(), inbound.from.port(), ping.from.tcp_port);
        let pong = Message::Pong(Pong {
            to: observed,
            ping_hash: inbound.hash,
            expiration: service.expiration(),
            enr_seq: Some(service.local_enr().seq()),
        });
        if let Err(err) = service.send(&pong, inbound.from).await {
            warn!(to = %inbound.from, reason = %err, "failed to send pong");
        }

        let now = service.now();
        let db = service.node_db();
        let peer = NodeEntry::new(inbound.sender, observed);
        if db.is_alive(&inbound.sender, now) {
            service.maybe_request_enr(peer, ping.enr_seq);
        }

        match db.upsert(inbound.sender, observed, ping.enr_seq.unwrap_or(0), now) {
            Upsert::Inserted => {
                trace!(node_id = %inbound.sender.short(), addr = %observed, "new node from ping");
                service.spawn_bond(peer);
            }
            Upsert::Updated => {
                if !db.is_alive(&inbound.sender, now) {
                    service.spawn_bond(peer);
                }
            }
            Upsert::EndpointChangePending { current, proposed } => {
                debug!(
                    node_id = %inbound.sender.short(),
                    %current,
                    %proposed,
                    "endpoint change needs proof"
                );
                service.spawn_endpoint_proof(inbound.sender, proposed);
            }
            Upsert::Queued => service.check_evictions(),
            Upsert::Rejected(err) => {
                trace!(node_id = %inbound.sender.short(), reason = %err, "ping sender not stored");
            }
        }
        db.mark_ping_received(&inbound.sender, now);
    }

    /// Match a pong against its challenge and apply what the challenge was
    /// for. A pong that matches nothing changes nothing.
    pub async fn on_pong(&self, pong: Pong, inbound: &Inbound) {
        let service = self.service;
        let reply = Reply::Pong {
            enr_seq: pong.enr_seq,
        };
        let Some(resolved) = service
            .challenges()
            .resolve(&pong.ping_hash, &inbound.sender, reply)
        else {
            trace!(from = %inbound.from, node_id = %inbound.sender.short(), "unsolicited pong");
            return;
        };

        let now = service.now();
        let db = service.node_db();
        let node_id = resolved.node_id;
        let applied = match resolved.purpose {
            ChallengePurpose::EndpointProof => db.mark_alive_at(&node_id, resolved.address, now),
            ChallengePurpose::EvictionCheck => db.resolve_eviction(&node_id, true, now).map(|_| false),
            ChallengePurpose::Bond | ChallengePurpose::Revalidate => match db.mark_alive(&node_id, now) {
                Err(NodeDbError::NodeNotFound) => {
                    // Bonded before it was stored, e.g. a lookup candidate that was evicted.
                    match db.upsert(node_id, resolved.address, pong.enr_seq.unwrap_or(0), now) {
                        Upsert::Rejected(err) => Err(err),
                        _ => db.mark_alive(&node_id, now),
                    }
                }
                other => other,
            },
            ChallengePurpose::Enr => Ok(false),
        };

        match applied {
            Ok(true) => service.emit_verified(node_id, resolved.address),
            Ok(false) => {}
            Err(err) => {
                debug!(node_id = %node_id.short(), purpose = %resolved.purpose, reason = %err, "pong not applied");
            }
        }
        service.maybe_request_enr(NodeEntry::new(node_id, resolved.address), pong.enr_seq);
    }
}
