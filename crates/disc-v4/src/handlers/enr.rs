//! ENRRequest and ENRResponse.

use tracing::{debug, trace, warn};

use crate::codec::{EnrRecord, EnrRequest, EnrResponse, Message};
use crate::domain::{Penalty, Reply};
use crate::service::DiscoveryService;

use super::Inbound;

pub struct EnrHandler<'a> {
    service: &'a DiscoveryService,
}

impl<'a> EnrHandler<'a> {
    pub fn new(service: &'a DiscoveryService) -> Self {
        Self { service }
    }

    /// Send our node record to a bonded peer.
    pub async fn on_request(&self, _request: EnrRequest, inbound: &Inbound) {
        let service = self.service;
        let now = service.now();
        let bonded = service.node_db().get(&inbound.sender).is_some_and(|record| {
            record.is_alive(now, service.config().bond_expiration_secs)
                && record.address.udp_addr() == inbound.from
        });
        if !bonded {
            debug!(from = %inbound.from, node_id = %inbound.sender.short(), "enr request from unbonded peer");
            return;
        }

        let response = Message::EnrResponse(EnrResponse {
            request_hash: inbound.hash,
            record: service.local_enr().as_bytes().to_vec(),
        });
        if let Err(err) = service.send(&response, inbound.from).await {
            warn!(to = %inbound.from, reason = %err, "failed to send enr response");
        }
    }

    /// Verify a record we asked for and store it.
    ///
    /// The record must carry a valid signature by the responder's own key.
    pub async fn on_response(&self, response: EnrResponse, inbound: &Inbound) {
        let service = self.service;
        let record = match EnrRecord::decode(&response.record) {
            Ok(record) => record,
            Err(err) => {
                debug!(node_id = %inbound.sender.short(), reason = %err, "invalid node record");
                service.penalize(inbound.sender, Penalty::BadData);
                return;
            }
        };
        if record.node_id() != Some(inbound.sender) {
            debug!(node_id = %inbound.sender.short(), "node record signed by another key");
            service.penalize(inbound.sender, Penalty::ProtocolViolation);
            return;
        }

        let seq = record.seq();
        let raw = record.into_bytes();
        let reply = Reply::Enr {
            seq,
            record: raw.clone(),
        };
        if service
            .challenges()
            .resolve(&response.request_hash, &inbound.sender, reply)
            .is_none()
        {
            trace!(from = %inbound.from, "unsolicited enr response");
            return;
        }

        match service.node_db().set_enr(&inbound.sender, seq, raw) {
            Ok(()) => trace!(node_id = %inbound.sender.short(), seq, "node record stored"),
            Err(err) => debug!(node_id = %inbound.sender.short(), reason = %err, "node record not stored"),
        }
    }
}
