//! Node records (EIP-778) under the "v4" identity scheme.
//!
//! `[signature, seq, k1, v1, k2, v2, ...]`, keys sorted and unique, signed
//! over `keccak256(rlp([seq, k1, v1, ...]))` with the node's secp256k1 key.

use std::net::IpAddr;

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rlp::{Rlp, RlpStream};

use crate::domain::{keccak256, NodeAddress, NodeId};

use super::crypto::{node_id_from_key, sign_recoverable};
use super::error::{DecodeError, EncodeError};
use super::message::{append_ip, decode_ip};

/// Largest encoded record accepted or produced.
pub const MAX_ENR_SIZE: usize = 300;

const ID_SCHEME: &[u8] = b"v4";

/// A signed node record. Only constructed by signing or by verified decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrRecord {
    seq: u64,
    /// Key and RLP-encoded value, sorted by key.
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
    raw: Vec<u8>,
}

impl EnrRecord {
    /// Build and sign the local record.
    pub fn build(key: &SigningKey, seq: u64, address: &NodeAddress) -> Result<Self, EncodeError> {
        let compressed = key.verifying_key().to_encoded_point(true);
        let (ip_key, tcp_key, udp_key): (&[u8], &[u8], &[u8]) = match address.ip {
            IpAddr::V4(_) => (b"ip", b"tcp", b"udp"),
            IpAddr::V6(_) => (b"ip6", b"tcp6", b"udp6"),
        };

        let mut ip_value = RlpStream::new();
        append_ip(&mut ip_value, address.ip);

        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"id".to_vec(), rlp::encode(&ID_SCHEME).to_vec()),
            (ip_key.to_vec(), ip_value.out().to_vec()),
            (
                b"secp256k1".to_vec(),
                rlp::encode(&compressed.as_bytes()).to_vec(),
            ),
            (tcp_key.to_vec(), rlp::encode(&address.tcp_port).to_vec()),
            (udp_key.to_vec(), rlp::encode(&address.udp_port).to_vec()),
        ];
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut content = RlpStream::new_list(1 + 2 * pairs.len());
        content.append(&seq);
        append_pairs(&mut content, &pairs);
        let signature = sign_recoverable(&keccak256(&content.out()), key)?;

        let mut record = RlpStream::new_list(2 + 2 * pairs.len());
        record.append(&&signature[..64]);
        record.append(&seq);
        append_pairs(&mut record, &pairs);
        let raw = record.out().to_vec();
        if raw.len() > MAX_ENR_SIZE {
            return Err(EncodeError::TooLarge {
                size: raw.len(),
                max: MAX_ENR_SIZE,
            });
        }

        Ok(Self { seq, pairs, raw })
    }

    /// Parse and verify a record received from the network.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() > MAX_ENR_SIZE {
            return Err(DecodeError::InvalidEnr("record too large"));
        }
        let rlp = Rlp::new(raw);
        if !rlp.is_list() {
            return Err(DecodeError::InvalidEnr("not a list"));
        }
        let count = rlp.item_count()?;
        if count < 2 || count % 2 != 0 {
            return Err(DecodeError::InvalidEnr("odd item count"));
        }

        let signature = rlp.at(0)?.data()?.to_vec();
        let seq: u64 = rlp.val_at(1)?;

        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity((count - 2) / 2);
        for i in (2..count).step_by(2) {
            let key = rlp.at(i)?.data()?.to_vec();
            if pairs.last().is_some_and(|(prev, _)| prev >= &key) {
                return Err(DecodeError::InvalidEnr("keys not sorted"));
            }
            pairs.push((key, rlp.at(i + 1)?.as_raw().to_vec()));
        }

        let record = Self {
            seq,
            pairs,
            raw: raw.to_vec(),
        };
        if record.value(b"id")? != Some(ID_SCHEME) {
            return Err(DecodeError::InvalidEnr("unsupported identity scheme"));
        }
        let public_key = record
            .public_key()
            .ok_or(DecodeError::InvalidEnr("missing or invalid secp256k1 key"))?;

        let mut content = RlpStream::new_list(count - 1);
        for i in 1..count {
            content.append_raw(rlp.at(i)?.as_raw(), 1);
        }
        let signature =
            Signature::from_slice(&signature).map_err(|_| DecodeError::InvalidEnr("signature"))?;
        public_key
            .verify_prehash(&keccak256(&content.out()), &signature)
            .map_err(|_| DecodeError::InvalidEnr("signature"))?;

        Ok(record)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Raw string value stored under `key`, if present.
    fn value(&self, key: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
        match self.pairs.iter().find(|(k, _)| k == key) {
            Some((_, value)) => Ok(Some(Rlp::new(value).data()?)),
            None => Ok(None),
        }
    }

    fn public_key(&self) -> Option<VerifyingKey> {
        let bytes = self.value(b"secp256k1").ok()??;
        VerifyingKey::from_sec1_bytes(bytes).ok()
    }

    /// Identity the record was signed by.
    pub fn node_id(&self) -> Option<NodeId> {
        self.public_key().map(|key| node_id_from_key(&key))
    }

    /// IPv4 endpoint advertised in the record, falling back to IPv6.
    pub fn address(&self) -> Option<NodeAddress> {
        self.endpoint(b"ip", b"udp", b"tcp")
            .or_else(|| self.endpoint(b"ip6", b"udp6", b"tcp6"))
    }

    fn endpoint(&self, ip: &[u8], udp: &[u8], tcp: &[u8]) -> Option<NodeAddress> {
        let ip = decode_ip(self.value(ip).ok()??).ok()?;
        let udp = self.port(udp)?;
        let tcp = self.port(tcp).unwrap_or(udp);
        Some(NodeAddress::new(ip, udp, tcp))
    }

    fn port(&self, key: &[u8]) -> Option<u16> {
        let (_, value) = self.pairs.iter().find(|(k, _)| k == key)?;
        Rlp::new(value).as_val().ok()
    }
}

fn append_pairs(stream: &mut RlpStream, pairs: &[(Vec<u8>, Vec<u8>)]) {
    for (key, value) in pairs {
        stream.append(&&key[..]);
        stream.append_raw(value, 1);
    }
}
