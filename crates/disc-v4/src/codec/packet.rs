//! Packet envelope: `hash || signature || packet_type || payload`.

use k256::ecdsa::SigningKey;

use crate::domain::{keccak256, Hash32, NodeEntry, NodeId, Timestamp};

use super::crypto::{recover_node_id, sign_recoverable, SIGNATURE_LEN};
use super::error::{DecodeError, EncodeError};
use super::message::{Message, Neighbors, PacketType};

pub const HASH_LEN: usize = 32;
/// Offset of the packet type byte.
pub const HEADER_LEN: usize = HASH_LEN + SIGNATURE_LEN;
/// Largest datagram accepted on receive.
pub const MAX_PACKET_SIZE: usize = 1280;

/// Signed wire bytes plus the envelope hash (the packet's reply token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub bytes: Vec<u8>,
    pub hash: Hash32,
}

/// An authenticated packet whose payload has not been decoded yet.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub hash: Hash32,
    pub sender: NodeId,
    pub packet_type: u8,
    pub payload: &'a [u8],
}

/// A fully decoded and unexpired packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub message: Message,
    pub sender: NodeId,
    pub hash: Hash32,
}

/// Sign and frame a message.
pub fn encode(message: &Message, key: &SigningKey) -> Result<EncodedPacket, EncodeError> {
    let payload = message.encode_payload();
    let mut bytes = vec![0u8; HEADER_LEN];
    bytes.reserve(1 + payload.len());
    bytes.push(message.packet_type().as_byte());
    bytes.extend_from_slice(&payload);

    let signature = sign_recoverable(&keccak256(&bytes[HEADER_LEN..]), key)?;
    bytes[HASH_LEN..HEADER_LEN].copy_from_slice(&signature);

    let hash = keccak256(&bytes[HASH_LEN..]);
    bytes[..HASH_LEN].copy_from_slice(&hash);
    Ok(EncodedPacket { bytes, hash })
}

/// Check framing, hash and signature. The payload is left untouched.
pub fn open_envelope(raw: &[u8]) -> Result<Envelope<'_>, DecodeError> {
    if raw.len() < HEADER_LEN + 1 {
        return Err(DecodeError::TooShort { len: raw.len() });
    }
    if raw.len() > MAX_PACKET_SIZE {
        return Err(DecodeError::TooLarge { len: raw.len() });
    }

    let hash = keccak256(&raw[HASH_LEN..]);
    if hash[..] != raw[..HASH_LEN] {
        return Err(DecodeError::HashMismatch);
    }

    let signed = &raw[HEADER_LEN..];
    let sender = recover_node_id(&raw[HASH_LEN..HEADER_LEN], &keccak256(signed))?;

    Ok(Envelope {
        hash,
        sender,
        packet_type: signed[0],
        payload: &signed[1..],
    })
}

impl Envelope<'_> {
    /// Decode the payload and reject it if already expired.
    pub fn message(&self, now: Timestamp) -> Result<Message, DecodeError> {
        let packet_type = PacketType::try_from(self.packet_type)?;
        let message = Message::decode_payload(packet_type, self.payload)?;
        if let Some(expiration) = message.expiration() {
            if expiration < now.as_secs() {
                return Err(DecodeError::Expired {
                    expiration,
                    now: now.as_secs(),
                });
            }
        }
        Ok(message)
    }
}

/// Verify and decode a datagram.
pub fn decode(raw: &[u8], now: Timestamp) -> Result<DecodedPacket, DecodeError> {
    let envelope = open_envelope(raw)?;
    Ok(DecodedPacket {
        message: envelope.message(now)?,
        sender: envelope.sender,
        hash: envelope.hash,
    })
}

/// Split a FindNode answer into Neighbors packets of at most `max_count`
/// entries and `max_packet_size` bytes each. An empty answer is still one
/// (empty) packet so the requester does not wait out its timeout.
pub fn encode_neighbors(
    nodes: &[NodeEntry],
    expiration: u64,
    key: &SigningKey,
    max_packet_size: usize,
    max_count: usize,
) -> Result<Vec<EncodedPacket>, EncodeError> {
    let mut packets = Vec::new();
    if nodes.is_empty() {
        encode_chunk(&[], expiration, key, max_packet_size, &mut packets)?;
        return Ok(packets);
    }
    for chunk in nodes.chunks(max_count.max(1)) {
        encode_chunk(chunk, expiration, key, max_packet_size, &mut packets)?;
    }
    Ok(packets)
}

fn encode_chunk(
    chunk: &[NodeEntry],
    expiration: u64,
    key: &SigningKey,
    max_packet_size: usize,
    out: &mut Vec<EncodedPacket>,
) -> Result<(), EncodeError> {
    let message = Message::Neighbors(Neighbors {
        nodes: chunk.to_vec(),
        expiration,
    });
    let packet = encode(&message, key)?;
    if packet.bytes.len() <= max_packet_size {
        out.push(packet);
        return Ok(());
    }
    if chunk.len() <= 1 {
        return Err(EncodeError::TooLarge {
            size: packet.bytes.len(),
            max: max_packet_size,
        });
    }
    let (left, right) = chunk.split_at(chunk.len() / 2);
    encode_chunk(left, expiration, key, max_packet_size, out)?;
    encode_chunk(right, expiration, key, max_packet_size, out)
}
