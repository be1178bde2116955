//! # Wire Codec
//!
//! Discovery v4 packets: `hash(32) || signature(65) || type(1) || rlp(payload)`.
//!
//! Decoding checks, in order: length, hash, signature (recovering the
//! sender's NodeId), payload, expiration. The first failure drops the packet.

mod crypto;
mod enode;
mod enr;
mod error;
mod message;
mod packet;

pub use crypto::{
    generate_key, local_node_id, node_id_from_key, recover_node_id, sign_recoverable,
    signing_key_from_hex, verifying_key, SIGNATURE_LEN,
};
pub use enode::{Enode, EnodeError};
pub use enr::{EnrRecord, MAX_ENR_SIZE};
pub use error::{DecodeError, EncodeError};
pub use message::{
    EnrRequest, EnrResponse, FindNode, Message, Neighbors, PacketType, Ping, Pong,
    PROTOCOL_VERSION,
};
pub use packet::{
    decode, encode, encode_neighbors, open_envelope, DecodedPacket, EncodedPacket, Envelope,
    HASH_LEN, HEADER_LEN, MAX_PACKET_SIZE,
};
