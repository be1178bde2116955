//! Codec errors.

use thiserror::Error;

/// Why an inbound datagram was dropped.
///
/// Never surfaced past the dispatch boundary; the service logs and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },

    #[error("packet too large: {len} bytes")]
    TooLarge { len: usize },

    #[error("packet hash mismatch")]
    HashMismatch,

    #[error("invalid signature")]
    BadSignature,

    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    #[error("malformed payload: {0}")]
    Rlp(#[from] rlp::DecoderError),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("packet expired at {expiration} (now {now})")]
    Expired { expiration: u64, now: u64 },

    #[error("invalid node record: {0}")]
    InvalidEnr(&'static str),
}

impl DecodeError {
    /// Errors raised after the signature checked out: the sender is known
    /// and sent garbage.
    pub fn is_bad_payload(&self) -> bool {
        matches!(
            self,
            Self::Rlp(_) | Self::InvalidField(_) | Self::InvalidEnr(_)
        )
    }
}

/// Failures building an outbound packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encoded packet is {size} bytes, limit {max}")]
    TooLarge { size: usize, max: usize },
}
