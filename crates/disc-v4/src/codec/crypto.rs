//! secp256k1 identity keys: signing, recovery and NodeId conversion.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::domain::{Hash32, NodeId};

use super::error::{DecodeError, EncodeError};

/// Length of a recoverable signature: r || s || v.
pub const SIGNATURE_LEN: usize = 65;

/// NodeId of a public key: the uncompressed point without the 0x04 prefix.
pub fn node_id_from_key(key: &VerifyingKey) -> NodeId {
    let point = key.to_encoded_point(false);
    let mut id = [0u8; 64];
    id.copy_from_slice(&point.as_bytes()[1..]);
    NodeId::new(id)
}

/// NodeId of the node holding `key`.
pub fn local_node_id(key: &SigningKey) -> NodeId {
    node_id_from_key(key.verifying_key())
}

/// Public key behind a NodeId, if the id is a valid curve point.
pub fn verifying_key(node_id: &NodeId) -> Option<VerifyingKey> {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(node_id.as_bytes());
    VerifyingKey::from_sec1_bytes(&sec1).ok()
}

/// Sign a 32-byte digest, producing r || s || recovery id.
pub fn sign_recoverable(digest: &Hash32, key: &SigningKey) -> Result<[u8; SIGNATURE_LEN], EncodeError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| EncodeError::Signing(e.to_string()))?;

    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Recover the signer of `digest` from a 65-byte recoverable signature.
pub fn recover_node_id(signature: &[u8], digest: &Hash32) -> Result<NodeId, DecodeError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(DecodeError::BadSignature);
    }
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| DecodeError::BadSignature)?;
    let recovery_id = RecoveryId::from_byte(signature[64]).ok_or(DecodeError::BadSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| DecodeError::BadSignature)?;
    Ok(node_id_from_key(&key))
}

/// Fresh random identity key.
pub fn generate_key() -> SigningKey {
    SigningKey::random(&mut rand::thread_rng())
}

/// Parse a hex-encoded 32-byte secret key (optional `0x` prefix).
pub fn signing_key_from_hex(s: &str) -> Option<SigningKey> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
    SigningKey::from_slice(&bytes).ok()
}
