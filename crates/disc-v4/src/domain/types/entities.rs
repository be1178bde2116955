//! Core domain entities for discovery.

use std::fmt;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

/// Length of a node identifier in bytes (uncompressed secp256k1 key, no prefix).
pub const NODE_ID_LEN: usize = 64;

/// 32-byte keccak256 digest.
pub type Hash32 = [u8; 32];

/// Keccak256 of arbitrary data.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Public-key derived node identifier.
///
/// The 64 bytes are the x and y coordinates of the node's secp256k1 public key.
/// Distance between nodes is measured on `keccak256(id)`, see [`NodeId::id_hash`].
///
/// # Security
///
/// Comparison is constant-time so that lookups keyed by NodeId do not leak
/// how many leading bytes matched.
#[allow(clippy::derived_hash_with_manual_eq)]
#[derive(Clone, Copy, Hash)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl PartialEq for NodeId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        let mut result = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            result |= a ^ b;
        }
        result == 0
    }
}

impl Eq for NodeId {}

impl NodeId {
    /// Create a NodeId from the raw 64-byte key.
    pub fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, failing unless it is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; NODE_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Parse from a 128 character hex string (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Keccak256 of the identifier: the coordinate used for XOR distance.
    pub fn id_hash(&self) -> Hash32 {
        keccak256(&self.0)
    }

    /// Short form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}..)", self.short())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 64-byte hex node id"))
    }
}

/// Network endpoint of a node: IP plus discovery (UDP) and session (TCP) ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub ip: IpAddr,
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl NodeAddress {
    pub fn new(ip: IpAddr, udp_port: u16, tcp_port: u16) -> Self {
        Self {
            ip,
            udp_port,
            tcp_port,
        }
    }

    /// Endpoint where both ports equal the socket's port.
    pub fn from_socket(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port(), addr.port())
    }

    /// Address discovery packets are sent to.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.udp_port)
    }

    /// Reject endpoints no honest node would advertise.
    pub fn is_valid(&self) -> bool {
        self.udp_port != 0 && !self.ip.is_unspecified() && !self.ip.is_multicast()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.udp_addr())?;
        if self.tcp_port != self.udp_port {
            write!(f, "/tcp:{}", self.tcp_port)?;
        }
        Ok(())
    }
}

/// Unix timestamp in seconds.
///
/// Values are clamped to [`Timestamp::MAX_REASONABLE`] so an attacker supplied
/// `u64::MAX` cannot corrupt ordering or overflow arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Year 9999.
    pub const MAX_REASONABLE: u64 = 253_402_300_799;

    pub fn new(secs: u64) -> Self {
        Self(secs.min(Self::MAX_REASONABLE))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Add seconds (saturating at MAX_REASONABLE).
    pub fn add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs).min(Self::MAX_REASONABLE))
    }

    /// Subtract seconds (saturating at 0).
    pub fn sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Seconds elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Liveness state of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    /// Learned from a third party or an inbound packet; never answered our ping.
    Unverified,
    /// Answered a ping of ours.
    Alive,
    /// Stopped answering pings after having been seen.
    Unresponsive,
}

/// One known peer. Owned by NodeDb; callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub address: NodeAddress,
    /// When the record entered the table.
    pub added_at: Timestamp,
    /// Last time the node answered one of our pings.
    pub last_verified: Option<Timestamp>,
    /// Last time the node pinged us.
    pub last_ping_received: Option<Timestamp>,
    /// Sequence number of the node's self-published record.
    pub enr_seq: u64,
    /// Latest verified node record (RLP), if fetched.
    #[serde(default)]
    pub enr: Option<Vec<u8>>,
    /// Consecutive failed liveness checks.
    pub fail_count: u32,
    pub liveness: Liveness,
}

impl NodeRecord {
    /// A fresh, unverified record.
    pub fn new(node_id: NodeId, address: NodeAddress, enr_seq: u64, now: Timestamp) -> Self {
        Self {
            node_id,
            address,
            added_at: now,
            last_verified: None,
            last_ping_received: None,
            enr_seq,
            enr: None,
            fail_count: 0,
            liveness: Liveness::Unverified,
        }
    }

    /// Verified within `bond_expiration_secs` of `now`.
    pub fn is_alive(&self, now: Timestamp, bond_expiration_secs: u64) -> bool {
        self.liveness == Liveness::Alive
            && self
                .last_verified
                .is_some_and(|at| now.since(at) < bond_expiration_secs)
    }

    /// Has ever answered a ping of ours.
    pub fn was_verified(&self) -> bool {
        self.last_verified.is_some()
    }
}

/// Identity and endpoint of a node as advertised on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeEntry {
    pub node_id: NodeId,
    pub address: NodeAddress,
}

impl NodeEntry {
    pub fn new(node_id: NodeId, address: NodeAddress) -> Self {
        Self { node_id, address }
    }
}

impl From<&NodeRecord> for NodeEntry {
    fn from(record: &NodeRecord) -> Self {
        Self::new(record.node_id, record.address)
    }
}

/// Emitted the first time a peer proves liveness (or after it had lapsed).
///
/// Consumed by the connection layer to open authenticated sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPeer {
    pub node_id: NodeId,
    pub address: NodeAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_node_id_hex_roundtrip_and_equality() {
        let id = NodeId::new([7u8; 64]);
        let parsed = NodeId::from_hex(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_ne!(id, NodeId::new([8u8; 64]));
        assert!(NodeId::from_hex("abcd").is_none());
    }

    #[test]
    fn test_node_address_validity() {
        let ok = NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 30303, 30303);
        assert!(ok.is_valid());
        assert!(!NodeAddress::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 30303, 0).is_valid());
        assert!(!NodeAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 0, 1).is_valid());
        assert!(!NodeAddress::new(IpAddr::V4(Ipv4Addr::new(224, 0, 0, 1)), 1, 1).is_valid());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::new(100);
        assert_eq!(ts.add_secs(50).as_secs(), 150);
        assert_eq!(ts.sub_secs(200).as_secs(), 0);
        assert_eq!(Timestamp::new(u64::MAX).as_secs(), Timestamp::MAX_REASONABLE);
        assert_eq!(ts.since(Timestamp::new(40)), 60);
        assert_eq!(Timestamp::new(40).since(ts), 0);
    }

    #[test]
    fn test_record_alive_window() {
        let addr = NodeAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, 1);
        let mut record = NodeRecord::new(NodeId::new([1; 64]), addr, 0, Timestamp::new(10));
        assert!(!record.is_alive(Timestamp::new(10), 100));

        record.liveness = Liveness::Alive;
        record.last_verified = Some(Timestamp::new(10));
        assert!(record.is_alive(Timestamp::new(50), 100));
        assert!(!record.is_alive(Timestamp::new(110), 100));
    }
}
