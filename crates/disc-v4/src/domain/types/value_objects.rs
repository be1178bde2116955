//! Value objects: tuning parameters and the penalization signal.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::entities::NodeId;

/// Protocol tuning parameters.
///
/// Every field has a documented default so a partial `[discovery]` TOML
/// table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Records per distance bucket (K).
    pub bucket_size: usize,
    /// Number of distance buckets. Distances at or below `257 - bucket_count`
    /// share the first bucket.
    pub bucket_count: usize,
    /// Queued replacement candidates kept per bucket.
    pub max_replacements: usize,
    /// FindNode requests in flight per lookup round.
    pub alpha: usize,
    /// Upper bound on iterative lookup rounds.
    pub max_lookup_rounds: usize,
    /// How long a ping waits for its pong.
    pub ping_timeout_ms: u64,
    /// How long a FindNode waits for Neighbors.
    pub find_node_timeout_ms: u64,
    /// Lifetime stamped into outbound packets.
    pub packet_expiration_secs: u64,
    /// Window after a pong during which the peer counts as alive.
    pub bond_expiration_secs: u64,
    /// Failed liveness checks before a record is dropped.
    pub max_fail_count: u32,
    pub refresh_interval_secs: u64,
    pub revalidate_interval_secs: u64,
    /// Datagram size bound (MTU assumption).
    pub max_packet_size: usize,
    pub max_neighbors_per_packet: usize,
    /// Drop pings whose recipient UDP port is not ours.
    pub check_ping_recipient: bool,
    /// Buffer of the verified-peer and penalization channels.
    pub event_channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bucket_size: 16,
            bucket_count: 17,
            max_replacements: 10,
            alpha: 3,
            max_lookup_rounds: 8,
            ping_timeout_ms: 1_000,
            find_node_timeout_ms: 2_000,
            packet_expiration_secs: 20,
            bond_expiration_secs: 24 * 60 * 60,
            max_fail_count: 5,
            refresh_interval_secs: 30 * 60,
            revalidate_interval_secs: 10,
            max_packet_size: 1280,
            max_neighbors_per_packet: 12,
            check_ping_recipient: true,
            event_channel_capacity: 256,
        }
    }
}

impl DiscoveryConfig {
    /// Small buckets and short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            bucket_size: 3,
            bucket_count: 256,
            max_replacements: 2,
            alpha: 2,
            max_lookup_rounds: 4,
            ping_timeout_ms: 200,
            find_node_timeout_ms: 300,
            packet_expiration_secs: 20,
            bond_expiration_secs: 600,
            max_fail_count: 2,
            refresh_interval_secs: 60,
            revalidate_interval_secs: 5,
            max_packet_size: 1280,
            max_neighbors_per_packet: 12,
            check_ping_recipient: true,
            event_channel_capacity: 64,
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn find_node_timeout(&self) -> Duration {
        Duration::from_millis(self.find_node_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.revalidate_interval_secs)
    }
}

/// Penalty severities understood by the sync layer.
///
/// Discovery never interprets these; it only reports which peer misbehaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Penalty {
    NoPenalty,
    BadBlock,
    DuplicateHeader,
    WrongChildBlockHeight,
    WrongChildDifficulty,
    InvalidSeal,
    TooFarFuture,
    TooFarPast,
    AbandonedAnchor,
    /// Authenticated packet that broke protocol rules (unsolicited reply, oversized answer).
    ProtocolViolation,
    /// Authenticated packet whose payload did not decode.
    BadData,
    /// Liveness check went unanswered.
    Timeout,
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoPenalty => "no penalty",
            Self::BadBlock => "bad block",
            Self::DuplicateHeader => "duplicate header",
            Self::WrongChildBlockHeight => "wrong child block height",
            Self::WrongChildDifficulty => "wrong child difficulty",
            Self::InvalidSeal => "invalid seal",
            Self::TooFarFuture => "too far future",
            Self::TooFarPast => "too far past",
            Self::AbandonedAnchor => "abandoned anchor",
            Self::ProtocolViolation => "protocol violation",
            Self::BadData => "bad data",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A peer identity paired with a penalty, forwarded to the sync layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPenalization {
    pub penalty: Penalty,
    pub peer_id: NodeId,
}

impl PeerPenalization {
    pub fn new(penalty: Penalty, peer_id: NodeId) -> Self {
        Self { penalty, peer_id }
    }
}

impl fmt::Display for PeerPenalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer {} penalized: {}", self.peer_id.short(), self.penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.bucket_size, 16);
        assert_eq!(config.bucket_count, 17);
        assert_eq!(config.max_packet_size, 1280);
        assert_eq!(config.ping_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DiscoveryConfig = toml::from_str("bucket_size = 8").unwrap();
        assert_eq!(config.bucket_size, 8);
        assert_eq!(config.alpha, 3);
    }

    #[test]
    fn test_penalization_display() {
        let p = PeerPenalization::new(Penalty::BadData, NodeId::new([0xab; 64]));
        assert_eq!(p.to_string(), "peer abababab penalized: bad data");
    }
}
