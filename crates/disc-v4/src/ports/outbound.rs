//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host supplies: a datagram sender, a clock, configuration
//! and optional node persistence.

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::Enode;
use crate::domain::{DiscoveryConfig, NodeRecord, Timestamp};

/// Sends one encoded, signed packet to one endpoint.
///
/// # Thread Safety
///
/// Shared by every task of the service; implementations must be
/// `Send + Sync` and must not block.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_packet(&self, bytes: &[u8], to: SocketAddr) -> Result<(), NetworkError>;
}

/// Errors from the datagram transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("socket error: {0}")]
    Io(String),
    #[error("message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("transport closed")]
    Closed,
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Wall clock used for packet expiration and liveness windows.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Startup configuration.
pub trait ConfigProvider: Send + Sync {
    /// Nodes contacted first on an empty table.
    fn bootnodes(&self) -> Vec<Enode>;

    fn discovery_config(&self) -> DiscoveryConfig;
}

/// Persists the node table across restarts.
pub trait NodeStore: Send + Sync {
    fn load(&self) -> Result<Vec<NodeRecord>, StoreError>;

    fn save(&self, records: &[NodeRecord]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("node store I/O error at {path}: {error}")]
    Io { path: String, error: String },
    #[error("node store format error: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTimeSource(u64);

    impl TimeSource for FixedTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0)
        }
    }

    #[test]
    fn test_fixed_time_source_returns_configured_value() {
        assert_eq!(FixedTimeSource(1000).now().as_secs(), 1000);
    }

    #[test]
    fn test_network_error_display() {
        assert_eq!(
            NetworkError::MessageTooLarge {
                size: 1300,
                max: 1280
            }
            .to_string(),
            "message of 1300 bytes exceeds maximum 1280"
        );
        assert_eq!(NetworkError::Closed.to_string(), "transport closed");
    }
}
