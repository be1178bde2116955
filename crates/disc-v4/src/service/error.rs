//! Service-level errors.

use std::net::SocketAddr;

use thiserror::Error;

use crate::adapters::ConfigError;
use crate::codec::EncodeError;
use crate::domain::{ChallengeError, NodeDbError};
use crate::ports::{NetworkError, StoreError};

/// Errors of the discovery service.
///
/// Only `Bind` ends the service; everything else is reported by the
/// operation that hit it and logged on the inbound path.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("discovery service is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    NodeDb(#[from] NodeDbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
