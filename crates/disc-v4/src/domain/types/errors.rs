//! Domain errors for discovery.

use thiserror::Error;

/// Reasons NodeDb refuses or cannot apply a mutation.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NodeDbError {
    /// Attempted to store the local node.
    #[error("cannot add local node to the table")]
    SelfInsertion,
    /// Endpoint has port 0, an unspecified or a multicast IP.
    #[error("invalid node endpoint")]
    InvalidEndpoint,
    /// No record for the given NodeId.
    #[error("node not found in table")]
    NodeNotFound,
    /// The bucket is full and its replacement list already holds the node or is full.
    #[error("bucket full, candidate queued or dropped")]
    BucketFull,
}

/// Failures to open or complete a liveness challenge.
///
/// A plain timeout is not an error; it is reported as an outcome.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ChallengeError {
    /// A challenge for the same peer and purpose is still outstanding.
    #[error("challenge already in progress for this peer")]
    InProgress,
    /// An identical outbound packet is already awaiting its reply.
    #[error("duplicate challenge token")]
    DuplicateToken,
    /// The tracker was cleared (shutdown) before a reply arrived.
    #[error("challenge cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            NodeDbError::SelfInsertion.to_string(),
            "cannot add local node to the table"
        );
        assert_eq!(
            ChallengeError::InProgress.to_string(),
            "challenge already in progress for this peer"
        );
    }
}
