//! Outstanding ping and ENR challenges, keyed by the outbound packet hash.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::domain::{ChallengeError, Hash32, NodeAddress, NodeId};

/// Why a challenge was sent. Decides what a matching reply does to NodeDb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengePurpose {
    /// First contact, or re-bonding before a FindNode.
    Bond,
    /// The peer claimed a new endpoint; a pong switches the record to it.
    EndpointProof,
    /// Periodic check of a stored record.
    Revalidate,
    /// Incumbent of a full bucket checked before eviction.
    EvictionCheck,
    /// ENRRequest awaiting its ENRResponse.
    Enr,
}

impl fmt::Display for ChallengePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bond => "bond",
            Self::EndpointProof => "endpoint-proof",
            Self::Revalidate => "revalidate",
            Self::EvictionCheck => "eviction-check",
            Self::Enr => "enr",
        };
        f.write_str(name)
    }
}

/// Reply delivered to the task waiting on a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Pong { enr_seq: Option<u64> },
    Enr { seq: u64, record: Vec<u8> },
}

impl Reply {
    fn answers(&self, purpose: ChallengePurpose) -> bool {
        match self {
            Reply::Enr { .. } => purpose == ChallengePurpose::Enr,
            Reply::Pong { .. } => purpose != ChallengePurpose::Enr,
        }
    }
}

/// Identity of a challenge that left the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChallenge {
    pub node_id: NodeId,
    pub address: NodeAddress,
    pub purpose: ChallengePurpose,
}

struct Challenge {
    node_id: NodeId,
    address: NodeAddress,
    purpose: ChallengePurpose,
    created_at: Instant,
    reply: oneshot::Sender<Reply>,
}

impl Challenge {
    fn resolved(&self) -> ResolvedChallenge {
        ResolvedChallenge {
            node_id: self.node_id,
            address: self.address,
            purpose: self.purpose,
        }
    }
}

#[derive(Default)]
struct Inner {
    by_token: HashMap<Hash32, Challenge>,
    by_peer: HashMap<(NodeId, ChallengePurpose), Hash32>,
}

impl Inner {
    fn take(&mut self, token: &Hash32) -> Option<Challenge> {
        let challenge = self.by_token.remove(token)?;
        self.by_peer.remove(&(challenge.node_id, challenge.purpose));
        Some(challenge)
    }
}

/// Shared table of outstanding challenges.
///
/// At most one challenge per `(NodeId, purpose)` and tokens are unique among
/// outstanding entries. A challenge leaves the table exactly once: matched,
/// cancelled, expired or cleared.
#[derive(Clone, Default)]
pub struct PendingChallenges {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for PendingChallenges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChallenges")
            .field("outstanding", &self.len())
            .finish()
    }
}

impl PendingChallenges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a challenge. Must be called before the packet is sent so a fast
    /// reply cannot overtake the registration.
    pub fn register(
        &self,
        token: Hash32,
        node_id: NodeId,
        address: NodeAddress,
        purpose: ChallengePurpose,
    ) -> Result<oneshot::Receiver<Reply>, ChallengeError> {
        let mut inner = self.inner.lock();
        if inner.by_peer.contains_key(&(node_id, purpose)) {
            return Err(ChallengeError::InProgress);
        }
        if inner.by_token.contains_key(&token) {
            return Err(ChallengeError::DuplicateToken);
        }

        let (tx, rx) = oneshot::channel();
        inner.by_peer.insert((node_id, purpose), token);
        inner.by_token.insert(
            token,
            Challenge {
                node_id,
                address,
                purpose,
                created_at: Instant::now(),
                reply: tx,
            },
        );
        Ok(rx)
    }

    /// Match a reply. Only the challenged identity can resolve a token, and
    /// only with the reply kind the challenge expects; anything else leaves
    /// the challenge in place and returns `None`.
    pub fn resolve(
        &self,
        token: &Hash32,
        responder: &NodeId,
        reply: Reply,
    ) -> Option<ResolvedChallenge> {
        let challenge = {
            let mut inner = self.inner.lock();
            let pending = inner.by_token.get(token)?;
            if &pending.node_id != responder || !reply.answers(pending.purpose) {
                return None;
            }
            inner.take(token)?
        };
        let resolved = challenge.resolved();
        // Waiter may have given up already; the match still counts.
        let _ = challenge.reply.send(reply);
        Some(resolved)
    }

    /// Remove a challenge whose waiter timed out. Returns `false` if it was
    /// already resolved.
    pub fn cancel(&self, token: &Hash32) -> bool {
        self.inner.lock().take(token).is_some()
    }

    /// Drop every challenge older than `older_than`.
    pub fn expire(&self, older_than: Duration) -> Vec<ResolvedChallenge> {
        let mut inner = self.inner.lock();
        let stale: Vec<Hash32> = inner
            .by_token
            .iter()
            .filter(|(_, c)| c.created_at.elapsed() > older_than)
            .map(|(token, _)| *token)
            .collect();
        stale
            .iter()
            .filter_map(|token| inner.take(token))
            .map(|c| c.resolved())
            .collect()
    }

    /// Drop everything. Waiters observe [`ChallengeError::Cancelled`].
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_token.clear();
        inner.by_peer.clear();
    }

    pub fn is_pending(&self, node_id: &NodeId, purpose: ChallengePurpose) -> bool {
        self.inner.lock().by_peer.contains_key(&(*node_id, purpose))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
