//! Outstanding FindNode requests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::{ChallengeError, NodeEntry, NodeId};

/// Usable nodes from one Neighbors packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborBatch {
    pub nodes: Vec<NodeEntry>,
    /// Entries the packet carried before self and bad endpoints were dropped.
    pub received: usize,
}

struct Lookup {
    sent_at: Instant,
    received: usize,
    results: mpsc::Sender<NeighborBatch>,
}

/// FindNode requests awaiting Neighbors, one per queried peer.
///
/// Neighbors from a peer with no entry here are unsolicited. Each request
/// accepts at most `max_results` nodes in total across its reply packets.
#[derive(Clone)]
pub struct PendingLookups {
    inner: Arc<Mutex<HashMap<NodeId, Lookup>>>,
    max_results: usize,
}

impl std::fmt::Debug for PendingLookups {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLookups")
            .field("outstanding", &self.inner.lock().len())
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl PendingLookups {
    pub fn new(max_results: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_results,
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Open a request to `peer`. Reply batches arrive on the receiver.
    pub fn register(&self, peer: NodeId) -> Result<mpsc::Receiver<NeighborBatch>, ChallengeError> {
        let mut inner = self.inner.lock();
        if inner.contains_key(&peer) {
            return Err(ChallengeError::InProgress);
        }
        // Bounded by packets per request, not by nodes.
        let (tx, rx) = mpsc::channel(self.max_results.max(1));
        inner.insert(
            peer,
            Lookup {
                sent_at: Instant::now(),
                received: 0,
                results: tx,
            },
        );
        Ok(rx)
    }

    /// Admit a Neighbors packet of `count` nodes from `sender`.
    ///
    /// `None` when nothing was asked of `sender` or the packet would push the
    /// request past `max_results`.
    pub fn accept(&self, sender: &NodeId, count: usize) -> Option<mpsc::Sender<NeighborBatch>> {
        let mut inner = self.inner.lock();
        let lookup = inner.get_mut(sender)?;
        if lookup.received + count > self.max_results {
            return None;
        }
        lookup.received += count;
        Some(lookup.results.clone())
    }

    /// Close the request to `peer`. Returns how long it was open.
    pub fn finish(&self, peer: &NodeId) -> Option<std::time::Duration> {
        self.inner
            .lock()
            .remove(peer)
            .map(|lookup| lookup.sent_at.elapsed())
    }

    pub fn is_pending(&self, peer: &NodeId) -> bool {
        self.inner.lock().contains_key(peer)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
