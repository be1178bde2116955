//! Request/response correlation: ping and ENR challenges, FindNode lookups.

mod lookups;
mod pending;

pub use lookups::{NeighborBatch, PendingLookups};
pub use pending::{ChallengePurpose, PendingChallenges, Reply, ResolvedChallenge};

#[cfg(test)]
mod tests;
