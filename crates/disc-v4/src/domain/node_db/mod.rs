//! NodeDb: the distance-bucketed store of known peers.
//!
//! `NodeTable` is the single-threaded core; `NodeDb` is the shared handle
//! every task uses. Records never leave the table by reference, callers get
//! clones and mutate only through the API.
//!
//! # Eviction (ping before evict)
//!
//! A full bucket never drops an incumbent because a newcomer appeared. The
//! newcomer is queued as a replacement and the least-recently-verified
//! incumbent is handed out by `evict_if_needed` for a liveness check. Only a
//! failed check (`resolve_eviction(.., false, ..)`) removes it.

mod bucket;
mod db;
mod table;

pub use bucket::KBucket;
pub use db::NodeDb;
pub use table::{FailOutcome, NodeDbStats, NodeTable, Upsert};
