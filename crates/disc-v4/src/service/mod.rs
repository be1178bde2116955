//! # Discovery Service
//!
//! Orchestrates the protocol around the domain: signs and sends packets,
//! correlates replies with the challenges that provoked them, dispatches
//! inbound datagrams to the packet handlers and drives the periodic table
//! maintenance.
//!
//! ## Tasks
//!
//! - the receive loop (`run`), dispatching inline so one sender's packets
//!   are handled in arrival order
//! - one task per spawned liveness check (bond, endpoint proof, eviction)
//! - the refresh and revalidation tickers
//!
//! Every task stops when `shutdown` flips the watch channel.

mod api;
mod core;
mod dispatch;
mod error;
mod lookup;
mod maintenance;
mod ping;

pub use core::{DiscoveryBuilder, DiscoveryService};
pub use error::DiscoveryError;
pub use ping::PingOutcome;
