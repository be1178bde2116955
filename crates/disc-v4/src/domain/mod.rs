//! # Domain Layer
//!
//! Identity, distance, the node table and request correlation. No sockets,
//! no clocks: callers pass `now` in.

pub mod challenge;
pub mod node_db;
pub mod services;
pub mod types;

pub use challenge::*;
pub use node_db::*;
pub use services::*;
pub use types::*;
