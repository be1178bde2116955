//! # Ports Layer
//!
//! - **Driving port (inbound):** what the host calls on discovery.
//! - **Driven ports (outbound):** what discovery needs from the host.

pub mod inbound;
pub mod outbound;

pub use inbound::DiscoveryApi;
pub use outbound::{
    ConfigProvider, MessageSender, NetworkError, NodeStore, StoreError, TimeSource,
};
