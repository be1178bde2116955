//! # Adapters
//!
//! Production implementations of the outbound ports.
//!
//! - `UdpTransport` - tokio UDP socket, also the receive side of the service
//! - `SystemTimeSource` - wall clock
//! - `StaticConfigProvider` / `TomlConfigProvider` - configuration
//! - `JsonNodeStore` - node table snapshot on disk

mod config;
mod persistence;
mod time;
mod udp;

pub use config::{ConfigError, NodeSettings, StaticConfigProvider, TomlConfigProvider};
pub use persistence::JsonNodeStore;
pub use time::SystemTimeSource;
pub use udp::UdpTransport;

#[cfg(test)]
mod tests;
