//! `enode://<node-id-hex>@<ip>:<tcp-port>[?discport=<udp-port>]` URLs.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::{NodeAddress, NodeEntry, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnodeError {
    #[error("missing enode:// scheme")]
    MissingScheme,
    #[error("invalid node id")]
    InvalidNodeId,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid discport: {0}")]
    InvalidDiscPort(String),
}

/// A node given by URL, typically a bootnode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enode {
    pub node_id: NodeId,
    pub address: NodeAddress,
}

impl From<Enode> for NodeEntry {
    fn from(enode: Enode) -> Self {
        NodeEntry::new(enode.node_id, enode.address)
    }
}

impl FromStr for Enode {
    type Err = EnodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix("enode://")
            .ok_or(EnodeError::MissingScheme)?;
        let (id, host) = rest
            .split_once('@')
            .ok_or_else(|| EnodeError::InvalidAddress(rest.to_string()))?;
        let node_id = NodeId::from_hex(id).ok_or(EnodeError::InvalidNodeId)?;

        let (host, query) = match host.split_once('?') {
            Some((host, query)) => (host, Some(query)),
            None => (host, None),
        };
        let socket: SocketAddr = host
            .parse()
            .map_err(|_| EnodeError::InvalidAddress(host.to_string()))?;

        let udp_port = match query {
            Some(query) => query
                .strip_prefix("discport=")
                .and_then(|port| port.parse::<u16>().ok())
                .ok_or_else(|| EnodeError::InvalidDiscPort(query.to_string()))?,
            None => socket.port(),
        };

        Ok(Self {
            node_id,
            address: NodeAddress::new(socket.ip(), udp_port, socket.port()),
        })
    }
}

impl fmt::Display for Enode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tcp = SocketAddr::new(self.address.ip, self.address.tcp_port);
        write!(f, "enode://{}@{}", self.node_id, tcp)?;
        if self.address.udp_port != self.address.tcp_port {
            write!(f, "?discport={}", self.address.udp_port)?;
        }
        Ok(())
    }
}
