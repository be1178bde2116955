//! Packet payloads and their RLP form.
//!
//! Decoding reads fields by position and ignores trailing list items, so
//! newer peers that append fields stay compatible.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rlp::{Rlp, RlpStream};

use crate::domain::{Hash32, NodeAddress, NodeEntry, NodeId, NODE_ID_LEN};

use super::error::DecodeError;

/// Version number sent in Ping.
pub const PROTOCOL_VERSION: u32 = 4;

/// Wire tag of each packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Ping = 0x01,
    Pong = 0x02,
    FindNode = 0x03,
    Neighbors = 0x04,
    EnrRequest = 0x05,
    EnrResponse = 0x06,
}

impl PacketType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Ping),
            0x02 => Ok(Self::Pong),
            0x03 => Ok(Self::FindNode),
            0x04 => Ok(Self::Neighbors),
            0x05 => Ok(Self::EnrRequest),
            0x06 => Ok(Self::EnrResponse),
            other => Err(DecodeError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub version: u32,
    /// Endpoint the sender claims. Never trusted without a pong from it.
    pub from: NodeAddress,
    /// Endpoint the sender believes it is talking to.
    pub to: NodeAddress,
    pub expiration: u64,
    pub enr_seq: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    /// Endpoint the ping came from, as seen by the responder.
    pub to: NodeAddress,
    /// Hash of the ping packet being answered.
    pub ping_hash: Hash32,
    pub expiration: u64,
    pub enr_seq: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindNode {
    pub target: NodeId,
    pub expiration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbors {
    pub nodes: Vec<NodeEntry>,
    pub expiration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrRequest {
    pub expiration: u64,
}

/// Carries no expiration; freshness comes from `request_hash` matching an
/// outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrResponse {
    pub request_hash: Hash32,
    /// RLP of the node record, verified separately.
    pub record: Vec<u8>,
}

/// A decoded discovery message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping(Ping),
    Pong(Pong),
    FindNode(FindNode),
    Neighbors(Neighbors),
    EnrRequest(EnrRequest),
    EnrResponse(EnrResponse),
}

impl Message {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Message::Ping(_) => PacketType::Ping,
            Message::Pong(_) => PacketType::Pong,
            Message::FindNode(_) => PacketType::FindNode,
            Message::Neighbors(_) => PacketType::Neighbors,
            Message::EnrRequest(_) => PacketType::EnrRequest,
            Message::EnrResponse(_) => PacketType::EnrResponse,
        }
    }

    /// Absolute expiry (unix seconds), if the message kind carries one.
    pub fn expiration(&self) -> Option<u64> {
        match self {
            Message::Ping(m) => Some(m.expiration),
            Message::Pong(m) => Some(m.expiration),
            Message::FindNode(m) => Some(m.expiration),
            Message::Neighbors(m) => Some(m.expiration),
            Message::EnrRequest(m) => Some(m.expiration),
            Message::EnrResponse(_) => None,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut s;
        match self {
            Message::Ping(m) => {
                s = RlpStream::new_list(if m.enr_seq.is_some() { 5 } else { 4 });
                s.append(&m.version);
                append_address(&mut s, &m.from);
                append_address(&mut s, &m.to);
                s.append(&m.expiration);
                if let Some(seq) = m.enr_seq {
                    s.append(&seq);
                }
            }
            Message::Pong(m) => {
                s = RlpStream::new_list(if m.enr_seq.is_some() { 4 } else { 3 });
                append_address(&mut s, &m.to);
                s.append(&&m.ping_hash[..]);
                s.append(&m.expiration);
                if let Some(seq) = m.enr_seq {
                    s.append(&seq);
                }
            }
            Message::FindNode(m) => {
                s = RlpStream::new_list(2);
                s.append(&&m.target.as_bytes()[..]);
                s.append(&m.expiration);
            }
            Message::Neighbors(m) => {
                s = RlpStream::new_list(2);
                s.begin_list(m.nodes.len());
                for node in &m.nodes {
                    s.begin_list(4);
                    append_ip(&mut s, node.address.ip);
                    s.append(&node.address.udp_port);
                    s.append(&node.address.tcp_port);
                    s.append(&&node.node_id.as_bytes()[..]);
                }
                s.append(&m.expiration);
            }
            Message::EnrRequest(m) => {
                s = RlpStream::new_list(1);
                s.append(&m.expiration);
            }
            Message::EnrResponse(m) => {
                s = RlpStream::new_list(2);
                s.append(&&m.request_hash[..]);
                s.append_raw(&m.record, 1);
            }
        }
        s.out().to_vec()
    }

    pub fn decode_payload(packet_type: PacketType, payload: &[u8]) -> Result<Self, DecodeError> {
        let rlp = Rlp::new(payload);
        if !rlp.is_list() {
            return Err(DecodeError::InvalidField("payload"));
        }
        let message = match packet_type {
            PacketType::Ping => Message::Ping(Ping {
                version: rlp.val_at(0)?,
                from: decode_address(&rlp.at(1)?)?,
                to: decode_address(&rlp.at(2)?)?,
                expiration: rlp.val_at(3)?,
                enr_seq: optional_u64(&rlp, 4)?,
            }),
            PacketType::Pong => Message::Pong(Pong {
                to: decode_address(&rlp.at(0)?)?,
                ping_hash: decode_hash(&rlp.at(1)?)?,
                expiration: rlp.val_at(2)?,
                enr_seq: optional_u64(&rlp, 3)?,
            }),
            PacketType::FindNode => Message::FindNode(FindNode {
                target: decode_node_id(&rlp.at(0)?)?,
                expiration: rlp.val_at(1)?,
            }),
            PacketType::Neighbors => {
                let list = rlp.at(0)?;
                let mut nodes = Vec::with_capacity(list.item_count()?);
                for item in list.iter() {
                    let address = decode_address(&item)?;
                    nodes.push(NodeEntry::new(decode_node_id(&item.at(3)?)?, address));
                }
                Message::Neighbors(Neighbors {
                    nodes,
                    expiration: rlp.val_at(1)?,
                })
            }
            PacketType::EnrRequest => Message::EnrRequest(EnrRequest {
                expiration: rlp.val_at(0)?,
            }),
            PacketType::EnrResponse => {
                let record = rlp.at(1)?;
                if !record.is_list() {
                    return Err(DecodeError::InvalidField("enr"));
                }
                Message::EnrResponse(EnrResponse {
                    request_hash: decode_hash(&rlp.at(0)?)?,
                    record: record.as_raw().to_vec(),
                })
            }
        };
        Ok(message)
    }
}

pub(crate) fn append_ip(s: &mut RlpStream, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => s.append(&&v4.octets()[..]),
        IpAddr::V6(v6) => s.append(&&v6.octets()[..]),
    };
}

fn append_address(s: &mut RlpStream, address: &NodeAddress) {
    s.begin_list(3);
    append_ip(s, address.ip);
    s.append(&address.udp_port);
    s.append(&address.tcp_port);
}

pub(crate) fn decode_ip(bytes: &[u8]) -> Result<IpAddr, DecodeError> {
    match bytes.len() {
        // Peers that do not know their address send an empty string.
        0 => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(bytes);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(DecodeError::InvalidField("ip")),
    }
}

fn decode_address(rlp: &Rlp) -> Result<NodeAddress, DecodeError> {
    let ip = decode_ip(rlp.at(0)?.data()?)?;
    Ok(NodeAddress::new(ip, rlp.val_at(1)?, rlp.val_at(2)?))
}

fn decode_hash(rlp: &Rlp) -> Result<Hash32, DecodeError> {
    rlp.data()?
        .try_into()
        .map_err(|_| DecodeError::InvalidField("hash"))
}

fn decode_node_id(rlp: &Rlp) -> Result<NodeId, DecodeError> {
    let data = rlp.data()?;
    if data.len() != NODE_ID_LEN {
        return Err(DecodeError::InvalidField("node id"));
    }
    NodeId::from_slice(data).ok_or(DecodeError::InvalidField("node id"))
}

fn optional_u64(rlp: &Rlp, index: usize) -> Result<Option<u64>, DecodeError> {
    if rlp.item_count()? > index {
        Ok(Some(rlp.val_at(index)?))
    } else {
        Ok(None)
    }
}
