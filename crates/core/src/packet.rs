//! Packet format carried over the simulated link.
//!
//! Packets carry no payload bytes, only sizes: the simulation cares about
//! how long a packet occupies the wire and when it arrives, not what it
//! contains. Each packet has:
//! - A header tuple identifying its flow
//! - A payload length
//! - A simulation-wide unique id used to match sends with receives
//!
//! # Wire Size
//!
//! ```text
//! +----------------------+
//! | IPv4 header (20)     |
//! +----------------------+
//! | TCP (20) / UDP (8)   |
//! +----------------------+
//! | payload              |  payload_len bytes
//! | (variable)           |
//! +----------------------+
//! ```
//!
//! Flow statistics count the full wire size, matching what a monitor sitting
//! at the IP layer would observe.

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Size of an IPv4 header without options.
pub const IPV4_HEADER_SIZE: u32 = 20;

/// Transport protocol of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Transport header size in bytes.
    pub fn header_size(self) -> u32 {
        match self {
            Protocol::Tcp => 20,
            Protocol::Udp => 8,
        }
    }

    /// Combined IPv4 and transport header size.
    pub fn overhead(self) -> u32 {
        IPV4_HEADER_SIZE + self.header_size()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// The header fields a flow classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: Protocol,
}

impl PacketHeader {
    /// Header of a packet travelling the opposite way on the same connection.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
            source_port: self.destination_port,
            destination_port: self.source_port,
            protocol: self.protocol,
        }
    }
}

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Application bytes from a video frame
    Data,
    /// Pure acknowledgment with no payload
    Ack,
}

/// A simulated network packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Unique id assigned when the packet enters the network layer
    pub uid: u64,

    /// Flow-identifying header tuple
    pub header: PacketHeader,

    /// Application payload bytes
    pub payload_len: u32,

    pub kind: PacketKind,
}

impl Packet {
    /// Create a new packet.
    pub fn new(uid: u64, header: PacketHeader, payload_len: u32, kind: PacketKind) -> Self {
        Self {
            uid,
            header,
            payload_len,
            kind,
        }
    }

    /// Total size of this packet on the wire.
    pub fn size(&self) -> u32 {
        self.header.protocol.overhead() + self.payload_len
    }
}

/// Hands out packet uids, unique for the lifetime of one simulation.
#[derive(Debug, Default)]
pub struct UidAllocator {
    next: u64,
}

impl UidAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_uid(&mut self) -> u64 {
        let uid = self.next;
        self.next += 1;
        uid
    }
}
