//! Flow classification.
//!
//! A flow is a unidirectional stream of packets sharing one 5-tuple. The
//! classifier is a pure function of the header: the same tuple always maps to
//! the same [`FlowKey`].
//!
//! # Reverse traffic
//!
//! Acknowledgments for a TCP data flow carry the reversed tuple, so they are
//! classified as a separate flow and reported separately, even when they
//! carry no payload. They are never merged into the data flow they
//! acknowledge.

use crate::packet::{PacketHeader, Protocol};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Identity of a flow: the IPv4 5-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlowKey {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: Protocol,
}

impl FlowKey {
    /// Key of the flow travelling the opposite way.
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

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} {}",
            self.source, self.source_port, self.destination, self.destination_port, self.protocol
        )
    }
}

/// Maps packet headers to flow keys.
pub trait Classify {
    fn classify(&self, header: &PacketHeader) -> FlowKey;
}

/// Classifier for IPv4 5-tuples.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4FlowClassifier;

impl Classify for Ipv4FlowClassifier {
    fn classify(&self, header: &PacketHeader) -> FlowKey {
        FlowKey {
            source: header.source,
            destination: header.destination,
            source_port: header.source_port,
            destination_port: header.destination_port,
            protocol: header.protocol,
        }
    }
}
