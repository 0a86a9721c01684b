//! Reliable stream transport over one link direction.
//!
//! `StreamSocket` accepts application sends into a bounded send buffer and
//! hands the link one wire packet at a time. The link is lossless and FIFO,
//! so in-order delivery holds without retransmission.
//!
//! # Backpressure
//!
//! A send that does not fit in the remaining buffer space is deferred, not
//! rejected: it waits in a backlog and is admitted as soon as the buffer
//! drains far enough. The backlog itself is bounded by `max_backlog_bytes`;
//! a send that would overflow it fails, as do sends that can never fit in
//! the buffer and sends that arrive after the socket closed.
//!
//! The buffer drains only as fast as the link device queue accepts packets,
//! so a link slower than the offered load eventually fills the backlog.
//!
//! # Acknowledgments
//!
//! With TCP the receiving side runs an `AckGenerator` that answers every
//! `ack_every` data packets with a pure ACK on the reverse 5-tuple. Those
//! ACKs are a flow of their own in the measurement report.

use crate::error::TransportError;
use crate::packet::{Packet, PacketHeader, PacketKind, Protocol, UidAllocator};
use serde::Serialize;
use std::collections::VecDeque;

/// Configuration shared by both sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub protocol: Protocol,

    /// Maximum payload bytes per wire packet
    pub mss: u32,

    /// Send buffer capacity in bytes
    pub send_buffer_bytes: u32,

    /// Data packets per acknowledgment (TCP only)
    pub ack_every: u32,

    /// Bytes that may wait for buffer space before sends fail
    pub max_backlog_bytes: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            mss: 1500,
            send_buffer_bytes: 131_072,
            ack_every: 2,
            max_backlog_bytes: 2_097_152,
        }
    }
}

/// Result of a successful [`StreamSocket::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Bytes are in the send buffer
    Queued,
    /// Buffer was full; bytes wait in the backlog
    Deferred,
}

/// Socket counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SocketStats {
    pub sends_accepted: u64,
    pub sends_deferred: u64,
    pub sends_refused: u64,
    pub bytes_accepted: u64,
    pub packets_emitted: u64,
}

/// Sending half of a stream connection.
pub struct StreamSocket {
    header: PacketHeader,
    mss: u32,
    capacity: u32,
    buffered: u32,

    /// Wire packet payload sizes waiting for the link
    pending: VecDeque<u32>,

    /// Sends waiting for buffer space
    backlog: VecDeque<u32>,
    backlog_bytes: u64,
    max_backlog_bytes: u64,

    closed: bool,
    stats: SocketStats,
}

impl StreamSocket {
    pub fn new(header: PacketHeader, config: &TransportConfig) -> Self {
        Self {
            header,
            mss: config.mss,
            capacity: config.send_buffer_bytes,
            buffered: 0,
            pending: VecDeque::new(),
            backlog: VecDeque::new(),
            backlog_bytes: 0,
            max_backlog_bytes: config.max_backlog_bytes,
            closed: false,
            stats: SocketStats::default(),
        }
    }

    /// Offer `bytes` to the transport.
    ///
    /// # Errors
    /// - `TransportError::ConnectionClosed` after [`close`](Self::close)
    /// - `TransportError::SegmentTooLarge` if `bytes` exceeds the whole buffer
    /// - `TransportError::BacklogFull` if deferring `bytes` would overflow the backlog
    pub fn send(&mut self, bytes: u32) -> Result<SendStatus, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        if bytes > self.capacity {
            return Err(TransportError::SegmentTooLarge {
                size: bytes,
                capacity: self.capacity,
            });
        }

        // Preserve stream order: nothing jumps ahead of the backlog
        if !self.backlog.is_empty() || self.buffered + bytes > self.capacity {
            if self.backlog_bytes + u64::from(bytes) > self.max_backlog_bytes {
                self.stats.sends_refused += 1;
                return Err(TransportError::BacklogFull {
                    size: bytes,
                    backlog: self.backlog_bytes,
                });
            }
            self.backlog.push_back(bytes);
            self.backlog_bytes += u64::from(bytes);
            self.stats.sends_deferred += 1;
            return Ok(SendStatus::Deferred);
        }

        self.admit(bytes);
        Ok(SendStatus::Queued)
    }

    /// Pull the next wire packet for the link.
    pub fn next_packet(&mut self, uids: &mut UidAllocator) -> Option<Packet> {
        let payload = self.pending.pop_front()?;
        self.buffered -= payload;
        self.admit_backlog();

        self.stats.packets_emitted += 1;
        Some(Packet::new(uids.next_uid(), self.header, payload, PacketKind::Data))
    }

    /// Bytes in the buffer plus the backlog.
    pub fn unsent_bytes(&self) -> u64 {
        u64::from(self.buffered) + self.backlog_bytes
    }

    /// Refuse further sends. Buffered data is abandoned with the run.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn stats(&self) -> SocketStats {
        self.stats
    }

    fn admit(&mut self, bytes: u32) {
        self.buffered += bytes;
        self.stats.sends_accepted += 1;
        self.stats.bytes_accepted += u64::from(bytes);

        let mut remaining = bytes;
        while remaining > 0 {
            let piece = remaining.min(self.mss);
            self.pending.push_back(piece);
            remaining -= piece;
        }
    }

    fn admit_backlog(&mut self) {
        while let Some(&next) = self.backlog.front() {
            if self.buffered + next > self.capacity {
                break;
            }
            self.backlog.pop_front();
            self.backlog_bytes -= u64::from(next);
            self.admit(next);
        }
    }
}

/// Receiving half of a TCP connection: emits delayed acknowledgments.
pub struct AckGenerator {
    header: PacketHeader,
    every: u32,
    unacked: u32,
}

impl AckGenerator {
    /// `data_header` is the header of the data being acknowledged.
    pub fn new(data_header: &PacketHeader, every: u32) -> Self {
        Self {
            header: data_header.reversed(),
            every: every.max(1),
            unacked: 0,
        }
    }

    /// Record a received data packet; returns an ACK when one is due.
    pub fn on_data(&mut self, uids: &mut UidAllocator) -> Option<Packet> {
        self.unacked += 1;
        if self.unacked < self.every {
            return None;
        }
        self.unacked = 0;
        Some(Packet::new(uids.next_uid(), self.header, 0, PacketKind::Ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn header() -> PacketHeader {
        PacketHeader {
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(10, 1, 1, 2),
            source_port: 49153,
            destination_port: 60000,
            protocol: Protocol::Tcp,
        }
    }

    fn config(mss: u32, send_buffer_bytes: u32) -> TransportConfig {
        TransportConfig {
            mss,
            send_buffer_bytes,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_send_splits_at_mss() {
        let mut socket = StreamSocket::new(header(), &config(1000, 10_000));
        let mut uids = UidAllocator::new();

        assert_eq!(socket.send(2500), Ok(SendStatus::Queued));

        let sizes: Vec<_> = std::iter::from_fn(|| socket.next_packet(&mut uids))
            .map(|p| p.payload_len)
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(socket.unsent_bytes(), 0);
    }

    #[test]
    fn test_full_buffer_defers_then_admits() {
        let mut socket = StreamSocket::new(header(), &config(1000, 2000));
        let mut uids = UidAllocator::new();

        assert_eq!(socket.send(1500), Ok(SendStatus::Queued));
        assert_eq!(socket.send(1000), Ok(SendStatus::Deferred));
        assert_eq!(socket.unsent_bytes(), 2500);

        // Draining 1000 bytes frees room for the deferred send
        let first = socket.next_packet(&mut uids).map(|p| p.payload_len);
        assert_eq!(first, Some(1000));
        assert_eq!(socket.stats().sends_accepted, 2);

        let rest: u32 = std::iter::from_fn(|| socket.next_packet(&mut uids))
            .map(|p| p.payload_len)
            .sum();
        assert_eq!(rest, 1500);
    }

    #[test]
    fn test_backlog_preserves_order() {
        let mut socket = StreamSocket::new(header(), &config(5000, 1000));
        let mut uids = UidAllocator::new();

        assert_eq!(socket.send(900), Ok(SendStatus::Queued));
        assert_eq!(socket.send(800), Ok(SendStatus::Deferred));
        // Would fit on its own, but must not overtake the backlog
        assert_eq!(socket.send(50), Ok(SendStatus::Deferred));

        let sizes: Vec<_> = std::iter::from_fn(|| socket.next_packet(&mut uids))
            .map(|p| p.payload_len)
            .collect();
        assert_eq!(sizes, vec![900, 800, 50]);
    }

    #[test]
    fn test_oversized_send_fails() {
        let mut socket = StreamSocket::new(header(), &config(1000, 1000));
        assert_eq!(
            socket.send(1001),
            Err(TransportError::SegmentTooLarge {
                size: 1001,
                capacity: 1000
            })
        );
    }

    #[test]
    fn test_backlog_is_bounded() {
        let config = TransportConfig {
            mss: 1000,
            send_buffer_bytes: 1000,
            max_backlog_bytes: 1500,
            ..TransportConfig::default()
        };
        let mut socket = StreamSocket::new(header(), &config);
        let mut uids = UidAllocator::new();

        assert_eq!(socket.send(1000), Ok(SendStatus::Queued));
        assert_eq!(socket.send(1000), Ok(SendStatus::Deferred));
        assert_eq!(
            socket.send(600),
            Err(TransportError::BacklogFull {
                size: 600,
                backlog: 1000
            })
        );
        assert_eq!(socket.send(500), Ok(SendStatus::Deferred));
        assert_eq!(socket.stats().sends_refused, 1);
        assert_eq!(socket.unsent_bytes(), 2500);

        // Draining the buffer moves the backlog forward and frees room
        socket.next_packet(&mut uids);
        assert_eq!(socket.unsent_bytes(), 1500);
        assert_eq!(socket.send(600), Ok(SendStatus::Deferred));
    }

    #[test]
    fn test_closed_socket_fails() {
        let mut socket = StreamSocket::new(header(), &TransportConfig::default());
        socket.close();
        assert_eq!(socket.send(10), Err(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_ack_every_two() {
        let mut acks = AckGenerator::new(&header(), 2);
        let mut uids = UidAllocator::new();

        assert!(acks.on_data(&mut uids).is_none());
        let ack = acks.on_data(&mut uids).unwrap();
        assert_eq!(ack.kind, PacketKind::Ack);
        assert_eq!(ack.header, header().reversed());
        assert_eq!(ack.size(), 40);
        assert!(acks.on_data(&mut uids).is_none());
    }
}
