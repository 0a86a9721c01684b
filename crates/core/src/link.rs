//! Point-to-point link between the server and client nodes.
//!
//! The link has two independent directions. Each direction puts one packet
//! on the wire at a time. A packet occupies the wire for its serialization
//! time (`size * 8 / rate`) and arrives after a further propagation delay.
//!
//! # Queueing
//!
//! Each direction has one bounded FIFO device queue shared by data and
//! acknowledgments. The sending socket moves data into it while there is
//! room, so a full queue pushes back into the socket buffer instead of
//! losing data. An acknowledgment that finds the queue full is dropped and
//! counted. Time spent waiting in the queue is part of a packet's delay.
//!
//! The link only computes timings; the simulation schedules the resulting
//! transmit-complete and delivery events.

use crate::packet::Packet;
use crate::time::SimTime;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Direction of travel over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    /// Client to server
    Uplink,
    /// Server to client
    Downlink,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Uplink, Direction::Downlink];

    pub fn reverse(self) -> Self {
        match self {
            Direction::Uplink => Direction::Downlink,
            Direction::Downlink => Direction::Uplink,
        }
    }

    fn index(self) -> usize {
        match self {
            Direction::Uplink => 0,
            Direction::Downlink => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Uplink => f.write_str("uplink"),
            Direction::Downlink => f.write_str("downlink"),
        }
    }
}

/// Configuration for the point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    /// Wire rate in bits per second
    pub data_rate_bps: u64,

    /// One-way propagation delay
    pub delay: Duration,

    /// Packets that may wait per direction, data and acknowledgments alike
    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            data_rate_bps: 100_000_000,
            delay: Duration::from_millis(10),
            queue_capacity: 100,
        }
    }
}

/// A packet placed on the wire.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub packet: Packet,

    /// When the last bit leaves the sender
    pub tx_complete: SimTime,

    /// When the last bit reaches the receiver
    pub arrival: SimTime,
}

/// Per-direction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub packets_transmitted: u64,
    pub bytes_transmitted: u64,
    pub queue_drops: u64,
}

#[derive(Debug, Default)]
struct Channel {
    queue: VecDeque<Packet>,
    busy: bool,
    stats: ChannelStats,
}

/// Full-duplex point-to-point link.
pub struct PointToPointLink {
    config: LinkConfig,
    channels: [Channel; 2],
}

impl PointToPointLink {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            channels: [Channel::default(), Channel::default()],
        }
    }

    /// Time the wire is occupied by `bytes`.
    pub fn serialization_time(&self, bytes: u32) -> Duration {
        let nanos = u128::from(bytes) * 8 * 1_000_000_000 / u128::from(self.config.data_rate_bps.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Whether `direction` can start a transmission right now.
    pub fn is_idle(&self, direction: Direction) -> bool {
        !self.channels[direction.index()].busy
    }

    /// Whether the device queue in `direction` can take another packet.
    pub fn has_room(&self, direction: Direction) -> bool {
        self.channels[direction.index()].queue.len() < self.config.queue_capacity
    }

    /// Packets waiting in the device queue of `direction`.
    pub fn queued(&self, direction: Direction) -> usize {
        self.channels[direction.index()].queue.len()
    }

    /// Queue a packet, returning it back if the queue is full.
    pub fn enqueue(&mut self, direction: Direction, packet: Packet) -> Result<(), Packet> {
        let channel = &mut self.channels[direction.index()];
        if channel.queue.len() >= self.config.queue_capacity {
            channel.stats.queue_drops += 1;
            return Err(packet);
        }
        channel.queue.push_back(packet);
        Ok(())
    }

    /// Take the next queued packet, if any.
    pub fn dequeue(&mut self, direction: Direction) -> Option<Packet> {
        self.channels[direction.index()].queue.pop_front()
    }

    /// Put `packet` on the wire at `now`.
    ///
    /// The caller must check [`is_idle`](Self::is_idle) first; the direction
    /// stays busy until [`complete`](Self::complete) is called.
    pub fn transmit(&mut self, direction: Direction, now: SimTime, packet: Packet) -> Transmission {
        let tx_complete = now + self.serialization_time(packet.size());
        let arrival = tx_complete + self.config.delay;

        let channel = &mut self.channels[direction.index()];
        debug_assert!(!channel.busy, "transmit on busy {direction} channel");
        channel.busy = true;
        channel.stats.packets_transmitted += 1;
        channel.stats.bytes_transmitted += u64::from(packet.size());

        Transmission {
            packet,
            tx_complete,
            arrival,
        }
    }

    /// Mark the current transmission in `direction` as finished.
    pub fn complete(&mut self, direction: Direction) {
        self.channels[direction.index()].busy = false;
    }

    pub fn stats(&self, direction: Direction) -> ChannelStats {
        self.channels[direction.index()].stats
    }
}
