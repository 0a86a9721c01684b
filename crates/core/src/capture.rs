//! Packet capture tap.
//!
//! Nothing is written to disk. When enabled, every packet event is emitted as
//! a `trace` record under the `vidsim::capture` target and counted, so a
//! subscriber can filter the capture stream on its own.

use crate::link::Direction;
use crate::packet::Packet;
use crate::time::SimTime;
use tracing::trace;

/// Which end of the link saw the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePoint {
    Transmit,
    Receive,
}

#[derive(Debug, Default)]
pub struct CaptureTap {
    enabled: bool,
    captured: u64,
}

impl CaptureTap {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            captured: 0,
        }
    }

    pub fn record(&mut self, point: CapturePoint, direction: Direction, now: SimTime, packet: &Packet) {
        if !self.enabled {
            return;
        }
        self.captured += 1;
        trace!(
            target: "vidsim::capture",
            ?point,
            %direction,
            %now,
            uid = packet.uid,
            src = %packet.header.source,
            dst = %packet.header.destination,
            sport = packet.header.source_port,
            dport = packet.header.destination_port,
            size = packet.size(),
            kind = ?packet.kind,
        );
    }

    /// Packet events recorded so far.
    pub fn captured(&self) -> u64 {
        self.captured
    }
}
