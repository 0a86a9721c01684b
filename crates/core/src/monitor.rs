//! Per-flow statistics accumulator.
//!
//! The monitor classifies packets into flows and keeps, per flow:
//! - Packet and byte counters for both ends
//! - A delay histogram (one sample per received packet)
//! - A jitter histogram (one sample per received packet after the first)
//!
//! # In-flight tracking
//!
//! `track_send` remembers the send time of each packet by uid and
//! `track_receive` consumes that record, so memory is bounded by the packets
//! currently in flight. Packets that stay in flight longer than
//! `max_per_hop_delay` are declared lost by `check_for_lost_packets` and
//! their records are dropped.
//!
//! # Jitter order
//!
//! Jitter is `|delay(i) - delay(i-1)|` over packets in the order they are
//! received, the usual RTP-style definition. Each call updates the flow's
//! last delay, so every update completes within the event that observed it.
//!
//! # Unattributable samples
//!
//! A receive with no matching send record, or whose receive time precedes
//! its send time, is counted as unattributed and kept out of the rx counters
//! and histograms. When the uid matches a send from a different flow, the
//! sending flow's packet never arrives as itself, so it is counted lost.

use crate::classifier::{Classify, FlowKey, Ipv4FlowClassifier};
use crate::error::HistogramError;
use crate::histogram::Histogram;
use crate::packet::PacketHeader;
use crate::time::SimTime;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Histogram layout and loss detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub delay_bin_width: Duration,
    pub jitter_bin_width: Duration,

    /// Bins per histogram; the last one is open-ended
    pub bin_count: usize,

    /// Packets in flight longer than this are declared lost
    pub max_per_hop_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay_bin_width: Duration::from_millis(1),
            jitter_bin_width: Duration::from_millis(1),
            bin_count: 1000,
            max_per_hop_delay: Duration::from_secs(10),
        }
    }
}

/// Send and receive timestamps of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDelaySample {
    pub sent_at: SimTime,
    pub received_at: SimTime,
}

impl PacketDelaySample {
    /// One-way delay, or `None` if the receive precedes the send.
    pub fn delay(&self) -> Option<Duration> {
        self.received_at.checked_since(self.sent_at)
    }
}

/// Accumulated statistics for one flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub unattributed_packets: u64,
    pub delay_sum: Duration,
    pub jitter_sum: Duration,
    pub first_tx: Option<SimTime>,
    pub last_tx: Option<SimTime>,
    pub first_rx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
    pub delay_histogram: Histogram,
    pub jitter_histogram: Histogram,
    #[serde(skip)]
    last_delay: Option<Duration>,
}

impl FlowRecord {
    fn new(delay_histogram: Histogram, jitter_histogram: Histogram) -> Self {
        Self {
            tx_packets: 0,
            tx_bytes: 0,
            rx_packets: 0,
            rx_bytes: 0,
            lost_packets: 0,
            unattributed_packets: 0,
            delay_sum: Duration::ZERO,
            jitter_sum: Duration::ZERO,
            first_tx: None,
            last_tx: None,
            first_rx: None,
            last_rx: None,
            delay_histogram,
            jitter_histogram,
            last_delay: None,
        }
    }

    /// Mean delay over received packets.
    pub fn mean_delay(&self) -> Option<Duration> {
        let n = u32::try_from(self.rx_packets).ok().filter(|&n| n > 0)?;
        Some(self.delay_sum / n)
    }

    /// Mean jitter over received packets after the first.
    pub fn mean_jitter(&self) -> Option<Duration> {
        let n = u32::try_from(self.rx_packets.saturating_sub(1)).ok().filter(|&n| n > 0)?;
        Some(self.jitter_sum / n)
    }
}

/// A flow as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEntry {
    /// Sequential id, starting at 1, in order of first observation
    pub id: u32,
    pub key: FlowKey,
    pub record: FlowRecord,
}

/// Read-only copy of the monitor state, taken after the run drains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSnapshot {
    pub flows: Vec<FlowEntry>,

    /// Receives that matched no send record
    pub unattributed: u64,

    /// Packets still in flight when the snapshot was taken
    pub in_flight: u64,
}

impl FlowSnapshot {
    pub fn flow(&self, key: &FlowKey) -> Option<&FlowEntry> {
        self.flows.iter().find(|f| &f.key == key)
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedPacket {
    key: FlowKey,
    sent_at: SimTime,
}

/// Flow classifier plus per-flow accumulators.
pub struct FlowMonitor<C = Ipv4FlowClassifier> {
    classifier: C,
    config: MonitorConfig,
    delay_template: Histogram,
    jitter_template: Histogram,

    /// Flows in order of first observation
    flows: Vec<(FlowKey, FlowRecord)>,
    index: HashMap<FlowKey, usize>,

    /// Packets sent but not yet received or declared lost, by uid
    in_flight: HashMap<u64, TrackedPacket>,
    unattributed: u64,
}

impl<C: Classify> FlowMonitor<C> {
    /// # Errors
    /// Returns a `HistogramError` if the configured bin layout is invalid.
    pub fn new(classifier: C, config: MonitorConfig) -> Result<Self, HistogramError> {
        Ok(Self {
            classifier,
            delay_template: Histogram::new(config.delay_bin_width, config.bin_count)?,
            jitter_template: Histogram::new(config.jitter_bin_width, config.bin_count)?,
            config,
            flows: Vec::new(),
            index: HashMap::new(),
            in_flight: HashMap::new(),
            unattributed: 0,
        })
    }

    /// Count a sent packet against `key`.
    pub fn on_send(&mut self, key: FlowKey, size_bytes: u32, now: SimTime) {
        let record = self.record_mut(key);
        record.tx_packets += 1;
        record.tx_bytes += u64::from(size_bytes);
        record.first_tx.get_or_insert(now);
        record.last_tx = Some(now);
    }

    /// Count a received packet against `key` and deposit its delay and jitter.
    ///
    /// Returns the delay, or `None` if the sample was unattributable.
    pub fn on_receive(&mut self, key: FlowKey, size_bytes: u32, sample: PacketDelaySample) -> Option<Duration> {
        let Some(delay) = sample.delay() else {
            self.record_unattributed(key);
            return None;
        };

        let record = self.record_mut(key);
        if let (true, Some(last)) = (record.rx_packets > 0, record.last_delay) {
            let jitter = if delay > last { delay - last } else { last - delay };
            record.jitter_sum += jitter;
            record.jitter_histogram.add(jitter);
        }
        record.last_delay = Some(delay);

        record.rx_packets += 1;
        record.rx_bytes += u64::from(size_bytes);
        record.delay_sum += delay;
        record.delay_histogram.add(delay);
        record.first_rx.get_or_insert(sample.received_at);
        record.last_rx = Some(sample.received_at);

        Some(delay)
    }

    /// Classify `header`, count the send, and remember the packet by `uid`.
    pub fn track_send(&mut self, header: &PacketHeader, uid: u64, size_bytes: u32, now: SimTime) {
        let key = self.classifier.classify(header);
        self.on_send(key, size_bytes, now);
        self.in_flight.insert(uid, TrackedPacket { key, sent_at: now });
    }

    /// Classify `header` and match the receive against its send record.
    pub fn track_receive(&mut self, header: &PacketHeader, uid: u64, size_bytes: u32, now: SimTime) -> Option<Duration> {
        let key = self.classifier.classify(header);
        match self.in_flight.remove(&uid) {
            Some(tracked) if tracked.key == key => {
                let sample = PacketDelaySample {
                    sent_at: tracked.sent_at,
                    received_at: now,
                };
                self.on_receive(key, size_bytes, sample)
            }
            Some(tracked) => {
                self.record_mut(tracked.key).lost_packets += 1;
                self.record_unattributed(key);
                None
            }
            None => {
                self.record_unattributed(key);
                None
            }
        }
    }

    /// Declare packets in flight longer than `max_per_hop_delay` lost.
    ///
    /// Returns how many packets were declared lost.
    pub fn check_for_lost_packets(&mut self, now: SimTime) -> u64 {
        let max = self.config.max_per_hop_delay;
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, t)| now - t.sent_at > max)
            .map(|(&uid, _)| uid)
            .collect();

        for uid in &expired {
            if let Some(tracked) = self.in_flight.remove(uid) {
                self.record_mut(tracked.key).lost_packets += 1;
            }
        }

        expired.len() as u64
    }

    pub fn packets_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn unattributed(&self) -> u64 {
        self.unattributed
    }

    pub fn flow(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.index.get(key).map(|&i| &self.flows[i].1)
    }

    /// Copy of every flow in first-observation order.
    pub fn snapshot(&self) -> FlowSnapshot {
        let flows = self
            .flows
            .iter()
            .enumerate()
            .map(|(i, (key, record))| FlowEntry {
                id: i as u32 + 1,
                key: *key,
                record: record.clone(),
            })
            .collect();

        FlowSnapshot {
            flows,
            unattributed: self.unattributed,
            in_flight: self.in_flight.len() as u64,
        }
    }

    fn record_unattributed(&mut self, key: FlowKey) {
        self.unattributed += 1;
        self.record_mut(key).unattributed_packets += 1;
        warn!(flow = %key, "receive without a matching send, sample excluded");
    }

    fn record_mut(&mut self, key: FlowKey) -> &mut FlowRecord {
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let record = FlowRecord::new(self.delay_template.clone(), self.jitter_template.clone());
                self.flows.push((key, record));
                self.index.insert(key, self.flows.len() - 1);
                self.flows.len() - 1
            }
        };
        &mut self.flows[i].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Protocol;
    use std::net::Ipv4Addr;

    fn header(port: u16) -> PacketHeader {
        PacketHeader {
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(10, 1, 1, 2),
            source_port: 49153,
            destination_port: port,
            protocol: Protocol::Tcp,
        }
    }

    fn monitor() -> FlowMonitor {
        FlowMonitor::new(Ipv4FlowClassifier, MonitorConfig::default()).unwrap()
    }

    fn ms(n: u64) -> SimTime {
        SimTime::from_nanos(n * 1_000_000)
    }

    #[test]
    fn test_counters() {
        let mut m = monitor();
        let h = header(60000);

        m.track_send(&h, 0, 1500, ms(0));
        m.track_send(&h, 1, 500, ms(1));
        m.track_receive(&h, 0, 1500, ms(10));

        let record = m.flow(&Ipv4FlowClassifier.classify(&h)).unwrap();
        assert_eq!((record.tx_packets, record.tx_bytes), (2, 2000));
        assert_eq!((record.rx_packets, record.rx_bytes), (1, 1500));
        assert_eq!(m.packets_in_flight(), 1);
    }

    #[test]
    fn test_delay_and_jitter() {
        let mut m = monitor();
        let h = header(60000);
        let us = |n: u64| SimTime::from_nanos(n * 1_000);

        // Delays 10.5, 13.9, 11.5 ms in receive order
        m.track_send(&h, 0, 100, ms(0));
        m.track_send(&h, 1, 100, ms(1));
        m.track_send(&h, 2, 100, ms(2));
        assert_eq!(m.track_receive(&h, 0, 100, us(10_500)), Some(Duration::from_micros(10_500)));
        m.track_receive(&h, 2, 100, us(13_500));
        m.track_receive(&h, 1, 100, us(14_900));

        let record = m.flow(&Ipv4FlowClassifier.classify(&h)).unwrap();
        assert_eq!(record.delay_sum, Duration::from_micros(10_500 + 11_500 + 13_900));
        // |11.5 - 10.5| + |13.9 - 11.5|
        assert_eq!(record.jitter_sum, Duration::from_micros(1_000 + 2_400));
        assert_eq!(record.delay_histogram.count(10), 1);
        assert_eq!(record.delay_histogram.count(11), 1);
        assert_eq!(record.delay_histogram.count(13), 1);
        assert_eq!(record.jitter_histogram.count(1), 1);
        assert_eq!(record.jitter_histogram.count(2), 1);
        assert_eq!(record.mean_delay(), Some(Duration::from_micros(11_966) + Duration::from_nanos(666)));
        assert_eq!(record.mean_jitter(), Some(Duration::from_micros(1_700)));
    }

    #[test]
    fn test_histogram_count_invariants() {
        let mut m = monitor();
        let h = header(60000);

        for uid in 0..50u64 {
            m.track_send(&h, uid, 1000, ms(uid));
        }
        // Receive in a shuffled order with varying delay
        for uid in (0..50u64).rev() {
            m.track_receive(&h, uid, 1000, ms(uid + 10 + uid % 7));
        }

        let snapshot = m.snapshot();
        let record = &snapshot.flows[0].record;
        assert_eq!(record.delay_histogram.total(), record.rx_packets);
        assert_eq!(record.jitter_histogram.total(), record.rx_packets - 1);
    }

    #[test]
    fn test_unknown_uid_is_unattributed() {
        let mut m = monitor();
        let h = header(60000);

        assert_eq!(m.track_receive(&h, 42, 100, ms(5)), None);

        let record = m.flow(&Ipv4FlowClassifier.classify(&h)).unwrap();
        assert_eq!(record.rx_packets, 0);
        assert_eq!(record.unattributed_packets, 1);
        assert_eq!(record.delay_histogram.total(), 0);
        assert_eq!(m.unattributed(), 1);
    }

    #[test]
    fn test_negative_delay_is_unattributed() {
        let mut m = monitor();
        let key = Ipv4FlowClassifier.classify(&header(60000));
        let sample = PacketDelaySample {
            sent_at: ms(10),
            received_at: ms(5),
        };

        assert_eq!(m.on_receive(key, 100, sample), None);
        assert_eq!(m.snapshot().unattributed, 1);
        assert_eq!(m.flow(&key).unwrap().rx_packets, 0);
    }

    #[test]
    fn test_mismatched_flow_is_unattributed() {
        let mut m = monitor();
        m.track_send(&header(60000), 7, 100, ms(0));

        assert_eq!(m.track_receive(&header(50000), 7, 100, ms(10)), None);
        assert_eq!(m.unattributed(), 1);
        assert_eq!(m.packets_in_flight(), 0);

        // The sender's packet is charged as lost, the receiver's as unattributed
        let sender = m.flow(&Ipv4FlowClassifier.classify(&header(60000))).unwrap();
        assert_eq!((sender.tx_packets, sender.lost_packets, sender.rx_packets), (1, 1, 0));
        let receiver = m.flow(&Ipv4FlowClassifier.classify(&header(50000))).unwrap();
        assert_eq!((receiver.unattributed_packets, receiver.lost_packets), (1, 0));
    }

    #[test]
    fn test_delay_on_bin_edge() {
        let mut m = monitor();
        let h = header(60000);
        m.track_send(&h, 0, 100, ms(0));
        m.track_receive(&h, 0, 100, ms(43));

        let record = m.flow(&Ipv4FlowClassifier.classify(&h)).unwrap();
        assert_eq!(record.delay_histogram.count(43), 1);
    }

    #[test]
    fn test_flows_in_first_observation_order() {
        let mut m = monitor();
        m.track_send(&header(60000), 0, 100, ms(0));
        m.track_send(&header(50000), 1, 100, ms(0));
        m.track_send(&header(60000), 2, 100, ms(1));

        let snapshot = m.snapshot();
        let ports: Vec<_> = snapshot.flows.iter().map(|f| (f.id, f.key.destination_port)).collect();
        assert_eq!(ports, vec![(1, 60000), (2, 50000)]);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut m = monitor();
        let h = header(60000);
        m.track_send(&h, 0, 100, ms(0));
        m.track_receive(&h, 0, 100, ms(10));

        assert_eq!(m.snapshot(), m.snapshot());
    }

    #[test]
    fn test_lost_packets() {
        let mut m = monitor();
        let h = header(60000);
        m.track_send(&h, 0, 100, ms(0));
        m.track_send(&h, 1, 100, ms(5000));

        assert_eq!(m.check_for_lost_packets(ms(10_001)), 1);
        assert_eq!(m.packets_in_flight(), 1);

        // A late arrival of the lost packet no longer matches
        assert_eq!(m.track_receive(&h, 0, 100, ms(10_002)), None);

        let record = m.flow(&Ipv4FlowClassifier.classify(&h)).unwrap();
        assert_eq!(record.lost_packets, 1);
        assert_eq!(record.tx_packets, 2);
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let config = MonitorConfig {
            bin_count: 0,
            ..MonitorConfig::default()
        };
        assert!(FlowMonitor::new(Ipv4FlowClassifier, config).is_err());
    }
}
