//! Simulation context: topology, event loop and teardown.
//!
//! A `Simulation` owns every component of one run: the event queue and its
//! clock, the link, one video generator per enabled direction, and the flow
//! monitor. Its lifecycle is build, run, snapshot/report, drop.
//!
//! # Topology
//!
//! ```text
//!   server 10.1.1.1                          client 10.1.1.2
//!   :49153 ---------- downlink video ------> :60000
//!   :50000 <--------- uplink video --------- :49153
//! ```
//!
//! With TCP each receiver answers data with pure ACKs on the reverse
//! 5-tuple, which shows up in the report as a separate flow per direction.
//!
//! # Send path
//!
//! A frame's segments go to the direction's socket, back-to-back or spaced
//! by a [`SegmentPacer`]. The socket hands wire packets to the link device
//! queue while it has room; a packet counts as sent when it enters that
//! queue, so queueing delay is part of the measured delay.
//!
//! # Event order
//!
//! Events are processed in virtual-time order, ties in submission order.
//! The stop event is submitted at build time, so it runs before anything
//! scheduled later for the same instant. At stop every generator cancels its
//! pending tick, both sockets close, the rest of the queue is discarded and
//! the monitor runs its lost-packet check.

use crate::capture::{CapturePoint, CaptureTap};
use crate::classifier::{Classify, FlowKey, Ipv4FlowClassifier};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::link::{ChannelStats, Direction, PointToPointLink};
use crate::monitor::{FlowMonitor, FlowSnapshot};
use crate::packet::{Packet, PacketHeader, PacketKind, Protocol, UidAllocator};
use crate::report::{Diagnostics, GeneratorReport, Report, RunParameters};
use crate::scheduler::EventQueue;
use crate::time::SimTime;
use crate::traffic::{DispatchOutcome, FrameSizeSampler, GeneratorStats, SegmentPacer, Segmenter, VideoSource};
use crate::transport::{AckGenerator, StreamSocket};
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

pub const SERVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
pub const CLIENT_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

/// Sink port of uplink video on the server.
pub const UPLINK_PORT: u16 = 50000;

/// Sink port of downlink video on the client.
pub const DOWNLINK_PORT: u16 = 60000;

/// Source port used by both video senders.
pub const SENDER_PORT: u16 = 49153;

#[derive(Debug)]
enum Event {
    FrameTick(Direction),
    SegmentTx(Direction),
    TxComplete(Direction),
    Deliver(Direction, Packet),
    Stop,
}

/// Header of video data travelling in `direction`.
pub fn data_header(direction: Direction, protocol: Protocol) -> PacketHeader {
    let (source, destination, destination_port) = match direction {
        Direction::Uplink => (CLIENT_ADDRESS, SERVER_ADDRESS, UPLINK_PORT),
        Direction::Downlink => (SERVER_ADDRESS, CLIENT_ADDRESS, DOWNLINK_PORT),
    };
    PacketHeader {
        source,
        destination,
        source_port: SENDER_PORT,
        destination_port,
        protocol,
    }
}

/// Seed of the generator in `direction`, so the two never share a stream.
fn generator_seed(seed: u64, direction: Direction) -> u64 {
    let lane = match direction {
        Direction::Uplink => 0,
        Direction::Downlink => 1,
    };
    seed.wrapping_mul(2).wrapping_add(lane)
}

fn warn_on_failure(direction: Direction, outcome: &DispatchOutcome) {
    if let Some(error) = outcome.error {
        warn!(
            %direction,
            failed_segments = outcome.failed,
            failed_bytes = outcome.failed_bytes,
            %error,
            "segment send failed"
        );
    }
}

/// Sender, socket and receiver-side acknowledgments of one direction.
struct Generator {
    direction: Direction,
    source: VideoSource,
    pacer: Option<SegmentPacer>,
    socket: StreamSocket,
    acks: Option<AckGenerator>,
}

/// Built topology, handed out for flow lookups.
#[derive(Debug, Clone)]
pub struct Topology {
    classifier: Ipv4FlowClassifier,
    protocol: Protocol,
    directions: Vec<Direction>,
}

impl Topology {
    pub fn classifier(&self) -> &Ipv4FlowClassifier {
        &self.classifier
    }

    /// Directions with a video generator.
    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// Key of the video flow in `direction`, if that direction is enabled.
    pub fn data_flow(&self, direction: Direction) -> Option<FlowKey> {
        self.directions
            .contains(&direction)
            .then(|| self.classifier.classify(&data_header(direction, self.protocol)))
    }

    /// Key of the acknowledgment flow answering video in `direction`.
    pub fn ack_flow(&self, direction: Direction) -> Option<FlowKey> {
        if self.protocol != Protocol::Tcp {
            return None;
        }
        self.data_flow(direction).map(|key| key.reversed())
    }
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Virtual time at which the run stopped
    pub end_time: SimTime,

    pub events_processed: u64,

    /// Pending events dropped at stop
    pub discarded_events: u64,

    /// Packets declared lost by the final check
    pub lost_packets: u64,
}

/// One configured simulation run.
pub struct Simulation {
    config: SimulationConfig,
    topology: Topology,
    queue: EventQueue<Event>,
    link: PointToPointLink,
    segmenter: Segmenter,
    generators: Vec<Generator>,
    monitor: FlowMonitor,
    uids: UidAllocator,
    capture: CaptureTap,
    summary: Option<RunSummary>,
}

impl Simulation {
    /// Build the topology and schedule the first frame of every generator.
    ///
    /// # Errors
    /// Returns an error if a component rejects its part of `config`.
    pub fn build(config: SimulationConfig) -> Result<Self> {
        let monitor = FlowMonitor::new(Ipv4FlowClassifier, config.monitor)?;
        let segmenter = Segmenter::new(config.max_segment_bytes)?;
        let protocol = config.transport.protocol;
        let stop = SimTime::from(config.duration);

        let mut queue = EventQueue::new();
        queue.schedule(stop, Event::Stop);

        let enabled = [(Direction::Uplink, config.uplink), (Direction::Downlink, config.downlink)];
        let mut generators = Vec::new();
        for direction in enabled.into_iter().filter(|(_, on)| *on).map(|(d, _)| d) {
            let seed = generator_seed(config.seed, direction);
            let sampler = FrameSizeSampler::new(
                config.quality.scale(),
                config.quality.shape(),
                config.max_frame_bytes,
                seed,
            )?;
            let pacer = config
                .jitter
                .map(|jitter| SegmentPacer::new(jitter, config.frame_interval, seed))
                .transpose()?;
            info!(
                %direction,
                quality = %config.quality,
                mean_frame_bytes = sampler.mean(),
                paced = pacer.is_some(),
                "video generator configured"
            );

            let header = data_header(direction, protocol);
            let mut source = VideoSource::new(sampler, config.frame_interval, SimTime::ZERO, stop);
            source.schedule_next(&mut queue, Event::FrameTick(direction));

            generators.push(Generator {
                direction,
                source,
                pacer,
                socket: StreamSocket::new(header, &config.transport),
                acks: (protocol == Protocol::Tcp).then(|| AckGenerator::new(&header, config.transport.ack_every)),
            });
        }
        if generators.is_empty() {
            warn!("no video direction enabled, the run will carry no traffic");
        }

        let topology = Topology {
            classifier: Ipv4FlowClassifier,
            protocol,
            directions: generators.iter().map(|g| g.direction).collect(),
        };
        info!(
            duration = %stop,
            rate_bps = config.link.data_rate_bps,
            delay_ms = config.link.delay.as_secs_f64() * 1000.0,
            %protocol,
            "topology built"
        );

        Ok(Self {
            link: PointToPointLink::new(config.link),
            capture: CaptureTap::new(config.capture),
            config,
            topology,
            queue,
            segmenter,
            generators,
            monitor,
            uids: UidAllocator::new(),
            summary: None,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Run until the stop event. Calling it again returns the same summary.
    pub fn run(&mut self) -> RunSummary {
        if let Some(summary) = self.summary {
            return summary;
        }
        info!(generators = self.generators.len(), "simulation started");

        let mut events_processed = 0;
        let mut summary = None;
        while let Some((now, event)) = self.queue.pop() {
            events_processed += 1;
            match event {
                Event::FrameTick(direction) => self.on_frame_tick(direction, now),
                Event::SegmentTx(direction) => self.on_segment_tx(direction, now),
                Event::TxComplete(direction) => {
                    self.link.complete(direction);
                    self.fill(direction, now);
                }
                Event::Deliver(direction, packet) => self.on_deliver(direction, packet, now),
                Event::Stop => {
                    summary = Some(self.stop(now, events_processed));
                    break;
                }
            }
        }

        // The stop event is scheduled at build, so this only covers an empty queue
        let summary = summary.unwrap_or(RunSummary {
            end_time: self.queue.now(),
            events_processed,
            discarded_events: 0,
            lost_packets: 0,
        });
        self.summary = Some(summary);
        summary
    }

    /// Copy of the flow statistics. Meaningful once [`run`](Self::run) returned.
    pub fn snapshot(&self) -> FlowSnapshot {
        self.monitor.snapshot()
    }

    pub fn generator_stats(&self, direction: Direction) -> Option<GeneratorStats> {
        self.generator(direction).map(|g| g.source.stats())
    }

    pub fn link_stats(&self, direction: Direction) -> ChannelStats {
        self.link.stats(direction)
    }

    /// Full end-of-run report.
    pub fn report(&self) -> Report {
        let ack_drops = Direction::ALL.iter().map(|&d| self.link.stats(d).queue_drops).sum();
        Report {
            parameters: RunParameters::from(&self.config),
            flows: self.snapshot(),
            generators: self
                .generators
                .iter()
                .map(|g| GeneratorReport {
                    direction: g.direction,
                    stats: g.source.stats(),
                    socket: g.socket.stats(),
                })
                .collect(),
            diagnostics: Diagnostics {
                unattributed: self.monitor.unattributed(),
                ack_drops,
                discarded_events: self.summary.map_or(0, |s| s.discarded_events),
                captured_events: self.capture.captured(),
            },
        }
    }

    fn generator(&self, direction: Direction) -> Option<&Generator> {
        self.generators.iter().find(|g| g.direction == direction)
    }

    fn on_frame_tick(&mut self, direction: Direction, now: SimTime) {
        let Some(generator) = self.generators.iter_mut().find(|g| g.direction == direction) else {
            return;
        };

        let job = generator.source.emit_frame(now);
        match generator.pacer.as_mut() {
            Some(pacer) => {
                pacer.push_frame(self.segmenter.segments(job.size_bytes));
                pacer.schedule_next(&mut self.queue, now, Event::SegmentTx(direction));
            }
            None => {
                let outcome = self.segmenter.dispatch(&job, &mut generator.socket);
                warn_on_failure(direction, &outcome);
                generator.source.record_dispatch(&outcome);
            }
        }
        generator.source.schedule_next(&mut self.queue, Event::FrameTick(direction));

        self.fill(direction, now);
    }

    /// Send the paced segment that is due and schedule the one after it.
    fn on_segment_tx(&mut self, direction: Direction, now: SimTime) {
        let Some(generator) = self.generators.iter_mut().find(|g| g.direction == direction) else {
            return;
        };
        let Some(pacer) = generator.pacer.as_mut() else {
            return;
        };

        if let Some(size) = pacer.next_segment() {
            let outcome = self.segmenter.dispatch_segment(size, &mut generator.socket);
            warn_on_failure(direction, &outcome);
            generator.source.record_dispatch(&outcome);
        }
        pacer.schedule_next(&mut self.queue, now, Event::SegmentTx(direction));

        self.fill(direction, now);
    }

    fn on_deliver(&mut self, direction: Direction, packet: Packet, now: SimTime) {
        self.capture.record(CapturePoint::Receive, direction, now, &packet);
        self.monitor
            .track_receive(&packet.header, packet.uid, packet.size(), now);

        if packet.kind != PacketKind::Data {
            return;
        }
        let ack = self
            .generators
            .iter_mut()
            .find(|g| g.direction == direction)
            .and_then(|g| g.acks.as_mut())
            .and_then(|acks| acks.on_data(&mut self.uids));

        if let Some(ack) = ack {
            let reverse = direction.reverse();
            let (header, uid, size) = (ack.header, ack.uid, ack.size());
            match self.link.enqueue(reverse, ack) {
                Ok(()) => {
                    self.monitor.track_send(&header, uid, size, now);
                    self.start_transmission(reverse, now);
                }
                Err(_) => warn!(direction = %reverse, uid, "device queue full, ACK dropped"),
            }
        }
    }

    /// Move data from the socket into the device queue while it has room,
    /// then start the wire if it is idle.
    ///
    /// Data is counted as sent when it enters the device queue.
    fn fill(&mut self, direction: Direction, now: SimTime) {
        if let Some(generator) = self.generators.iter_mut().find(|g| g.direction == direction) {
            while self.link.has_room(direction) {
                let Some(packet) = generator.socket.next_packet(&mut self.uids) else {
                    break;
                };
                let (header, uid, size) = (packet.header, packet.uid, packet.size());
                if self.link.enqueue(direction, packet).is_err() {
                    break;
                }
                self.monitor.track_send(&header, uid, size, now);
            }
        }
        self.start_transmission(direction, now);
    }

    /// Put the head of the device queue on the wire if the wire is free.
    fn start_transmission(&mut self, direction: Direction, now: SimTime) {
        if !self.link.is_idle(direction) {
            return;
        }
        let Some(packet) = self.link.dequeue(direction) else {
            return;
        };

        self.capture.record(CapturePoint::Transmit, direction, now, &packet);
        let tx = self.link.transmit(direction, now, packet);
        self.queue.schedule(tx.tx_complete, Event::TxComplete(direction));
        self.queue.schedule(tx.arrival, Event::Deliver(direction, tx.packet));
    }

    fn stop(&mut self, now: SimTime, events_processed: u64) -> RunSummary {
        for generator in &mut self.generators {
            generator.source.stop(&mut self.queue);
            let unpaced_bytes = generator.pacer.as_mut().map_or(0, |p| p.stop(&mut self.queue));
            generator.socket.close();
            debug!(
                direction = %generator.direction,
                unpaced_bytes,
                unsent_bytes = generator.socket.unsent_bytes(),
                queued_packets = self.link.queued(generator.direction),
                "generator stopped"
            );
        }

        let discarded_events = self.queue.clear() as u64;
        let lost_packets = self.monitor.check_for_lost_packets(now);
        let summary = RunSummary {
            end_time: now,
            events_processed,
            discarded_events,
            lost_packets,
        };
        info!(
            end = %now,
            events_processed,
            discarded_events,
            lost_packets,
            in_flight = self.monitor.packets_in_flight(),
            "simulation stopped"
        );
        summary
    }
}
