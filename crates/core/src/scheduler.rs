//! Discrete-event queue driving the virtual clock.
//!
//! Events are kept in a priority queue (min-heap) keyed by their scheduled
//! virtual time. Popping an event advances the clock to that time.
//!
//! # Ordering
//!
//! Events scheduled for the same instant pop in the order they were
//! submitted. Each event carries a monotonically increasing sequence number
//! that breaks ties, so a run replays identically given the same inputs.
//!
//! # Cancellation
//!
//! `cancel` marks an event id; cancelled events are skipped when they reach
//! the head of the queue.

use crate::time::SimTime;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Handle to a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// An event with its scheduled time.
///
/// Used internally by the queue's heap.
#[derive(Debug)]
struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

// Implement ordering for the heap (min-heap: earliest time, then lowest seq)
impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earlier time = higher priority)
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-threaded event queue with a virtual clock.
///
/// # Thread Safety
/// Not thread-safe; the simulation owns exactly one instance.
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    cancelled: HashSet<u64>,
    now: SimTime,
    next_seq: u64,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            now: SimTime::ZERO,
            next_seq: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `event` at virtual time `at`.
    ///
    /// Times in the past are clamped to `now`, so the clock never runs
    /// backwards.
    pub fn schedule(&mut self, at: SimTime, event: E) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            at: at.max(self.now),
            seq,
            event,
        });
        EventId(seq)
    }

    /// Cancel a pending event. Cancelling an event that already ran is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        if self.heap.iter().any(|s| s.seq == id.0) {
            self.cancelled.insert(id.0);
        }
    }

    /// Pop the next live event and advance the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        while let Some(next) = self.heap.pop() {
            if self.cancelled.remove(&next.seq) {
                continue;
            }
            self.now = next.at;
            return Some((next.at, next.event));
        }
        None
    }

    /// Number of live events still queued.
    pub fn pending(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Drop every queued event, returning how many live events were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending();
        self.heap.clear();
        self.cancelled.clear();
        discarded
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
