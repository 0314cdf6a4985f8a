use order_pipeline_core::Envelope;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::time::Instant;

/// An envelope wrapper for delivery ordering
struct Scheduled {
    envelope: Envelope,
    seq: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: earliest eligible_at first, then arrival order (FIFO)
        other
            .envelope
            .eligible_at()
            .cmp(&self.envelope.eligible_at())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// What the queue can offer a worker right now
#[derive(Debug)]
pub enum Readiness {
    /// An envelope whose eligible-at has elapsed
    Due(Envelope),
    /// Nothing due yet; the earliest envelope becomes due at this instant
    NotBefore(Instant),
    Empty,
}

struct QueueState {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    in_flight: usize,
}

/// In-memory delay-gated queue of pending envelopes.
///
/// Envelopes handed out by [`ReadyQueue::pop_due`] count as in flight until
/// [`ReadyQueue::finish`] is called, so that idleness covers both pending and
/// running work under a single lock.
pub struct ReadyQueue {
    state: Mutex<QueueState>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        ReadyQueue {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                in_flight: 0,
            }),
        }
    }

    /// Push an envelope into the queue
    pub fn push(&self, envelope: Envelope) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Scheduled { envelope, seq });
    }

    /// Pop the earliest envelope if it is due at `now`
    pub fn pop_due(&self, now: Instant) -> Readiness {
        let mut state = self.state.lock();

        let eligible_at = match state.heap.peek() {
            Some(head) => head.envelope.eligible_at(),
            None => return Readiness::Empty,
        };

        if eligible_at > now {
            return Readiness::NotBefore(eligible_at);
        }

        match state.heap.pop() {
            Some(scheduled) => {
                state.in_flight += 1;
                Readiness::Due(scheduled.envelope)
            }
            None => Readiness::Empty,
        }
    }

    /// Mark one in-flight envelope as finished. Returns true if the queue is now idle.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.in_flight == 0 && state.heap.is_empty()
    }

    /// Get pending (not yet delivered) envelope count
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// No pending envelopes and none being handled
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.in_flight == 0 && state.heap.is_empty()
    }

    pub fn next_eligible_at(&self) -> Option<Instant> {
        self.state
            .lock()
            .heap
            .peek()
            .map(|s| s.envelope.eligible_at())
    }

    /// Pending envelopes in delivery order
    pub fn snapshot(&self) -> Vec<Envelope> {
        let state = self.state.lock();
        let mut items: Vec<(Instant, u64, Envelope)> = state
            .heap
            .iter()
            .map(|s| (s.envelope.eligible_at(), s.seq, s.envelope.clone()))
            .collect();
        items.sort_by_key(|(eligible_at, seq, _)| (*eligible_at, *seq));
        items.into_iter().map(|(_, _, envelope)| envelope).collect()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
