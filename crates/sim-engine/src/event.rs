//! Timestamped simulation events and the kernel's priority queue.
//!
//! At equal timestamps the kind decides the order: completions release
//! capacity before anything else, under-predictions revise the schedule
//! before new starts, and scheduler passes run last so they observe every
//! state change of the instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use swfsim_core::{JobId, Time};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A running job completed.
    JobTermination(JobId),
    /// A running job reached its predicted end without terminating.
    JobUnderPrediction(JobId),
    /// A job entered the system.
    JobSubmission(JobId),
    /// A scheduler decision starts a job now.
    JobStart(JobId),
    /// Run a scheduling pass.
    RunScheduler,
}

impl EventKind {
    fn priority(self) -> u8 {
        match self {
            EventKind::JobTermination(_) => 0,
            EventKind::JobUnderPrediction(_) => 1,
            EventKind::JobSubmission(_) => 2,
            EventKind::JobStart(_) => 3,
            EventKind::RunScheduler => 4,
        }
    }
}

/// A timestamped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// When the event fires.
    pub time: Time,
    /// What fires.
    pub kind: EventKind,
}

impl Event {
    /// Convenience constructor.
    pub fn new(time: Time, kind: EventKind) -> Self {
        Self { time, kind }
    }
}

#[derive(Debug)]
struct QueuedEvent {
    event: Event,
    seq: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the smallest (time, priority, seq).
        let lhs = (self.event.time, self.event.kind.priority(), self.seq);
        let rhs = (other.event.time, other.event.kind.priority(), other.seq);
        rhs.cmp(&lhs)
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of events ordered by `(time, kind priority, insertion order)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event.
    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent { event, seq });
    }

    /// Removes and returns the next event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_time_events_order_by_kind() {
        let mut q = EventQueue::new();
        q.push(Event::new(10, EventKind::RunScheduler));
        q.push(Event::new(10, EventKind::JobStart(3)));
        q.push(Event::new(10, EventKind::JobSubmission(2)));
        q.push(Event::new(10, EventKind::JobUnderPrediction(1)));
        q.push(Event::new(10, EventKind::JobTermination(0)));
        q.push(Event::new(5, EventKind::RunScheduler));

        let kinds: Vec<EventKind> = std::iter::from_fn(|| q.pop()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::RunScheduler, // t=5
                EventKind::JobTermination(0),
                EventKind::JobUnderPrediction(1),
                EventKind::JobSubmission(2),
                EventKind::JobStart(3),
                EventKind::RunScheduler,
            ]
        );
    }

    #[test]
    fn equal_events_keep_insertion_order() {
        let mut q = EventQueue::new();
        q.push(Event::new(7, EventKind::JobStart(1)));
        q.push(Event::new(7, EventKind::JobStart(2)));
        q.push(Event::new(7, EventKind::JobStart(3)));
        let ids: Vec<EventKind> = std::iter::from_fn(|| q.pop()).map(|e| e.kind).collect();
        assert_eq!(
            ids,
            vec![
                EventKind::JobStart(1),
                EventKind::JobStart(2),
                EventKind::JobStart(3)
            ]
        );
    }
}
