//! Timed wake-up queue.
//!
//! Events are ordered by `(time, class, key)`. All events of one time point
//! and class are popped together and run as one delta cycle; clock
//! generators form their own class ahead of every other wake-up, so the
//! edges they produce have propagated before testbenches observe the time
//! point.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Scheduling class of a timed event. Lower classes run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventClass {
    /// A clock generator toggling its clock.
    ClockEdge,
    /// Any other process resuming after a delay.
    Wake,
}

/// A process to resume at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event {
    /// Absolute time in femtoseconds.
    pub time_fs: u64,
    /// Scheduling class.
    pub class: EventClass,
    /// Tie-break key derived from the process's registration index.
    pub key: usize,
    /// Index of the process to resume.
    pub process: usize,
}

/// Min-heap of pending events.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event.
    pub fn push(&mut self, event: Event) {
        self.heap.push(Reverse(event));
    }

    /// Returns the time of the earliest event.
    pub fn peek_time(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.time_fs)
    }

    /// Pops every event at `time_fs` that shares the lowest pending class,
    /// in key order. Returns an empty list if the earliest event is later.
    pub fn pop_group(&mut self, time_fs: u64) -> Vec<Event> {
        let mut group = Vec::new();
        let Some(class) = self
            .heap
            .peek()
            .filter(|Reverse(e)| e.time_fs == time_fs)
            .map(|Reverse(e)| e.class)
        else {
            return group;
        };
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.time_fs != time_fs || next.class != class {
                break;
            }
            if let Some(Reverse(event)) = self.heap.pop() {
                group.push(event);
            }
        }
        group
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(time_fs: u64, class: EventClass, key: usize) -> Event {
        Event {
            time_fs,
            class,
            key,
            process: key,
        }
    }

    #[test]
    fn groups_by_time_then_class() {
        let mut q = EventQueue::new();
        q.push(ev(10, EventClass::Wake, 2));
        q.push(ev(10, EventClass::ClockEdge, 5));
        q.push(ev(5, EventClass::Wake, 9));
        q.push(ev(10, EventClass::Wake, 0));
        q.push(ev(10, EventClass::ClockEdge, 1));

        assert_eq!(q.peek_time(), Some(5));
        assert!(q.pop_group(10).is_empty());
        assert_eq!(q.pop_group(5), vec![ev(5, EventClass::Wake, 9)]);

        let clocks = q.pop_group(10);
        assert_eq!(
            clocks,
            vec![ev(10, EventClass::ClockEdge, 1), ev(10, EventClass::ClockEdge, 5)]
        );
        let wakes: Vec<usize> = q.pop_group(10).iter().map(|e| e.key).collect();
        assert_eq!(wakes, vec![0, 2]);
        assert!(q.is_empty());
        assert_eq!(q.peek_time(), None);
    }

    #[test]
    fn empty_queue_pops_nothing() {
        let mut q = EventQueue::new();
        assert!(q.pop_group(0).is_empty());
        assert_eq!(q.len(), 0);
    }
}
