//! Completion event queue
//!
//! Pending test completions ordered by `(ready_time, passed, submission,
//! test)`. At equal ready time failures come out before successes; the
//! ids break the remaining ties, so release order is fully deterministic.

use std::collections::BTreeSet;

use arbiter_core::{SubmissionId, TestId, TestResult};
use serde::{Deserialize, Serialize};

/// A test that completes at `ready_time`
///
/// Field order is the ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub ready_time: i64,
    pub passed: bool,
    pub submission: SubmissionId,
    pub test: TestId,
}

impl CompletionEvent {
    pub fn new(ready_time: i64, passed: bool, submission: SubmissionId, test: TestId) -> Self {
        CompletionEvent {
            ready_time,
            passed,
            submission,
            test,
        }
    }

    pub fn is_due(&self, current_time: i64) -> bool {
        self.ready_time <= current_time
    }

    pub fn result(&self) -> TestResult {
        TestResult {
            submission: self.submission,
            test: self.test,
            passed: self.passed,
        }
    }
}

/// Ordered set of pending completions
///
/// Identical events collapse into one, so a test requested twice with the
/// same completion time is announced once.
#[derive(Debug, Clone, Default)]
pub struct CompletionQueue {
    events: BTreeSet<CompletionEvent>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one event; false if an identical event was already pending
    pub fn schedule(&mut self, event: CompletionEvent) -> bool {
        self.events.insert(event)
    }

    pub fn peek(&self) -> Option<&CompletionEvent> {
        self.events.first()
    }

    pub fn pop(&mut self) -> Option<CompletionEvent> {
        self.events.pop_first()
    }

    /// Whether the minimum event is due, without removing it
    pub fn has_due(&self, current_time: i64) -> bool {
        self.peek().is_some_and(|event| event.is_due(current_time))
    }

    /// Remove the minimum event if it is due
    pub fn pop_due(&mut self, current_time: i64) -> Option<CompletionEvent> {
        if self.has_due(current_time) {
            self.pop()
        } else {
            None
        }
    }

    /// Lazily remove due events in order
    ///
    /// Each event is removed only when the iterator is advanced, so the
    /// caller can apply its side effects before the next one is taken.
    pub fn drain_due(&mut self, current_time: i64) -> DueEvents<'_> {
        DueEvents {
            queue: self,
            current_time,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Iterator returned by [`CompletionQueue::drain_due`]
pub struct DueEvents<'a> {
    queue: &'a mut CompletionQueue,
    current_time: i64,
}

impl Iterator for DueEvents<'_> {
    type Item = CompletionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_due(self.current_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_precede_successes_at_equal_time() {
        let mut queue = CompletionQueue::new();
        queue.schedule(CompletionEvent::new(100, true, 0, 0));
        queue.schedule(CompletionEvent::new(100, false, 5, 2));
        queue.schedule(CompletionEvent::new(100, true, 1, 0));
        queue.schedule(CompletionEvent::new(100, false, 2, 1));

        let order: Vec<_> = queue.drain_due(100).map(|e| (e.passed, e.submission)).collect();
        assert_eq!(order, vec![(false, 2), (false, 5), (true, 0), (true, 1)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_earlier_ready_time_wins_over_verdict() {
        let mut queue = CompletionQueue::new();
        queue.schedule(CompletionEvent::new(90, true, 3, 0));
        queue.schedule(CompletionEvent::new(100, false, 0, 0));
        assert_eq!(queue.pop().map(|e| e.ready_time), Some(90));
    }

    #[test]
    fn test_drain_stops_at_first_future_event() {
        let mut queue = CompletionQueue::new();
        queue.schedule(CompletionEvent::new(10, true, 0, 0));
        queue.schedule(CompletionEvent::new(20, false, 0, 1));
        queue.schedule(CompletionEvent::new(30, true, 1, 0));

        let drained: Vec<_> = queue.drain_due(20).collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.len(), 1);
        assert!(!queue.has_due(29));
        assert!(queue.has_due(30));
    }

    #[test]
    fn test_has_due_does_not_remove() {
        let mut queue = CompletionQueue::new();
        queue.schedule(CompletionEvent::new(0, true, 0, 0));
        assert!(queue.has_due(0));
        assert!(queue.has_due(0));
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(-1).is_none());
    }

    #[test]
    fn test_identical_events_collapse() {
        let mut queue = CompletionQueue::new();
        assert!(queue.schedule(CompletionEvent::new(10, true, 0, 0)));
        assert!(!queue.schedule(CompletionEvent::new(10, true, 0, 0)));
        assert_eq!(queue.len(), 1);
    }
}
