//! Fixed pool of invokers
//!
//! An invoker is a logical slot modeled only by the time it becomes free.
//! Allocation is always first-free-by-index: under contention the load
//! concentrates on low-index invokers.

use arbiter_core::Verdict;
use serde::{Deserialize, Serialize};

/// Outcome of a dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// An invoker took the test and completes it at `ready_time`
    Scheduled { invoker: usize, ready_time: i64 },
    /// No invoker was free; the request is dropped without feedback
    Dropped,
}

impl DispatchOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, DispatchOutcome::Scheduled { .. })
    }
}

/// A single worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invoker {
    pub free_time: i64,
}

impl Invoker {
    pub fn is_free(&self, current_time: i64) -> bool {
        self.free_time <= current_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerPool {
    invokers: Vec<Invoker>,
}

impl InvokerPool {
    /// Create a pool with every invoker free at time zero
    pub fn new(count: usize) -> Self {
        InvokerPool {
            invokers: vec![Invoker::default(); count],
        }
    }

    /// Create a pool from explicit free times
    pub fn with_free_times(free_times: impl IntoIterator<Item = i64>) -> Self {
        InvokerPool {
            invokers: free_times
                .into_iter()
                .map(|free_time| Invoker { free_time })
                .collect(),
        }
    }

    /// Run `verdict` on the lowest-index free invoker
    ///
    /// Nothing changes when no invoker is free.
    pub fn dispatch(&mut self, current_time: i64, verdict: &Verdict) -> DispatchOutcome {
        let Some((index, invoker)) = self
            .invokers
            .iter_mut()
            .enumerate()
            .find(|(_, invoker)| invoker.is_free(current_time))
        else {
            return DispatchOutcome::Dropped;
        };

        invoker.free_time = current_time + verdict.time_consumed;
        DispatchOutcome::Scheduled {
            invoker: index,
            ready_time: invoker.free_time,
        }
    }

    pub fn free_count(&self, current_time: i64) -> usize {
        self.invokers
            .iter()
            .filter(|invoker| invoker.is_free(current_time))
            .count()
    }

    pub fn invokers(&self) -> &[Invoker] {
        &self.invokers
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }
}
