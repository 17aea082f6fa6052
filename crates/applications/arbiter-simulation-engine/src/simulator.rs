//! Tick-driven grading referee
//!
//! The clock starts at zero and advances by a fixed step. Each tick runs
//! three phases in a fixed order:
//!
//! 1. **Release**: submissions whose submit time has come are released and
//!    their problem ids announced.
//! 2. **Completion**: due completion events are drained in queue order;
//!    each one marks its test judged, re-evaluates its submission and is
//!    announced before the next one is taken.
//! 3. **Request**: invocation requests are read until the sentinel and
//!    dispatched through the invoker pool.
//!
//! The run ends once every submission is finished, and is scored by the
//! power mean of release-to-resolution times.

use arbiter_core::{
    ArbiterError, ContestHeader, PolicyChannel, RequestFrame, Result, SubmissionId, TestId,
    Violation,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, TestDescription};
use crate::config::SimulationConfig;
use crate::events::{CompletionEvent, CompletionQueue};
use crate::invokers::{DispatchOutcome, InvokerPool};
use crate::registry::Registry;
use crate::scorer::power_mean;

/// Result of a simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub score: u64,
    /// Clock value after the final advance
    pub elapsed: i64,
    pub submissions: usize,
    pub dispatched_requests: usize,
    pub dropped_requests: usize,
    /// Release-to-resolution time per submission
    pub times_consumed: Vec<i64>,
}

/// Simulation context: clock, registry, invokers and pending events
pub struct Simulator {
    config: SimulationConfig,
    catalog: Catalog,
    registry: Registry,
    invokers: InvokerPool,
    events: CompletionQueue,
    current_time: i64,
    next_release: usize,
    dispatched_requests: usize,
    dropped_requests: usize,
}

impl Simulator {
    /// Create a simulator from a loaded test description
    pub fn new(config: SimulationConfig, description: &TestDescription) -> Result<Self> {
        let registry = Registry::from_raw(&description.catalog, &description.submissions)?;
        Self::from_parts(
            config,
            description.catalog.clone(),
            description.invoker_count,
            registry,
        )
    }

    /// Create a simulator from an already built registry
    pub fn from_parts(
        config: SimulationConfig,
        catalog: Catalog,
        invoker_count: usize,
        registry: Registry,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Simulator {
            config,
            catalog,
            registry,
            invokers: InvokerPool::new(invoker_count),
            events: CompletionQueue::new(),
            current_time: 0,
            next_release: 0,
            dispatched_requests: 0,
            dropped_requests: 0,
        })
    }

    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn invokers(&self) -> &InvokerPool {
        &self.invokers
    }

    pub fn events(&self) -> &CompletionQueue {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.registry.all_finished()
    }

    pub fn header(&self) -> ContestHeader {
        ContestHeader {
            invoker_count: self.invokers.len(),
            problems: self.catalog.problems().to_vec(),
        }
    }

    /// Run the simulation to completion against `channel`
    ///
    /// A protocol violation aborts the run with `ArbiterError::Violation`.
    pub fn run<C: PolicyChannel>(&mut self, mut channel: C) -> Result<SimulationResult> {
        channel.announce_contest(&self.header())?;

        while !self.is_finished() {
            self.tick(&mut channel)?;
            self.current_time += self.config.time_step;
        }

        let result = self.result();
        info!(
            score = result.score,
            elapsed = result.elapsed,
            dispatched = result.dispatched_requests,
            dropped = result.dropped_requests,
            "Finished in {} ms",
            result.elapsed
        );
        Ok(result)
    }

    /// Run the three phases of one tick without advancing the clock
    pub fn tick<C: PolicyChannel>(&mut self, channel: &mut C) -> Result<()> {
        debug!(time = self.current_time, "tick");
        self.release_phase(channel)?;
        self.completion_phase(channel)?;
        self.request_phase(channel)
    }

    fn release_phase<C: PolicyChannel>(&mut self, channel: &mut C) -> Result<()> {
        while let Some(submission) = self.registry.get(self.next_release) {
            if submission.submit_time > self.current_time {
                break;
            }
            let problem = submission.problem_id;
            self.registry.release(self.next_release, self.current_time);
            debug!(
                submission = self.next_release,
                problem,
                time = self.current_time,
                "released"
            );
            channel.announce_release(problem)?;
            self.next_release += 1;
        }
        channel.end_releases()
    }

    fn completion_phase<C: PolicyChannel>(&mut self, channel: &mut C) -> Result<()> {
        let current_time = self.current_time;
        for event in self.events.drain_due(current_time) {
            if self.registry.mark_judged(event.submission, event.test, current_time) {
                debug!(
                    submission = event.submission,
                    time = current_time,
                    finished = self.registry.finished_count(),
                    "submission finished"
                );
            }
            channel.announce_result(&event.result())?;
        }
        channel.end_results()
    }

    fn request_phase<C: PolicyChannel>(&mut self, channel: &mut C) -> Result<()> {
        loop {
            match channel.read_request()? {
                RequestFrame::End => return Ok(()),
                RequestFrame::Eof if self.is_finished() => return Ok(()),
                RequestFrame::Eof => return Err(Violation::UnexpectedEof.into()),
                RequestFrame::Invoke { submission, test } => {
                    self.invoke(submission, test)?;
                }
            }
        }
    }

    /// Validate one raw invocation request and dispatch it
    ///
    /// Fails with a violation if the submission is unknown or not yet
    /// released, or if the test id is out of range. A request that finds
    /// no free invoker is dropped silently.
    pub fn invoke(&mut self, submission: i64, test: i64) -> Result<DispatchOutcome> {
        let (id, test_id) = self.validate(submission, test)?;

        let Some(verdict) = self
            .registry
            .get(id)
            .and_then(|s| s.verdicts.get(test_id))
            .copied()
        else {
            // admitted by the inclusive bound but names no test
            warn!(submission = id, test = test_id, "request for a test past the last one ignored");
            self.dropped_requests += 1;
            return Ok(DispatchOutcome::Dropped);
        };

        let outcome = self.invokers.dispatch(self.current_time, &verdict);
        match outcome {
            DispatchOutcome::Scheduled { invoker, ready_time } => {
                self.dispatched_requests += 1;
                self.events.schedule(CompletionEvent::new(
                    ready_time,
                    verdict.passed,
                    id,
                    test_id,
                ));
                debug!(submission = id, test = test_id, invoker, ready_time, "dispatched");
            }
            DispatchOutcome::Dropped => {
                self.dropped_requests += 1;
                debug!(submission = id, test = test_id, time = self.current_time, "no free invoker, dropped");
            }
        }
        Ok(outcome)
    }

    fn validate(&self, submission: i64, test: i64) -> Result<(SubmissionId, TestId)> {
        let released = usize::try_from(submission).ok().and_then(|id| {
            self.registry
                .get(id)
                .filter(|s| s.submit_time <= self.current_time)
                .map(|s| (id, s))
        });
        let Some((id, record)) = released else {
            return Err(ArbiterError::Violation(Violation::UnknownSubmission {
                submission,
                current_time: self.current_time,
            }));
        };

        if !self.config.test_id_bound.admits(test, record.test_count()) {
            return Err(ArbiterError::Violation(Violation::TestOutOfRange {
                test,
                problem: record.problem_id,
            }));
        }
        Ok((id, test as TestId))
    }

    /// Score and counters for the current state
    pub fn result(&self) -> SimulationResult {
        let times_consumed = self.registry.times_consumed();
        SimulationResult {
            score: power_mean(&times_consumed, self.config.score_exponent),
            elapsed: self.current_time,
            submissions: self.registry.len(),
            dispatched_requests: self.dispatched_requests,
            dropped_requests: self.dropped_requests,
            times_consumed,
        }
    }
}
