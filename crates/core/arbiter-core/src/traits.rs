//! Core traits for Arbiter
//!
//! `SchedulingPolicy` is what a policy under test implements when it runs
//! in-process. `PolicyChannel` is how the referee talks to a policy,
//! wherever it runs. The simulator works through `PolicyChannel` ONLY.

use crate::error::ArbiterError;
use crate::types::*;

/// Result type for Arbiter operations
pub type Result<T> = std::result::Result<T, ArbiterError>;

/// A scheduling policy under evaluation
pub trait SchedulingPolicy {
    /// Learn the invoker count and the problem catalog
    fn start(&mut self, header: &ContestHeader);

    /// React to one tick of announcements with invocation requests
    fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest>;

    /// Get policy name
    fn name(&self) -> &str;
}

impl<P: SchedulingPolicy + ?Sized> SchedulingPolicy for Box<P> {
    fn start(&mut self, header: &ContestHeader) {
        (**self).start(header)
    }

    fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest> {
        (**self).on_tick(update)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// The referee's connection to a policy
///
/// Per tick the referee calls, in order: `announce_release`* then
/// `end_releases`, `announce_result`* then `end_results`, then
/// `read_request` until it yields `End` or `Eof`.
pub trait PolicyChannel {
    /// Sent once, before the first tick
    fn announce_contest(&mut self, header: &ContestHeader) -> Result<()>;

    fn announce_release(&mut self, problem: ProblemId) -> Result<()>;

    fn end_releases(&mut self) -> Result<()>;

    fn announce_result(&mut self, result: &TestResult) -> Result<()>;

    /// Closes the outbound half of a tick; buffered output is flushed here
    fn end_results(&mut self) -> Result<()>;

    fn read_request(&mut self) -> Result<RequestFrame>;
}

impl<C: PolicyChannel + ?Sized> PolicyChannel for &mut C {
    fn announce_contest(&mut self, header: &ContestHeader) -> Result<()> {
        (**self).announce_contest(header)
    }

    fn announce_release(&mut self, problem: ProblemId) -> Result<()> {
        (**self).announce_release(problem)
    }

    fn end_releases(&mut self) -> Result<()> {
        (**self).end_releases()
    }

    fn announce_result(&mut self, result: &TestResult) -> Result<()> {
        (**self).announce_result(result)
    }

    fn end_results(&mut self) -> Result<()> {
        (**self).end_results()
    }

    fn read_request(&mut self) -> Result<RequestFrame> {
        (**self).read_request()
    }
}
