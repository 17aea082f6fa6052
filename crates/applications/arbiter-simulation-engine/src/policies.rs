//! Reference scheduling policies
//!
//! Baselines to score against, and a working counterpart for anyone
//! writing a policy of their own:
//! - Progress: favor submissions that are further along, round-robin inside a bucket
//! - ExpectedTime: favor submissions expected to finish soonest
//! - Fifo: judge submissions strictly in arrival order
//!
//! Every policy tracks free invokers itself: one is taken per request
//! and given back per announced result. A request the referee drops is
//! therefore never given back, which is why the policies never
//! over-request.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};

use arbiter_core::{
    ContestHeader, InvocationRequest, Problem, ProblemId, SchedulingPolicy, SubmissionId, TestId,
    TestResult, TickUpdate,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_TIME_STEP;

/// Built-in policies selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Progress,
    ExpectedTime,
    Fifo,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn SchedulingPolicy> {
        self.build_with(DEFAULT_TIME_STEP)
    }

    /// Build for a referee ticking every `time_step` ms
    pub fn build_with(self, time_step: i64) -> Box<dyn SchedulingPolicy> {
        match self {
            PolicyKind::Progress => Box::new(ProgressPolicy::new()),
            PolicyKind::ExpectedTime => {
                Box::new(ExpectedTimePolicy::new().with_time_step(time_step))
            }
            PolicyKind::Fifo => Box::new(FifoPolicy::new()),
        }
    }
}

/// Per-submission bookkeeping shared by the policies
#[derive(Debug, Clone)]
struct Tracked {
    test_count: usize,
    time_limit: i64,
    next_test: TestId,
    tests_run: usize,
    done: bool,
}

impl Tracked {
    fn new(problem: &Problem) -> Self {
        Tracked {
            test_count: problem.test_count,
            time_limit: problem.time_limit,
            next_test: 0,
            tests_run: 0,
            done: false,
        }
    }

    /// Take the next test; the submission is done once all are requested
    fn take_test(&mut self) -> TestId {
        let test = self.next_test;
        self.next_test += 1;
        if self.next_test >= self.test_count {
            self.done = true;
        }
        test
    }
}

/// Register newly released submissions, in order
fn admit(problems: &[Problem], released: &[ProblemId], tracked: &mut Vec<Tracked>) -> Vec<SubmissionId> {
    released
        .iter()
        .map(|&problem| {
            let id = tracked.len();
            let problem = problems.get(problem).copied().unwrap_or(Problem::new(0, 1));
            tracked.push(Tracked::new(&problem));
            id
        })
        .collect()
}

// ============================================================================
// Progress
// ============================================================================

/// Queue key: higher progress bucket first, then oldest round-robin stamp
type ProgressKey = (Reverse<usize>, u64, SubmissionId);

/// Favor submissions that are further along
///
/// Progress is bucketed in thirds of the test count, so a submission
/// that has run a third of its tests outranks a fresh one. Within a
/// bucket, the submission served longest ago goes first.
#[derive(Debug, Default)]
pub struct ProgressPolicy {
    problems: Vec<Problem>,
    free_invokers: usize,
    submissions: Vec<Tracked>,
    stamps: Vec<u64>,
    queue: BTreeSet<ProgressKey>,
    robin: u64,
}

impl ProgressPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_robin(&mut self) -> u64 {
        self.robin += 1;
        self.robin
    }

    fn key(&self, id: SubmissionId) -> ProgressKey {
        let submission = &self.submissions[id];
        let progress = submission.tests_run * 100 / submission.test_count / 34;
        (Reverse(progress), self.stamps[id], id)
    }

    /// Apply `change` to a queued submission, keeping the queue ordered
    fn requeue(&mut self, id: SubmissionId, change: impl FnOnce(&mut Self)) {
        let was_queued = self.queue.remove(&self.key(id));
        change(self);
        if was_queued && !self.submissions[id].done {
            self.queue.insert(self.key(id));
        }
    }

    fn record(&mut self, result: &TestResult) {
        self.free_invokers += 1;
        if result.submission >= self.submissions.len() {
            return;
        }
        self.requeue(result.submission, |policy| {
            let submission = &mut policy.submissions[result.submission];
            submission.tests_run += 1;
            if !result.passed {
                debug!(submission = result.submission, "rejected, done");
                submission.done = true;
            }
        });
    }
}

impl SchedulingPolicy for ProgressPolicy {
    fn start(&mut self, header: &ContestHeader) {
        *self = ProgressPolicy {
            problems: header.problems.clone(),
            free_invokers: header.invoker_count,
            ..Default::default()
        };
    }

    fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest> {
        for id in admit(&self.problems, &update.released, &mut self.submissions) {
            let stamp = self.next_robin();
            self.stamps.push(stamp);
            self.queue.insert(self.key(id));
        }
        for result in &update.results {
            self.record(result);
        }

        let mut requests = Vec::new();
        while self.free_invokers > 0 {
            let Some(&(_, _, id)) = self.queue.first() else {
                break;
            };
            let stamp = self.next_robin();
            let mut test = 0;
            self.requeue(id, |policy| {
                policy.stamps[id] = stamp;
                test = policy.submissions[id].take_test();
            });
            requests.push(InvocationRequest::new(id, test));
            self.free_invokers -= 1;
        }
        requests
    }

    fn name(&self) -> &str {
        "Progress"
    }
}

// ============================================================================
// ExpectedTime
// ============================================================================

/// Favor submissions expected to finish soonest
///
/// Before any result the estimate is `test_count * time_limit`; after
/// that it is the observed mean test time scaled to the test count.
/// Test time is measured in ticks, from request to announced result.
#[derive(Debug)]
pub struct ExpectedTimePolicy {
    problems: Vec<Problem>,
    free_invokers: usize,
    submissions: Vec<Tracked>,
    running_time: Vec<i64>,
    requested_at: HashMap<(SubmissionId, TestId), i64>,
    pending: Vec<SubmissionId>,
    time_step: i64,
    now: i64,
}

impl Default for ExpectedTimePolicy {
    fn default() -> Self {
        ExpectedTimePolicy {
            problems: Vec::new(),
            free_invokers: 0,
            submissions: Vec::new(),
            running_time: Vec::new(),
            requested_at: HashMap::new(),
            pending: Vec::new(),
            time_step: DEFAULT_TIME_STEP,
            now: 0,
        }
    }
}

impl ExpectedTimePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick length the referee is assumed to use
    pub fn with_time_step(mut self, time_step: i64) -> Self {
        self.time_step = time_step;
        self
    }

    fn expected_time(&self, id: SubmissionId) -> f64 {
        let submission = &self.submissions[id];
        let test_count = submission.test_count as f64;
        if submission.tests_run == 0 {
            return test_count * submission.time_limit as f64;
        }
        self.running_time[id] as f64 * test_count / submission.tests_run as f64
    }

    fn record(&mut self, result: &TestResult) {
        self.free_invokers += 1;
        let Some(submission) = self.submissions.get_mut(result.submission) else {
            return;
        };
        let started = self
            .requested_at
            .remove(&(result.submission, result.test))
            .unwrap_or(self.now);
        self.running_time[result.submission] =
            self.running_time[result.submission].saturating_add(self.now - started);
        submission.tests_run += 1;
        if !result.passed {
            submission.done = true;
        }
    }
}

impl SchedulingPolicy for ExpectedTimePolicy {
    fn start(&mut self, header: &ContestHeader) {
        *self = ExpectedTimePolicy {
            problems: header.problems.clone(),
            free_invokers: header.invoker_count,
            time_step: self.time_step,
            ..Default::default()
        };
    }

    fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest> {
        for id in admit(&self.problems, &update.released, &mut self.submissions) {
            self.running_time.push(0);
            self.pending.push(id);
        }
        for result in &update.results {
            self.record(result);
        }

        let mut requests = Vec::new();
        while self.free_invokers > 0 {
            let submissions = &self.submissions;
            self.pending.retain(|&id| !submissions[id].done);
            let Some(id) = self
                .pending
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    self.expected_time(a)
                        .total_cmp(&self.expected_time(b))
                        .then(a.cmp(&b))
                })
            else {
                break;
            };
            let test = self.submissions[id].take_test();
            self.requested_at.insert((id, test), self.now);
            requests.push(InvocationRequest::new(id, test));
            self.free_invokers -= 1;
        }

        self.now += self.time_step;
        requests
    }

    fn name(&self) -> &str {
        "ExpectedTime"
    }
}

// ============================================================================
// Fifo
// ============================================================================

/// Judge submissions strictly in arrival order
///
/// All tests of the oldest open submission are requested before the
/// next submission gets any.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    problems: Vec<Problem>,
    free_invokers: usize,
    submissions: Vec<Tracked>,
    queue: VecDeque<SubmissionId>,
}

impl FifoPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingPolicy for FifoPolicy {
    fn start(&mut self, header: &ContestHeader) {
        *self = FifoPolicy {
            problems: header.problems.clone(),
            free_invokers: header.invoker_count,
            ..Default::default()
        };
    }

    fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest> {
        let admitted = admit(&self.problems, &update.released, &mut self.submissions);
        self.queue.extend(admitted);
        for result in &update.results {
            self.free_invokers += 1;
            if let Some(submission) = self.submissions.get_mut(result.submission) {
                submission.tests_run += 1;
                if !result.passed {
                    submission.done = true;
                }
            }
        }

        let mut requests = Vec::new();
        while self.free_invokers > 0 {
            let Some(&id) = self.queue.front() else {
                break;
            };
            let submission = &mut self.submissions[id];
            if submission.done {
                self.queue.pop_front();
                continue;
            }
            requests.push(InvocationRequest::new(id, submission.take_test()));
            self.free_invokers -= 1;
        }
        requests
    }

    fn name(&self) -> &str {
        "Fifo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(invokers: usize, problems: Vec<Problem>) -> ContestHeader {
        ContestHeader {
            invoker_count: invokers,
            problems,
        }
    }

    fn released(problems: Vec<ProblemId>) -> TickUpdate {
        TickUpdate {
            released: problems,
            results: Vec::new(),
        }
    }

    fn results(results: Vec<(SubmissionId, TestId, bool)>) -> TickUpdate {
        TickUpdate {
            released: Vec::new(),
            results: results
                .into_iter()
                .map(|(submission, test, passed)| TestResult { submission, test, passed })
                .collect(),
        }
    }

    #[test]
    fn test_progress_never_exceeds_free_invokers() {
        let mut policy = ProgressPolicy::new();
        policy.start(&header(2, vec![Problem::new(1000, 5)]));

        let requests = policy.on_tick(&released(vec![0, 0, 0]));
        assert_eq!(requests.len(), 2);
        assert!(policy.on_tick(&TickUpdate::default()).is_empty());

        let requests = policy.on_tick(&results(vec![(requests[0].submission, requests[0].test, true)]));
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_progress_round_robins_fresh_submissions() {
        let mut policy = ProgressPolicy::new();
        policy.start(&header(3, vec![Problem::new(1000, 6)]));

        let requests = policy.on_tick(&released(vec![0, 0]));
        assert_eq!(
            requests,
            vec![
                InvocationRequest::new(0, 0),
                InvocationRequest::new(1, 0),
                InvocationRequest::new(0, 1),
            ]
        );
    }

    #[test]
    fn test_progress_prefers_advanced_submissions() {
        let mut policy = ProgressPolicy::new();
        policy.start(&header(2, vec![Problem::new(1000, 3)]));

        // submission 0 takes both invokers, submission 1 waits
        policy.on_tick(&released(vec![0]));
        policy.on_tick(&released(vec![0]));
        // two passes give submission 0 a higher bucket
        let requests = policy.on_tick(&results(vec![(0, 0, true), (0, 1, true)]));
        assert_eq!(requests[0], InvocationRequest::new(0, 2));
    }

    #[test]
    fn test_progress_drops_rejected_submissions() {
        let mut policy = ProgressPolicy::new();
        policy.start(&header(1, vec![Problem::new(1000, 4)]));

        assert_eq!(policy.on_tick(&released(vec![0])), vec![InvocationRequest::new(0, 0)]);
        assert!(policy.on_tick(&results(vec![(0, 0, false)])).is_empty());
    }

    #[test]
    fn test_expected_time_prefers_short_problems() {
        let mut policy = ExpectedTimePolicy::new();
        policy.start(&header(1, vec![Problem::new(1000, 10), Problem::new(100, 2)]));

        let requests = policy.on_tick(&released(vec![0, 1]));
        assert_eq!(requests, vec![InvocationRequest::new(1, 0)]);
    }

    #[test]
    fn test_expected_time_uses_observed_running_time() {
        let mut policy = ExpectedTimePolicy::new();
        policy.start(&header(1, vec![Problem::new(1000, 2), Problem::new(1000, 3)]));

        assert_eq!(policy.on_tick(&released(vec![0, 1])), vec![InvocationRequest::new(0, 0)]);
        // one idle tick, then the result: 20 ms observed, expected 40 < 3000
        policy.on_tick(&TickUpdate::default());
        let requests = policy.on_tick(&results(vec![(0, 0, true)]));
        assert_eq!(requests, vec![InvocationRequest::new(0, 1)]);
    }

    #[test]
    fn test_expected_time_skips_finished_submissions() {
        let mut policy = ExpectedTimePolicy::new();
        policy.start(&header(1, vec![Problem::new(100, 1)]));

        assert_eq!(policy.on_tick(&released(vec![0])), vec![InvocationRequest::new(0, 0)]);
        assert!(policy.on_tick(&results(vec![(0, 0, true)])).is_empty());
    }

    #[test]
    fn test_expected_time_follows_the_tick_length() {
        // one result observed after one tick; a fresh submission expects 200 ms
        let tick = |time_step: i64| {
            let mut policy = PolicyKind::ExpectedTime.build_with(time_step);
            policy.start(&header(1, vec![Problem::new(100, 2)]));
            assert_eq!(policy.on_tick(&released(vec![0])), vec![InvocationRequest::new(0, 0)]);
            policy.on_tick(&TickUpdate {
                released: vec![0],
                results: vec![TestResult { submission: 0, test: 0, passed: true }],
            })
        };

        // 10 ms ticks: 2 * 10 = 20 < 200, keep going with submission 0
        assert_eq!(tick(10), vec![InvocationRequest::new(0, 1)]);
        // 1 s ticks: 2 * 1000 = 2000 > 200, the fresh submission wins
        assert_eq!(tick(1000), vec![InvocationRequest::new(1, 0)]);
    }

    #[test]
    fn test_expected_time_handles_huge_time_limits() {
        let mut policy = ExpectedTimePolicy::new();
        policy.start(&header(1, vec![Problem::new(i64::MAX, 50), Problem::new(i64::MAX, 3)]));

        assert_eq!(policy.on_tick(&released(vec![0, 1])), vec![InvocationRequest::new(1, 0)]);
    }

    #[test]
    fn test_fifo_serves_oldest_first() {
        let mut policy = FifoPolicy::new();
        policy.start(&header(3, vec![Problem::new(1000, 2)]));

        let requests = policy.on_tick(&released(vec![0, 0]));
        assert_eq!(
            requests,
            vec![
                InvocationRequest::new(0, 0),
                InvocationRequest::new(0, 1),
                InvocationRequest::new(1, 0),
            ]
        );
    }

    #[test]
    fn test_policy_kind_builds_named_policies() {
        assert_eq!(PolicyKind::Progress.build().name(), "Progress");
        assert_eq!(PolicyKind::ExpectedTime.build().name(), "ExpectedTime");
        assert_eq!(PolicyKind::Fifo.build().name(), "Fifo");
    }
}
