//! Core types shared across Arbiter components

use serde::{Deserialize, Serialize};

/// Index of a problem in the catalog
pub type ProblemId = usize;

/// Index of a submission, assigned in release order
pub type SubmissionId = usize;

/// Index of a test within a problem
pub type TestId = usize;

/// Token announced for a passed test
pub const ACCEPTED_TOKEN: &str = "OK";

/// Token announced for a failed test
pub const REJECTED_TOKEN: &str = "RJ";

/// Static description of a problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub time_limit: i64,
    pub test_count: usize,
}

impl Problem {
    /// Create a problem; a test count below one is floored to one
    pub fn new(time_limit: i64, test_count: i64) -> Self {
        Problem {
            time_limit,
            test_count: test_count.max(1) as usize,
        }
    }
}

/// Outcome of running one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub time_consumed: i64,
    pub passed: bool,
}

impl Verdict {
    pub fn new(time_consumed: i64, passed: bool) -> Self {
        Verdict {
            time_consumed,
            passed,
        }
    }

    pub fn accepted(time_consumed: i64) -> Self {
        Self::new(time_consumed, true)
    }

    pub fn rejected(time_consumed: i64) -> Self {
        Self::new(time_consumed, false)
    }

    /// Parse a verdict token: `OK` passes, anything else fails
    pub fn from_token(time_consumed: i64, token: &str) -> Self {
        Self::new(time_consumed, token == ACCEPTED_TOKEN)
    }

    /// Token used on the wire for this verdict
    pub fn token(&self) -> &'static str {
        verdict_token(self.passed)
    }
}

/// Wire token for a pass/fail flag
pub fn verdict_token(passed: bool) -> &'static str {
    if passed { ACCEPTED_TOKEN } else { REJECTED_TOKEN }
}

/// A request from the policy to run one test of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub submission: SubmissionId,
    pub test: TestId,
}

impl InvocationRequest {
    pub fn new(submission: SubmissionId, test: TestId) -> Self {
        InvocationRequest { submission, test }
    }
}

/// A completed test, as announced to the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub submission: SubmissionId,
    pub test: TestId,
    pub passed: bool,
}

impl TestResult {
    pub fn token(&self) -> &'static str {
        verdict_token(self.passed)
    }
}

/// What the policy learns before the first tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestHeader {
    pub invoker_count: usize,
    pub problems: Vec<Problem>,
}

/// Everything announced to the policy during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickUpdate {
    /// Problem ids of newly released submissions, in submission order
    pub released: Vec<ProblemId>,
    /// Completed tests, in announcement order
    pub results: Vec<TestResult>,
}

impl TickUpdate {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.released.clear();
        self.results.clear();
    }
}

/// One frame read from the policy during the request phase
///
/// Invocation values are kept raw: validation against the registry
/// belongs to the referee, not the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFrame {
    Invoke { submission: i64, test: i64 },
    /// The `-1 -1` sentinel
    End,
    /// The stream closed before a sentinel
    Eof,
}

impl From<InvocationRequest> for RequestFrame {
    fn from(request: InvocationRequest) -> Self {
        RequestFrame::Invoke {
            submission: request.submission as i64,
            test: request.test as i64,
        }
    }
}
