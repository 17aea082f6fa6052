//! Error types for Arbiter

use thiserror::Error;

use crate::types::ProblemId;

/// A protocol violation by the policy under test
///
/// Every variant aborts the whole run; the display text is the
/// rejection reason reported for the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Submission {submission} does not exist or is submitted after {current_time}")]
    UnknownSubmission { submission: i64, current_time: i64 },

    #[error("Test {test} does not exist for problem {problem}")]
    TestOutOfRange { test: i64, problem: ProblemId },

    #[error("Unexpected eof, not all submissions were judged")]
    UnexpectedEof,

    #[error("Malformed request token {token:?}")]
    MalformedRequest { token: String },
}

/// Core error type for Arbiter operations
#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("Rejected: {0}")]
    Violation(#[from] Violation),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Problem {problem} does not exist (catalog has {count} problems)")]
    UnknownProblem { problem: i64, count: usize },

    #[error("Submission {index} submitted at {submit_time}, before the previous one at {previous}")]
    OutOfOrder {
        index: usize,
        submit_time: i64,
        previous: i64,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArbiterError {
    /// Create a load error
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a protocol framing error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The policy violation behind this error, if any
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Violation(violation) => Some(violation),
            _ => None,
        }
    }
}
