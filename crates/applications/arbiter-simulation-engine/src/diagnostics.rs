//! Per-submission load-time diagnostics
//!
//! A CSV side channel describing each submission as loaded: how much
//! invoker time it needs if judged up to its first failure, and how many
//! invocations that takes. Purely observational.

use std::io::Write;

use arbiter_core::Result;

use crate::catalog::{RawSubmission, TestDescription};

pub const DIAGNOSTICS_HEADER: &str = "SubmitTime,Problem,InvokerTime,Invocations,TestCount,TL";

/// Cost of judging a submission up to and including its first failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionProfile {
    pub invoker_time: i64,
    pub invocations: usize,
}

impl SubmissionProfile {
    /// Profile the raw verdicts, in supplied order
    pub fn of(submission: &RawSubmission) -> Self {
        let mut profile = SubmissionProfile {
            invoker_time: 0,
            invocations: 0,
        };
        for verdict in &submission.verdicts {
            profile.invoker_time += verdict.time_consumed;
            profile.invocations += 1;
            if !verdict.passed {
                break;
            }
        }
        profile
    }
}

/// Writes the diagnostics CSV
pub struct DiagnosticsWriter<W> {
    writer: W,
}

impl<W: Write> DiagnosticsWriter<W> {
    /// Create a writer and emit the header line
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{DIAGNOSTICS_HEADER}")?;
        Ok(DiagnosticsWriter { writer })
    }

    /// One line per submission; `time_limit` is the problem's, if known
    pub fn record(&mut self, submission: &RawSubmission, time_limit: i64) -> Result<()> {
        let profile = SubmissionProfile::of(submission);
        writeln!(
            self.writer,
            "{},{},{},{},{},{}",
            submission.submit_time,
            submission.problem,
            profile.invoker_time,
            profile.invocations,
            submission.verdicts.len(),
            time_limit
        )?;
        Ok(())
    }

    /// Record every submission of a description
    pub fn record_all(&mut self, description: &TestDescription) -> Result<()> {
        for submission in &description.submissions {
            let time_limit = description
                .catalog
                .resolve(submission.problem)
                .map(|(_, problem)| problem.time_limit)?;
            self.record(submission, time_limit)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
