//! Submission registry
//!
//! Holds every submission in submit-time order, with its verdicts
//! normalized to the problem's test count, the per-test judged flags and
//! the global count of finished submissions.

use arbiter_core::{ArbiterError, ProblemId, Result, SubmissionId, TestId, Verdict};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, RawSubmission};

/// A submission being judged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submit_time: i64,
    pub problem_id: ProblemId,
    pub verdicts: Vec<Verdict>,
    pub judged: Vec<bool>,
    pub finished: bool,
    /// Clock value at release
    pub start_time: Option<i64>,
    /// Release-to-resolution time, set once finished
    pub time_consumed: Option<i64>,
}

impl Submission {
    /// Build a submission with verdicts normalized to `test_count`
    ///
    /// An empty verdict list becomes a single zero-time failure; a short
    /// list is padded by repeating its last verdict; a long one is cut.
    pub fn new(
        submit_time: i64,
        problem_id: ProblemId,
        test_count: usize,
        mut verdicts: Vec<Verdict>,
    ) -> Self {
        let last = verdicts
            .last()
            .copied()
            .unwrap_or_else(|| Verdict::rejected(0));
        verdicts.resize(test_count, last);

        Submission {
            submit_time,
            problem_id,
            verdicts,
            judged: vec![false; test_count],
            finished: false,
            start_time: None,
            time_consumed: None,
        }
    }

    pub fn test_count(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_released(&self) -> bool {
        self.start_time.is_some()
    }

    /// True once a judged failure is reached, or every test is judged
    ///
    /// Tests are scanned in index order: an unjudged test before the
    /// first judged failure keeps the submission open.
    pub fn is_resolved(&self) -> bool {
        for (verdict, &judged) in self.verdicts.iter().zip(&self.judged) {
            if !judged {
                return false;
            }
            if !verdict.passed {
                break;
            }
        }
        true
    }

    /// Mark the submission finished if it is resolved
    ///
    /// Returns true only on the transition to finished; calling it again
    /// never changes a finished submission.
    pub fn check_finished(&mut self, current_time: i64) -> bool {
        if self.finished || !self.is_resolved() {
            return false;
        }
        let start_time = self.start_time.unwrap_or(current_time);
        self.time_consumed = Some(current_time - start_time);
        self.finished = true;
        true
    }
}

/// All submissions of a run plus the finished counter
#[derive(Debug, Clone, Default)]
pub struct Registry {
    submissions: Vec<Submission>,
    finished_count: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from raw submissions, in order
    pub fn from_raw(catalog: &Catalog, raw: &[RawSubmission]) -> Result<Self> {
        let mut registry = Registry::new();
        for submission in raw {
            registry.register(
                catalog,
                submission.submit_time,
                submission.problem,
                submission.verdicts.clone(),
            )?;
        }
        Ok(registry)
    }

    /// Append a submission; submit times must not decrease
    pub fn register(
        &mut self,
        catalog: &Catalog,
        submit_time: i64,
        problem: i64,
        verdicts: Vec<Verdict>,
    ) -> Result<SubmissionId> {
        let (problem_id, problem) = catalog.resolve(problem)?;
        if let Some(previous) = self.submissions.last() {
            if previous.submit_time > submit_time {
                return Err(ArbiterError::OutOfOrder {
                    index: self.submissions.len(),
                    submit_time,
                    previous: previous.submit_time,
                });
            }
        }

        let id = self.submissions.len();
        self.submissions.push(Submission::new(
            submit_time,
            problem_id,
            problem.test_count,
            verdicts,
        ));
        Ok(id)
    }

    pub fn get(&self, id: SubmissionId) -> Option<&Submission> {
        self.submissions.get(id)
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    pub fn finished_count(&self) -> usize {
        self.finished_count
    }

    pub fn all_finished(&self) -> bool {
        self.finished_count == self.submissions.len()
    }

    /// Record the release of a submission at `current_time`
    pub fn release(&mut self, id: SubmissionId, current_time: i64) {
        if let Some(submission) = self.submissions.get_mut(id) {
            submission.start_time = Some(current_time);
        }
    }

    /// Re-evaluate one submission, counting it if it just finished
    pub fn check_finished(&mut self, id: SubmissionId, current_time: i64) -> bool {
        let finished = self
            .submissions
            .get_mut(id)
            .is_some_and(|submission| submission.check_finished(current_time));
        if finished {
            self.finished_count += 1;
        }
        finished
    }

    /// Mark one test judged and re-evaluate its submission
    pub fn mark_judged(&mut self, id: SubmissionId, test: TestId, current_time: i64) -> bool {
        if let Some(flag) = self
            .submissions
            .get_mut(id)
            .and_then(|submission| submission.judged.get_mut(test))
        {
            *flag = true;
        }
        self.check_finished(id, current_time)
    }

    /// Final per-submission times, zero for any that never finished
    pub fn times_consumed(&self) -> Vec<i64> {
        self.submissions
            .iter()
            .map(|submission| submission.time_consumed.unwrap_or(0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Problem;

    fn catalog() -> Catalog {
        Catalog::new(vec![Problem::new(1000, 3), Problem::new(500, 1)])
    }

    #[test]
    fn test_short_verdicts_repeat_last() {
        let submission = Submission::new(
            0,
            0,
            4,
            vec![Verdict::accepted(10), Verdict::rejected(20)],
        );
        assert_eq!(submission.test_count(), 4);
        assert_eq!(submission.judged, vec![false; 4]);
        assert_eq!(submission.verdicts[2], Verdict::rejected(20));
        assert_eq!(submission.verdicts[3], Verdict::rejected(20));
    }

    #[test]
    fn test_long_verdicts_truncate() {
        let submission = Submission::new(
            0,
            0,
            2,
            vec![Verdict::accepted(1), Verdict::accepted(2), Verdict::rejected(3)],
        );
        assert_eq!(
            submission.verdicts,
            vec![Verdict::accepted(1), Verdict::accepted(2)]
        );
    }

    #[test]
    fn test_empty_verdicts_become_zero_time_failures() {
        let mut submission = Submission::new(50, 0, 3, Vec::new());
        assert_eq!(submission.verdicts, vec![Verdict::rejected(0); 3]);

        submission.start_time = Some(50);
        submission.judged[0] = true;
        assert!(submission.check_finished(50));
        assert_eq!(submission.time_consumed, Some(0));
    }

    #[test]
    fn test_unjudged_earlier_test_keeps_submission_open() {
        let mut submission = Submission::new(
            0,
            0,
            3,
            vec![Verdict::accepted(10), Verdict::accepted(10), Verdict::rejected(10)],
        );
        submission.start_time = Some(0);
        submission.judged[2] = true;
        assert!(!submission.check_finished(30));

        submission.judged[0] = true;
        assert!(!submission.check_finished(30));

        submission.judged[1] = true;
        assert!(submission.check_finished(40));
        assert_eq!(submission.time_consumed, Some(40));
    }

    #[test]
    fn test_failure_short_circuits_later_tests() {
        let mut submission = Submission::new(
            0,
            0,
            3,
            vec![Verdict::rejected(10), Verdict::accepted(10), Verdict::accepted(10)],
        );
        submission.start_time = Some(10);
        submission.judged[0] = true;
        assert!(submission.check_finished(60));
        assert_eq!(submission.time_consumed, Some(50));
    }

    #[test]
    fn test_check_finished_is_idempotent() {
        let catalog = catalog();
        let mut registry = Registry::new();
        let id = registry
            .register(&catalog, 0, 1, vec![Verdict::accepted(5)])
            .unwrap();
        registry.release(id, 0);

        assert!(registry.mark_judged(id, 0, 10));
        assert_eq!(registry.finished_count(), 1);
        assert!(!registry.check_finished(id, 10));
        assert!(!registry.check_finished(id, 90));
        assert_eq!(registry.finished_count(), 1);
        assert_eq!(registry.get(id).unwrap().time_consumed, Some(10));
    }

    #[test]
    fn test_register_rejects_out_of_order() {
        let catalog = catalog();
        let mut registry = Registry::new();
        registry.register(&catalog, 20, 0, Vec::new()).unwrap();
        registry.register(&catalog, 20, 0, Vec::new()).unwrap();
        let err = registry.register(&catalog, 10, 0, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::OutOfOrder { index: 2, submit_time: 10, previous: 20 }
        ));
    }

    #[test]
    fn test_register_rejects_unknown_problem() {
        let catalog = catalog();
        let mut registry = Registry::new();
        let err = registry.register(&catalog, 0, 2, Vec::new()).unwrap_err();
        assert!(matches!(err, ArbiterError::UnknownProblem { problem: 2, .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_normalization_matches_problem_test_count() {
        let catalog = catalog();
        let raw = vec![
            RawSubmission {
                submit_time: 0,
                problem: 0,
                verdicts: vec![Verdict::accepted(7)],
            },
            RawSubmission {
                submit_time: 5,
                problem: 1,
                verdicts: vec![Verdict::accepted(7), Verdict::rejected(9)],
            },
        ];
        let registry = Registry::from_raw(&catalog, &raw).unwrap();
        for submission in registry.submissions() {
            let expected = catalog.get(submission.problem_id).unwrap().test_count;
            assert_eq!(submission.verdicts.len(), expected);
            assert_eq!(submission.judged.len(), expected);
        }
        assert_eq!(registry.get(0).unwrap().verdicts, vec![Verdict::accepted(7); 3]);
    }
}
