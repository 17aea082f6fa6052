//! Problem catalog and the load-time test description
//!
//! A test description is a whitespace-token file:
//!
//! ```text
//! problemCount invokerCount
//! timeLimit testCount            (once per problem)
//! submitTime problemId           (once per submission, -1 ends the list)
//!   timeConsumed verdictToken    (repeated, timeConsumed -1 ends the list)
//! ```

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use arbiter_core::{ArbiterError, ContestHeader, Problem, ProblemId, Result, Verdict};
use serde::{Deserialize, Serialize};

use crate::tokens::TokenReader;

/// Immutable set of problems, indexed by problem id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    problems: Vec<Problem>,
}

impl Catalog {
    pub fn new(problems: Vec<Problem>) -> Self {
        Catalog { problems }
    }

    pub fn get(&self, id: ProblemId) -> Option<&Problem> {
        self.problems.get(id)
    }

    /// Resolve a raw problem id, failing if it is out of range
    pub fn resolve(&self, raw: i64) -> Result<(ProblemId, &Problem)> {
        usize::try_from(raw)
            .ok()
            .and_then(|id| self.problems.get(id).map(|problem| (id, problem)))
            .ok_or(ArbiterError::UnknownProblem {
                problem: raw,
                count: self.problems.len(),
            })
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A submission as supplied by the test description, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubmission {
    pub submit_time: i64,
    pub problem: i64,
    pub verdicts: Vec<Verdict>,
}

/// Everything the referee loads before the simulation starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescription {
    pub invoker_count: usize,
    pub catalog: Catalog,
    pub submissions: Vec<RawSubmission>,
}

impl TestDescription {
    /// Load a test description from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ArbiterError::load(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::read_from(text.as_bytes())
    }

    /// Read a test description from any buffered reader
    pub fn read_from<R: BufRead>(reader: R) -> Result<Self> {
        let mut tokens = TokenReader::new(reader);

        let problem_count = tokens.expect_int("problem count")?;
        let invoker_count = tokens.expect_int("invoker count")?;
        if problem_count < 0 || invoker_count < 0 {
            return Err(ArbiterError::load(format!(
                "negative counts: {problem_count} problems, {invoker_count} invokers"
            )));
        }

        let problems = (0..problem_count)
            .map(|_| {
                let time_limit = tokens.expect_int("time limit")?;
                let test_count = tokens.expect_int("test count")?;
                Ok(Problem::new(time_limit, test_count))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut submissions = Vec::new();
        loop {
            let submit_time = tokens.expect_int("submit time")?;
            if submit_time == -1 {
                break;
            }
            let problem = tokens.expect_int("problem id")?;
            let mut verdicts = Vec::new();
            loop {
                let time_consumed = tokens.expect_int("time consumed")?;
                if time_consumed == -1 {
                    break;
                }
                let token = tokens.expect_token("verdict")?;
                verdicts.push(Verdict::from_token(time_consumed, &token));
            }
            submissions.push(RawSubmission {
                submit_time,
                problem,
                verdicts,
            });
        }

        Ok(TestDescription {
            invoker_count: invoker_count as usize,
            catalog: Catalog::new(problems),
            submissions,
        })
    }

    /// Write the description back in the load-time format
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{} {}", self.catalog.len(), self.invoker_count)?;
        for problem in self.catalog.problems() {
            writeln!(writer, "{} {}", problem.time_limit, problem.test_count)?;
        }
        for submission in &self.submissions {
            write!(writer, "{} {}", submission.submit_time, submission.problem)?;
            for verdict in &submission.verdicts {
                write!(writer, " {} {}", verdict.time_consumed, verdict.token())?;
            }
            writeln!(writer, " -1")?;
        }
        writeln!(writer, "-1")?;
        writer.flush()?;
        Ok(())
    }

    /// What the policy is told before the first tick
    pub fn header(&self) -> ContestHeader {
        ContestHeader {
            invoker_count: self.invoker_count,
            problems: self.catalog.problems().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "2 3\n\
        1000 3\n\
        500 0\n\
        0 0 100 OK 100 OK 100 RJ -1\n\
        20 1 -1\n\
        20 1 7 TL -1\n\
        -1\n";

    #[test]
    fn test_parse_sample() {
        let description = TestDescription::parse(SAMPLE).unwrap();
        assert_eq!(description.invoker_count, 3);
        assert_eq!(description.catalog.len(), 2);
        assert_eq!(description.catalog.get(0), Some(&Problem::new(1000, 3)));
        // test count floored to one
        assert_eq!(description.catalog.get(1).unwrap().test_count, 1);

        assert_eq!(description.submissions.len(), 3);
        assert_eq!(
            description.submissions[0].verdicts,
            vec![Verdict::accepted(100), Verdict::accepted(100), Verdict::rejected(100)]
        );
        assert!(description.submissions[1].verdicts.is_empty());
        assert_eq!(description.submissions[2].verdicts, vec![Verdict::rejected(7)]);
    }

    #[test]
    fn test_write_then_parse_is_stable() {
        let description = TestDescription::parse(SAMPLE).unwrap();
        let mut buffer = Vec::new();
        description.write_to(&mut buffer).unwrap();
        let reparsed = TestDescription::parse(std::str::from_utf8(&buffer).unwrap()).unwrap();
        assert_eq!(reparsed, description);
    }

    #[test]
    fn test_truncated_input_is_a_load_error() {
        let err = TestDescription::parse("1 1\n1000 2\n0 0 100 OK").unwrap_err();
        assert!(matches!(err, ArbiterError::Load(_)));
    }

    #[test]
    fn test_resolve_rejects_unknown_problem() {
        let catalog = Catalog::new(vec![Problem::new(1000, 1)]);
        assert!(catalog.resolve(0).is_ok());
        assert!(matches!(
            catalog.resolve(1),
            Err(ArbiterError::UnknownProblem { problem: 1, count: 1 })
        ));
        assert!(catalog.resolve(-3).is_err());
    }

    #[test]
    fn test_header_lists_problems() {
        let header = TestDescription::parse(SAMPLE).unwrap().header();
        assert_eq!(header.invoker_count, 3);
        assert_eq!(header.problems.len(), 2);
    }
}
