//! Synthetic test generation
//!
//! Produces test descriptions for benchmarking policies:
//! - Arrivals: exponential inter-arrival gaps (Poisson process)
//! - Test durations: log-normal around a fraction of the time limit,
//!   capped at the limit itself
//! - Failures: a fraction of submissions fail, at a uniformly chosen test
//!
//! Generation is seeded, so a seed always yields the same file.

use arbiter_core::{ArbiterError, Problem, Result, Verdict};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, LogNormal};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, RawSubmission, TestDescription};

/// Shape of a generated test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub problems: usize,
    pub invokers: usize,
    pub submissions: usize,
    /// Arrivals are spread over roughly this many ms
    pub horizon: i64,
    pub max_tests: usize,
    /// Time limits are drawn from `1..=max_time_limit_secs` seconds
    pub max_time_limit_secs: i64,
    /// Fraction of submissions that fail some test
    pub failure_rate: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            problems: 5,
            invokers: 4,
            submissions: 100,
            horizon: 60_000,
            max_tests: 20,
            max_time_limit_secs: 3,
            failure_rate: 0.4,
        }
    }
}

impl GeneratorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.problems == 0 {
            return Err(ArbiterError::config("at least one problem is required"));
        }
        if self.max_tests == 0 || self.max_time_limit_secs <= 0 {
            return Err(ArbiterError::config(
                "max tests and max time limit must be positive",
            ));
        }
        if self.horizon < 0 {
            return Err(ArbiterError::config("horizon must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ArbiterError::config(format!(
                "failure rate must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

/// Seeded generator of test descriptions
pub struct TestGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl TestGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(TestGenerator { config, rng })
    }

    pub fn generate(&mut self) -> Result<TestDescription> {
        let problems: Vec<Problem> = (0..self.config.problems)
            .map(|_| {
                let time_limit = self.rng.gen_range(1..=self.config.max_time_limit_secs) * 1000;
                let test_count = self.rng.gen_range(1..=self.config.max_tests);
                Problem::new(time_limit, test_count as i64)
            })
            .collect();

        let mean_gap = self.config.horizon as f64 / self.config.submissions.max(1) as f64;
        let gaps = Exp::new(1.0 / mean_gap.max(1.0))
            .map_err(|e| ArbiterError::config(format!("arrival distribution: {e}")))?;

        let mut clock = 0.0;
        let mut submissions = Vec::with_capacity(self.config.submissions);
        for _ in 0..self.config.submissions {
            clock += gaps.sample(&mut self.rng);
            let problem = self.rng.gen_range(0..problems.len());
            let verdicts = self.verdicts(&problems[problem])?;
            submissions.push(RawSubmission {
                submit_time: clock as i64,
                problem: problem as i64,
                verdicts,
            });
        }

        Ok(TestDescription {
            invoker_count: self.config.invokers,
            catalog: Catalog::new(problems),
            submissions,
        })
    }

    /// Verdicts for one submission; tests past the failure stay random
    fn verdicts(&mut self, problem: &Problem) -> Result<Vec<Verdict>> {
        let typical = (problem.time_limit as f64 * 0.3).max(1.0);
        let durations = LogNormal::new(typical.ln(), 0.5)
            .map_err(|e| ArbiterError::config(format!("duration distribution: {e}")))?;

        let failing_test = self
            .rng
            .gen_bool(self.config.failure_rate)
            .then(|| self.rng.gen_range(0..problem.test_count));

        Ok((0..problem.test_count)
            .map(|test| {
                let time = (durations.sample(&mut self.rng) as i64).clamp(1, problem.time_limit);
                let passed = match failing_test {
                    Some(failing) if test == failing => false,
                    Some(failing) if test > failing => self.rng.gen_bool(0.5),
                    _ => true,
                };
                Verdict::new(time, passed)
            })
            .collect())
    }
}
