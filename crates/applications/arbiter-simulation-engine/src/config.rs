//! Simulation configuration

use arbiter_core::{ArbiterError, Result};
use serde::{Deserialize, Serialize};

use crate::scorer::{DEFAULT_SCORE_EXPONENT, MAX_SCORE_EXPONENT};

/// Clock advance per tick (ms)
pub const DEFAULT_TIME_STEP: i64 = 10;

/// Upper bound applied to requested test ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TestIdBound {
    /// Valid ids are `0..test_count`
    #[default]
    Exclusive,

    /// Valid ids are `0..=test_count`, as the legacy referee accepted
    ///
    /// The extra id names no test: it passes validation but is never
    /// dispatched.
    Inclusive,
}

impl TestIdBound {
    /// Whether `test` passes range validation for a problem with `test_count` tests
    pub fn admits(self, test: i64, test_count: usize) -> bool {
        let count = test_count as i64;
        match self {
            TestIdBound::Exclusive => (0..count).contains(&test),
            TestIdBound::Inclusive => (0..=count).contains(&test),
        }
    }
}

/// Configuration for one simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Clock advance per tick (ms)
    pub time_step: i64,

    /// Power-mean exponent used for the score
    pub score_exponent: u32,

    /// Range check applied to requested test ids
    pub test_id_bound: TestIdBound,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: DEFAULT_TIME_STEP,
            score_exponent: DEFAULT_SCORE_EXPONENT,
            test_id_bound: TestIdBound::Exclusive,
        }
    }
}

impl SimulationConfig {
    /// Config reproducing the legacy referee, off-by-one included
    pub fn legacy() -> Self {
        Self {
            test_id_bound: TestIdBound::Inclusive,
            ..Default::default()
        }
    }

    /// Set the clock advance per tick
    pub fn with_time_step(mut self, time_step: i64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the power-mean exponent
    pub fn with_score_exponent(mut self, exponent: u32) -> Self {
        self.score_exponent = exponent;
        self
    }

    /// Set the test id range check
    pub fn with_test_id_bound(mut self, bound: TestIdBound) -> Self {
        self.test_id_bound = bound;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_step <= 0 {
            return Err(ArbiterError::config(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if !(1..=MAX_SCORE_EXPONENT).contains(&self.score_exponent) {
            return Err(ArbiterError::config(format!(
                "score exponent must be within 1..={MAX_SCORE_EXPONENT}, got {}",
                self.score_exponent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_bound() {
        let bound = TestIdBound::Exclusive;
        assert!(bound.admits(0, 3));
        assert!(bound.admits(2, 3));
        assert!(!bound.admits(3, 3));
        assert!(!bound.admits(-1, 3));
    }

    #[test]
    fn test_inclusive_bound_admits_one_past_end() {
        let bound = TestIdBound::Inclusive;
        assert!(bound.admits(3, 3));
        assert!(!bound.admits(4, 3));
        assert!(!bound.admits(-1, 3));
    }

    #[test]
    fn test_defaults_and_builders() {
        let config = SimulationConfig::default();
        assert_eq!(config.time_step, 10);
        assert_eq!(config.score_exponent, 3);
        assert_eq!(config.test_id_bound, TestIdBound::Exclusive);
        assert_eq!(SimulationConfig::legacy().test_id_bound, TestIdBound::Inclusive);

        let config = SimulationConfig::default().with_time_step(5).with_score_exponent(2);
        assert_eq!(config.time_step, 5);
        assert_eq!(config.score_exponent, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(SimulationConfig::default().with_time_step(0).validate().is_err());
        assert!(SimulationConfig::default().with_score_exponent(0).validate().is_err());
        assert!(SimulationConfig::default().with_score_exponent(MAX_SCORE_EXPONENT).validate().is_ok());
        assert!(SimulationConfig::default()
            .with_score_exponent(MAX_SCORE_EXPONENT + 1)
            .validate()
            .is_err());
    }
}
