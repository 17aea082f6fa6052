//! Batch scoring of a policy over a directory of tests
//!
//! Each test file is judged independently. A run that ends in a protocol
//! violation is recorded as rejected with no score; load and I/O failures
//! abort the whole bench.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use arbiter_core::{ArbiterError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::TestDescription;
use crate::config::SimulationConfig;
use crate::policies::PolicyKind;
use crate::protocol::{InProcessChannel, ProcessChannel};
use crate::simulator::{SimulationResult, Simulator};

/// Where the policy under test comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    BuiltIn(PolicyKind),
    /// External program speaking the text protocol on stdin/stdout
    Command(String),
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySource::BuiltIn(kind) => write!(f, "{kind:?}"),
            PolicySource::Command(command) => write!(f, "`{command}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchEntry {
    pub test: String,
    pub score: Option<u64>,
    pub elapsed: Option<i64>,
    /// "ok", or "rejected: <reason>"
    pub outcome: String,
}

impl BenchEntry {
    fn scored(test: String, result: &SimulationResult) -> Self {
        BenchEntry {
            test,
            score: Some(result.score),
            elapsed: Some(result.elapsed),
            outcome: "ok".to_string(),
        }
    }

    fn rejected(test: String, reason: impl fmt::Display) -> Self {
        BenchEntry {
            test,
            score: None,
            elapsed: None,
            outcome: format!("rejected: {reason}"),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.score.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchReport {
    pub policy: String,
    pub entries: Vec<BenchEntry>,
    /// Sum of the scores of accepted runs
    pub total: u64,
}

impl BenchReport {
    pub fn rejected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_rejected()).count()
    }
}

/// Regular files directly under `dir`, sorted by name
pub fn collect_tests(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut tests = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            tests.push(entry.path());
        }
    }
    tests.sort();
    if tests.is_empty() {
        return Err(ArbiterError::config(format!(
            "no tests found in {}",
            dir.display()
        )));
    }
    Ok(tests)
}

/// Judge one test description against a policy
pub fn run_test(
    config: &SimulationConfig,
    description: &TestDescription,
    source: &PolicySource,
) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config.clone(), description)?;
    match source {
        PolicySource::BuiltIn(kind) => {
            simulator.run(InProcessChannel::new(kind.build_with(config.time_step)))
        }
        PolicySource::Command(command) => {
            let mut channel = ProcessChannel::spawn(command)?;
            let result = simulator.run(&mut channel)?;
            let status = channel.finish()?;
            if !status.success() {
                warn!(%status, "policy process exited unsuccessfully");
            }
            Ok(result)
        }
    }
}

/// Judge every test under `dir`, in name order
pub fn run_bench(
    config: &SimulationConfig,
    dir: impl AsRef<Path>,
    source: &PolicySource,
) -> Result<BenchReport> {
    let mut entries = Vec::new();
    for path in collect_tests(dir)? {
        let test = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let description = TestDescription::from_path(&path)?;

        let entry = match run_test(config, &description, source) {
            Ok(result) => {
                info!(test = %test, score = result.score, elapsed = result.elapsed, "test judged");
                BenchEntry::scored(test, &result)
            }
            Err(ArbiterError::Violation(violation)) => {
                warn!(test = %test, %violation, "policy rejected");
                BenchEntry::rejected(test, violation)
            }
            Err(e) => return Err(e),
        };
        entries.push(entry);
    }

    let total = entries.iter().filter_map(|e| e.score).sum();
    Ok(BenchReport {
        policy: source.to_string(),
        entries,
        total,
    })
}
