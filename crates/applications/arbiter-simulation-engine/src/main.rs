//! Arbiter Simulation Engine CLI
//!
//! Referee, reference policies, batch scoring and test generation for
//! grading-system scheduling policies

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbiter_core::ArbiterError;
use arbiter_simulation_engine::{
    bench::{run_bench, PolicySource},
    diagnostics::DiagnosticsWriter,
    generator::{GeneratorConfig, TestGenerator},
    serve_policy, LineChannel, PolicyKind, SimulationConfig, Simulator, TestDescription,
    TestIdBound, DEFAULT_TIME_STEP,
};

#[derive(Parser, Debug)]
#[command(name = "arbiter-sim")]
#[command(about = "Simulate and score grading-system scheduling policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Referee one test against a policy speaking on stdin/stdout
    Judge {
        /// Test description file
        #[arg(short, long)]
        test: PathBuf,

        /// Write the score here instead of stderr
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the full result as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write per-submission load diagnostics as CSV
        #[arg(long)]
        diagnostics: Option<PathBuf>,

        /// Clock advance per tick (ms)
        #[arg(long, default_value_t = DEFAULT_TIME_STEP)]
        time_step: i64,

        /// Accept test id == test count, as the legacy referee did
        #[arg(long)]
        legacy_test_bound: bool,
    },

    /// Run a built-in policy on stdin/stdout
    Policy {
        #[arg(short, long, value_enum, default_value_t = PolicyKind::Progress)]
        strategy: PolicyKind,

        /// Tick length the policy assumes (ms)
        #[arg(long, default_value_t = DEFAULT_TIME_STEP)]
        time_step: i64,
    },

    /// Score a policy over every test in a directory
    Bench {
        /// Directory of test description files
        #[arg(short, long)]
        tests: PathBuf,

        /// Built-in policy to score
        #[arg(short, long, value_enum, default_value_t = PolicyKind::Progress)]
        policy: PolicyKind,

        /// External policy command; overrides --policy
        #[arg(short, long)]
        command: Option<String>,

        /// Output JSON file path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_TIME_STEP)]
        time_step: i64,

        #[arg(long)]
        legacy_test_bound: bool,
    },

    /// Write a synthetic test description
    Generate {
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long, default_value_t = 5)]
        problems: usize,

        #[arg(long, default_value_t = 4)]
        invokers: usize,

        #[arg(long, default_value_t = 100)]
        submissions: usize,

        /// Arrivals are spread over roughly this many ms
        #[arg(long, default_value_t = 60_000)]
        horizon: i64,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbiter=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Judge {
            test,
            output,
            report,
            diagnostics,
            time_step,
            legacy_test_bound,
        } => {
            let config = simulation_config(time_step, legacy_test_bound);
            judge(config, test, output, report, diagnostics)
        }

        Commands::Policy {
            strategy,
            time_step,
        } => {
            let mut policy = strategy.build_with(time_step);
            let stdout = io::stdout();
            serve_policy(io::stdin().lock(), BufWriter::new(stdout.lock()), &mut policy)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Bench {
            tests,
            policy,
            command,
            output,
            time_step,
            legacy_test_bound,
        } => {
            let config = simulation_config(time_step, legacy_test_bound);
            let source = match command {
                Some(command) => PolicySource::Command(command),
                None => PolicySource::BuiltIn(policy),
            };
            bench(config, tests, source, output)
        }

        Commands::Generate {
            out,
            seed,
            problems,
            invokers,
            submissions,
            horizon,
        } => {
            let config = GeneratorConfig {
                seed,
                problems,
                invokers,
                submissions,
                horizon,
                ..Default::default()
            };
            let description = TestGenerator::new(config)?.generate()?;
            let file = File::create(&out)
                .with_context(|| format!("cannot create {}", out.display()))?;
            description.write_to(BufWriter::new(file))?;
            info!(
                path = %out.display(),
                submissions = description.submissions.len(),
                "test written"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn simulation_config(time_step: i64, legacy_test_bound: bool) -> SimulationConfig {
    let bound = if legacy_test_bound {
        TestIdBound::Inclusive
    } else {
        TestIdBound::Exclusive
    };
    SimulationConfig::default()
        .with_time_step(time_step)
        .with_test_id_bound(bound)
}

fn judge(
    config: SimulationConfig,
    test: PathBuf,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    diagnostics: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let description = TestDescription::from_path(&test)?;

    if let Some(path) = diagnostics {
        let file = File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        DiagnosticsWriter::new(BufWriter::new(file))?.record_all(&description)?;
    }

    let mut simulator = Simulator::new(config, &description)?;
    let stdout = io::stdout();
    let channel = LineChannel::new(io::stdin().lock(), BufWriter::new(stdout.lock()));

    let result = match simulator.run(channel) {
        Ok(result) => result,
        Err(ArbiterError::Violation(violation)) => {
            eprintln!("rejected: {violation}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = output {
        fs::write(&path, format!("{}\n", result.score))
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    eprintln!("score {} elapsed {}", result.score, result.elapsed);

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
    }

    Ok(ExitCode::SUCCESS)
}

fn bench(
    config: SimulationConfig,
    tests: PathBuf,
    source: PolicySource,
    output: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    println!("Benchmarking {source} on {}\n", tests.display());

    let report = run_bench(&config, &tests, &source)?;

    println!("{:<24} {:>12} {:>12}  {}", "Test", "Score", "Elapsed", "Outcome");
    println!("{}", "-".repeat(70));
    for entry in &report.entries {
        let score = entry.score.map_or_else(|| "-".to_string(), |s| s.to_string());
        let elapsed = entry.elapsed.map_or_else(|| "-".to_string(), |e| e.to_string());
        println!(
            "{:<24} {:>12} {:>12}  {}",
            entry.test, score, elapsed, entry.outcome
        );
    }
    println!("{}", "-".repeat(70));
    println!("{:<24} {:>12}", "Total", report.total);
    if report.rejected_count() > 0 {
        println!("Rejected: {}/{}", report.rejected_count(), report.entries.len());
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
        println!("\nResults saved to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}
