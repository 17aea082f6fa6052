//! Arbiter Simulation Engine
//!
//! Tick-driven referee for grading-system scheduling policies. The referee
//! replays a recorded contest against a policy and scores how quickly the
//! policy gets submissions judged.

pub mod tokens;
pub mod catalog;
pub mod registry;
pub mod invokers;
pub mod events;
pub mod scorer;
pub mod config;
pub mod simulator;
pub mod protocol;
pub mod policies;
pub mod bench;
pub mod generator;
pub mod diagnostics;

pub use catalog::{Catalog, RawSubmission, TestDescription};
pub use config::{SimulationConfig, TestIdBound, DEFAULT_TIME_STEP};
pub use policies::PolicyKind;
pub use protocol::{serve_policy, InProcessChannel, LineChannel, ProcessChannel};
pub use simulator::{SimulationResult, Simulator};
