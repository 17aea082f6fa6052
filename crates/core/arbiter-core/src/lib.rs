//! Arbiter Core - Shared types and traits
//!
//! This crate defines the abstractions used across:
//! - arbiter-simulation-engine (the referee and its CLI)
//! - the built-in reference scheduling policies
//!
//! Key types:
//! - Problem / Verdict / TestResult (the grading data model)
//! - SchedulingPolicy trait (interface for policies under test)
//! - PolicyChannel trait (the referee's view of a policy)
//! - Error types

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
