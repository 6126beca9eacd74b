//! Manitest
//!
//! Dry-compiles a Puppet manifest for one node using the facts cached for
//! that node, without touching the node itself. A throwaway no-op
//! configuration and a one-node manifest are generated, the compiler is
//! run against them, and its output decides whether the catalog applied.

pub mod artifacts;
pub mod driver;
pub mod error;
pub mod facts;
pub mod orchestrator;
pub mod signals;
pub mod synth;

pub use artifacts::Artifacts;
pub use driver::{Manitest, RunOptions, RunOutcome};
pub use error::{ManitestError, Result};
pub use facts::{FACT_PREFIX, FactEnv};
pub use orchestrator::{
    CompilationReport, CompilerCommand, Orchestrator, Outcome, RunStatus,
    ScheduleTransactionMatcher, SuccessMatcher,
};
pub use synth::{SyntheticConfig, SyntheticManifest, Synthesizer};
