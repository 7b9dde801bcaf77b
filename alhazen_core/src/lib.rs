//! Alhazen Core - parallel execution of simulated experiments
//!
//! An experiment is a sweep of conditions, each replicated over independent
//! participants, each participant running one or more rounds. This crate
//! runs every (condition, participant) pair on a pool of worker threads and
//! folds the results back in the orchestrator:
//!
//! 1. **Orchestrator**: expands the sweep, dispatches tasks, calls the
//!    finish hooks and reports the first fault
//! 2. **Worker Runtime**: one private experiment clone per worker, one-time
//!    `setup()`, sequential execution of assigned tasks
//! 3. **Round Iterator**: the per-participant round loop for iterated experiments
//! 4. **Logger Sink**: a single collector thread writing text or delimited records
//! 5. **Progress Reporter**: completed-participant counter with an optional bar
//!
//! # Example
//!
//! ```ignore
//! use alhazen_core::{HarnessConfig, Orchestrator};
//!
//! let config = HarnessConfig::new()
//!     .with_participants(100)
//!     .with_conditions([0.5, 1.0, 2.0])
//!     .with_rounds(50)
//!     .with_workers(4);
//!
//! let mut orchestrator = Orchestrator::new(Walk::default(), config)?;
//! let results = orchestrator.run()?;
//! ```

pub mod config;
pub mod experiment;
pub mod logger;
pub mod orchestrator;
pub mod progress;
pub mod results;
pub mod rounds;
pub mod worker;

// Re-export key types for convenience
pub use config::{HarnessConfig, LogConfig, LogDestination, LogFormat};
pub use experiment::{
    Experiment, HookResult, Iterated, IteratedExperiment, ParticipantStyle, SingleShot,
    SingleShotExperiment, Task,
};
pub use logger::{LogScope, Logger};
pub use orchestrator::{Orchestrator, RunSummary};
pub use progress::ProgressReporter;
pub use results::{ConditionResults, RunResults};
pub use rounds::drive_rounds;
pub use worker::WorkerInfo;

pub use alhazen_env::{Context, HarnessError, MemorySink, Params, Result, RunId, WorkerId};
