//! Alhazen reference experiments
//!
//! Two complete experiments built on `alhazen_core`, one per participant
//! style, plus the pieces the `alhazen-sim` binary needs to run them:
//!
//! - **SafeRisky** (single-shot): repeated choice between a safe and a risky
//!   option, decided by an instance-based `BlendedMemory`
//! - **LogisticWalk** (iterated): a running sum of logistic samples with
//!   per-round statistics computed in `finish_condition`
//!
//! # Usage
//!
//! ```ignore
//! use alhazen_sim::{ExperimentId, RunOptions};
//!
//! let options = RunOptions { participants: 500, rounds: 50, ..Default::default() };
//! let export = ExperimentId::SafeRisky.run(&options)?;
//! export.write_to_file("safe_risky.json")?;
//! ```

pub mod experiments;
mod exporter;
pub mod logistic;
pub mod memory;
pub mod safe_risky;

pub use experiments::{parse_conditions, ExperimentId, RunOptions};
pub use exporter::{ConditionSeries, RunExport};
pub use logistic::{LogisticWalk, RoundStats, WalkSummary};
pub use memory::BlendedMemory;
pub use safe_risky::SafeRisky;
