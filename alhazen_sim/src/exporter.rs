//! JSON exporter for run summaries.
//!
//! Writes the per-round aggregate series of every condition so runs can be
//! plotted or compared outside the harness.

use alhazen_core::RunSummary;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Aggregate series for one condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSeries {
    /// Condition label ("none" for the null condition)
    pub condition: String,

    /// One aggregate value per round
    pub values: Vec<f64>,

    /// Per-round spread, when the experiment reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<Vec<f64>>,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Experiment name
    pub experiment: String,

    /// What `values` measures
    pub metric: String,

    pub run_id: String,
    pub participants: usize,
    pub rounds: usize,

    /// Master seed, if the run was seeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub workers: usize,
    pub workers_used: usize,
    pub log_records: u64,
    pub elapsed_ms: u64,

    /// Series in sweep order
    pub conditions: Vec<ConditionSeries>,
}

impl RunExport {
    /// Creates an export container from a finished run.
    pub fn new(experiment: &str, metric: &str, participants: usize, rounds: usize, seed: Option<u64>) -> Self {
        Self {
            experiment: experiment.to_string(),
            metric: metric.to_string(),
            run_id: String::new(),
            participants,
            rounds,
            seed,
            workers: 0,
            workers_used: 0,
            log_records: 0,
            elapsed_ms: 0,
            conditions: Vec::new(),
        }
    }

    /// Copies the run counters.
    pub fn with_summary(mut self, summary: &RunSummary) -> Self {
        self.run_id = summary.run_id.as_uuid().to_string();
        self.workers = summary.workers;
        self.workers_used = summary.workers_used;
        self.log_records = summary.log_records;
        self.elapsed_ms = summary.elapsed.as_millis() as u64;
        self
    }

    /// Adds one condition's series.
    pub fn add_condition(&mut self, condition: String, values: Vec<f64>, spread: Option<Vec<f64>>) {
        self.conditions.push(ConditionSeries {
            condition,
            values,
            spread,
        });
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
