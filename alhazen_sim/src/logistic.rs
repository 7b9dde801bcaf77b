//! Logistic random walk.
//!
//! Every round adds a logistic sample of scale `width` to a running sum, so
//! after `n` rounds a participant's position has standard deviation
//! `width·π·√(n/3)`. The condition is the width (`None` means 1).

use alhazen_core::{
    Context, Experiment, HookResult, Iterated, IteratedExperiment, LogFormat, Task, WorkerInfo,
};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Open01};
use serde::Serialize;

/// Widths swept by default.
pub const DEFAULT_WIDTHS: [f64; 3] = [0.01, 1.1, 100.0];

/// Log columns written once per participant.
pub const LOG_FIELDS: [&str; 4] = ["condition", "participant", "worker", "final_position"];

const WIDTH_KEY: &str = "width";

/// Population mean and standard deviation of one round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Per-round statistics of one condition.
#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    pub width: Option<f64>,
    pub rounds: Vec<RoundStats>,
}

/// Iterated experiment producing each participant's cumulative position.
#[derive(Debug, Clone, Default)]
pub struct LogisticWalk {
    /// Worker-local randomness, created in `setup()`
    rng: Option<ChaCha8Rng>,

    /// Running position of the current participant
    position: f64,

    /// Filled by `finish_condition`, in sweep order
    summaries: Vec<WalkSummary>,
}

impl LogisticWalk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for every finished condition.
    pub fn summaries(&self) -> &[WalkSummary] {
        &self.summaries
    }

    pub fn summary(&self, width: Option<f64>) -> Option<&WalkSummary> {
        self.summaries.iter().find(|s| s.width == width)
    }
}

/// Mean and population standard deviation for each round index.
///
/// Participants whose series is shorter than a round are left out of it.
pub fn round_stats(series: &[Vec<f64>]) -> Vec<RoundStats> {
    let longest = series.iter().map(Vec::len).max().unwrap_or(0);
    (0..longest)
        .map(|round| {
            let values: Vec<f64> = series.iter().filter_map(|s| s.get(round).copied()).collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            RoundStats {
                mean,
                stdev: variance.sqrt(),
            }
        })
        .collect()
}

impl Experiment for LogisticWalk {
    type Condition = f64;
    type Output = Vec<f64>;
    type Style = Iterated;

    fn setup(&mut self, worker: &WorkerInfo) -> HookResult<()> {
        self.rng = Some(worker.rng());
        Ok(())
    }

    fn prepare_condition(&mut self, condition: Option<&f64>, context: &mut Context) -> HookResult<()> {
        context.set(WIDTH_KEY, condition.copied().unwrap_or(1.0))?;
        Ok(())
    }

    fn finish_condition(&mut self, condition: Option<&f64>, results: Vec<Vec<f64>>) -> HookResult<Vec<Vec<f64>>> {
        self.summaries.push(WalkSummary {
            width: condition.copied(),
            rounds: round_stats(&results),
        });
        Ok(results)
    }
}

impl IteratedExperiment for LogisticWalk {
    type Round = f64;

    fn run_participant_prepare(&mut self, _task: &Task<'_, f64>, _context: &mut Context) -> HookResult<()> {
        self.position = 0.0;
        Ok(())
    }

    fn run_participant_run(&mut self, _round: usize, _task: &Task<'_, f64>, context: &mut Context) -> HookResult<f64> {
        let width: f64 = context.get(WIDTH_KEY)?;
        let rng = self
            .rng
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("worker RNG missing; setup() did not run"))?;

        let u: f64 = Open01.sample(rng);
        self.position += width * ((1.0 - u) / u).ln();
        Ok(self.position)
    }

    fn run_participant_finish(&mut self, task: &Task<'_, f64>, results: Vec<f64>) -> HookResult<Vec<f64>> {
        let log = task.log();
        if let Some(LogFormat::Delimited { .. }) = log.format() {
            let condition = task.condition.map_or_else(|| "none".to_string(), |c| c.to_string());
            let last = results.last().copied().unwrap_or(0.0);
            log.write_row([
                condition,
                task.participant.to_string(),
                task.worker.to_string(),
                format!("{:.6}", last),
            ])?;
        }
        Ok(results)
    }
}
