//! Safe versus risky repeated choice.
//!
//! Each participant chooses between a safe option (fixed small payoff) and
//! a risky one (large payoff with probability `p`, otherwise nothing) for a
//! number of rounds, deciding by blended memory of past outcomes. Both
//! options start with an optimistic prior. The condition is the risky
//! option's expected value, so `p = ev / risky_payoff`.

use crate::memory::BlendedMemory;
use alhazen_core::{
    Context, Experiment, HookResult, LogFormat, Logger, Params, SingleShot, SingleShotExperiment,
    Task, WorkerInfo,
};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution};
use std::collections::BTreeMap;

/// Expected values swept by default.
pub const DEFAULT_EXPECTED_VALUES: [u32; 5] = [5, 4, 3, 2, 1];

/// Log columns written once per participant.
pub const LOG_FIELDS: [&str; 4] = ["condition", "participant", "worker", "risky_rounds"];

const SAFE: &str = "safe";
const RISKY: &str = "risky";

/// Single-shot experiment; the result is one "chose risky" flag per round.
#[derive(Debug, Clone)]
pub struct SafeRisky {
    safe_payoff: f64,
    risky_payoff: f64,
    prior: f64,

    /// Worker-local randomness, created in `setup()`
    rng: Option<ChaCha8Rng>,

    /// Per condition: number of participants choosing risky in each round
    risky_counts: BTreeMap<Option<u32>, Vec<u64>>,

    /// Per condition: participants folded in so far
    participants: BTreeMap<Option<u32>, u64>,
}

impl Default for SafeRisky {
    fn default() -> Self {
        Self {
            safe_payoff: 1.0,
            risky_payoff: 10.0,
            prior: 12.0,
            rng: None,
            risky_counts: BTreeMap::new(),
            participants: BTreeMap::new(),
        }
    }
}

impl SafeRisky {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probability of the risky payoff under `condition`.
    ///
    /// The null condition uses 0.1.
    pub fn risky_probability(&self, condition: Option<&u32>) -> f64 {
        match condition {
            Some(&ev) => (ev as f64 / self.risky_payoff).clamp(0.0, 1.0),
            None => 0.1,
        }
    }

    /// Fraction of participants choosing risky in each round.
    pub fn risky_fraction(&self, condition: Option<u32>) -> Option<Vec<f64>> {
        let counts = self.risky_counts.get(&condition)?;
        let n = self.participants.get(&condition).copied().unwrap_or(0).max(1) as f64;
        Some(counts.iter().map(|&c| c as f64 / n).collect())
    }

    /// Conditions with aggregated results.
    pub fn conditions(&self) -> impl Iterator<Item = Option<u32>> + '_ {
        self.risky_counts.keys().copied()
    }
}

impl Experiment for SafeRisky {
    type Condition = u32;
    type Output = Vec<bool>;
    type Style = SingleShot;

    fn setup(&mut self, worker: &WorkerInfo) -> HookResult<()> {
        self.rng = Some(worker.rng());
        Ok(())
    }

    fn prepare_experiment(&mut self, params: &Params, _log: &Logger) -> HookResult<()> {
        if let Some(payoff) = params.get_opt::<f64>("safe_payoff")? {
            self.safe_payoff = payoff;
        }
        if let Some(payoff) = params.get_opt::<f64>("risky_payoff")? {
            anyhow::ensure!(payoff > 0.0, "risky_payoff must be positive, got {}", payoff);
            self.risky_payoff = payoff;
        }
        self.risky_counts.clear();
        self.participants.clear();
        Ok(())
    }

    fn finish_participant(
        &mut self,
        _participant: usize,
        condition: Option<&u32>,
        result: Vec<bool>,
    ) -> HookResult<Vec<bool>> {
        let key = condition.copied();
        let counts = self.risky_counts.entry(key).or_default();
        if counts.len() < result.len() {
            counts.resize(result.len(), 0);
        }
        for (count, &risky) in counts.iter_mut().zip(&result) {
            *count += risky as u64;
        }
        *self.participants.entry(key).or_default() += 1;
        Ok(result)
    }
}

impl SingleShotExperiment for SafeRisky {
    fn run_participant(&mut self, task: &Task<'_, u32>, _context: &mut Context) -> HookResult<Vec<bool>> {
        let p = self.risky_probability(task.condition);
        let risky_draw = Bernoulli::new(p)?;
        let (safe_payoff, risky_payoff) = (self.safe_payoff, self.risky_payoff);
        let rng = self
            .rng
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("worker RNG missing; setup() did not run"))?;

        let mut memory = BlendedMemory::new();
        memory.learn(SAFE, self.prior);
        memory.learn(RISKY, self.prior);
        memory.advance(1);

        let mut risky_chosen = Vec::with_capacity(task.rounds);
        for _ in 0..task.rounds {
            let (choice, _) = memory
                .best_blend(&[SAFE, RISKY], rng)
                .ok_or_else(|| anyhow::anyhow!("memory has no instances"))?;

            let payoff = if choice == SAFE {
                safe_payoff
            } else if risky_draw.sample(rng) {
                risky_payoff
            } else {
                0.0
            };
            risky_chosen.push(choice == RISKY);
            memory.learn(choice, payoff);
            memory.advance(1);
        }

        log_participant(task, &risky_chosen)?;
        Ok(risky_chosen)
    }
}

fn log_participant(task: &Task<'_, u32>, risky_chosen: &[bool]) -> HookResult<()> {
    let log = task.log();
    let condition = task
        .condition
        .map_or_else(|| "none".to_string(), |c| c.to_string());
    let risky = risky_chosen.iter().filter(|&&r| r).count();

    match log.format() {
        None => {}
        Some(LogFormat::Text) => log.write(format!(
            "condition={} participant={} worker={} risky_rounds={}",
            condition, task.participant, task.worker, risky
        ))?,
        Some(LogFormat::Delimited { .. }) => log.write_row([
            condition,
            task.participant.to_string(),
            task.worker.to_string(),
            risky.to_string(),
        ])?,
    }
    Ok(())
}
