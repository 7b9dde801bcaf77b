//! Reference experiments selectable from the command line.

use crate::exporter::RunExport;
use crate::logistic::{self, LogisticWalk};
use crate::safe_risky::{self, SafeRisky};
use alhazen_core::{HarnessConfig, LogConfig, Orchestrator};
use std::path::PathBuf;
use std::str::FromStr;

/// Experiment identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentId {
    /// Repeated safe/risky choice with blended memory
    SafeRisky,

    /// Cumulative logistic random walk
    LogisticWalk,
}

impl ExperimentId {
    /// Returns a list of all experiments.
    pub fn all() -> Vec<ExperimentId> {
        vec![ExperimentId::SafeRisky, ExperimentId::LogisticWalk]
    }

    /// Returns the experiment name.
    pub fn name(&self) -> &'static str {
        match self {
            ExperimentId::SafeRisky => "safe_risky",
            ExperimentId::LogisticWalk => "logistic_walk",
        }
    }

    /// Returns a description of the experiment.
    pub fn description(&self) -> &'static str {
        match self {
            ExperimentId::SafeRisky => "Safe (1) versus risky (10 with p = EV/10) choice; condition = risky EV",
            ExperimentId::LogisticWalk => "Running sum of logistic samples; condition = sample width",
        }
    }

    /// Condition sweep used when none is given.
    pub fn default_conditions(&self) -> &'static str {
        match self {
            ExperimentId::SafeRisky => "5,4,3,2,1",
            ExperimentId::LogisticWalk => "0.01,1.1,100",
        }
    }

    /// Column names of the structured experiment log.
    pub fn log_fields(&self) -> &'static [&'static str] {
        match self {
            ExperimentId::SafeRisky => &safe_risky::LOG_FIELDS,
            ExperimentId::LogisticWalk => &logistic::LOG_FIELDS,
        }
    }

    /// Runs the experiment and summarizes it for export.
    pub fn run(&self, options: &RunOptions) -> anyhow::Result<RunExport> {
        match self {
            ExperimentId::SafeRisky => run_safe_risky(options),
            ExperimentId::LogisticWalk => run_logistic_walk(options),
        }
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ExperimentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe_risky" | "saferisky" | "sr" => Ok(ExperimentId::SafeRisky),
            "logistic_walk" | "logisticwalk" | "logistic" => Ok(ExperimentId::LogisticWalk),
            _ => Err(format!("Unknown experiment: {}", s)),
        }
    }
}

/// Run settings shared by every experiment.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub participants: usize,
    pub rounds: usize,

    /// 0 = one per core
    pub workers: usize,

    /// Comma-separated sweep; `None` uses the experiment's default
    pub conditions: Option<String>,
    pub seed: Option<u64>,

    /// Structured log destination
    pub log: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            participants: 1000,
            rounds: 100,
            workers: 0,
            conditions: None,
            seed: None,
            log: None,
            show_progress: true,
        }
    }
}

impl RunOptions {
    fn config<C>(&self, id: ExperimentId, conditions: Vec<C>) -> HarnessConfig<C> {
        let mut config = HarnessConfig::new()
            .with_participants(self.participants)
            .with_rounds(self.rounds)
            .with_workers(self.workers)
            .with_conditions(conditions)
            .with_progress(self.show_progress);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(path) = &self.log {
            config = config.with_log(LogConfig::structured(path, id.log_fields().iter().copied()));
        }
        config
    }
}

/// Parses a comma-separated condition list.
pub fn parse_conditions<T>(list: &str) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid condition {:?}: {}", s, e))
        })
        .collect()
}

fn run_safe_risky(options: &RunOptions) -> anyhow::Result<RunExport> {
    let id = ExperimentId::SafeRisky;
    let list = options.conditions.as_deref().unwrap_or(id.default_conditions());
    let conditions: Vec<u32> = parse_conditions(list)?;

    // Aggregated in finish_participant; nothing to keep per participant
    let config = options.config(id, conditions).with_retain_results(false);
    let mut orchestrator = Orchestrator::new(SafeRisky::new(), config)?;
    orchestrator.run()?;

    let mut export = RunExport::new(id.name(), "fraction_risky", options.participants, options.rounds, options.seed);
    if let Some(summary) = orchestrator.summary() {
        export = export.with_summary(summary);
    }
    for condition in orchestrator.conditions() {
        let fractions = orchestrator
            .experiment()
            .risky_fraction(*condition)
            .unwrap_or_default();
        export.add_condition(label(condition), fractions, None);
    }
    Ok(export)
}

fn run_logistic_walk(options: &RunOptions) -> anyhow::Result<RunExport> {
    let id = ExperimentId::LogisticWalk;
    let list = options.conditions.as_deref().unwrap_or(id.default_conditions());
    let conditions: Vec<f64> = parse_conditions(list)?;

    let config = options.config(id, conditions);
    let mut orchestrator = Orchestrator::new(LogisticWalk::new(), config)?;
    orchestrator.run()?;

    let mut export = RunExport::new(id.name(), "mean_position", options.participants, options.rounds, options.seed);
    if let Some(summary) = orchestrator.summary() {
        export = export.with_summary(summary);
    }
    for summary in orchestrator.experiment().summaries() {
        let means = summary.rounds.iter().map(|s| s.mean).collect();
        let spread = summary.rounds.iter().map(|s| s.stdev).collect();
        export.add_condition(label(&summary.width), means, Some(spread));
    }
    Ok(export)
}

fn label<C: std::fmt::Display>(condition: &Option<C>) -> String {
    condition
        .as_ref()
        .map_or_else(|| "none".to_string(), |c| c.to_string())
}
