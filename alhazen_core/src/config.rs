//! Run configuration.

use alhazen_env::{HarnessError, MemorySink, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Configuration for an experiment run.
///
/// Fixed when the orchestrator is constructed and frozen once `run()`
/// starts.
#[derive(Debug, Clone)]
pub struct HarnessConfig<C> {
    /// Participants per condition (>= 1)
    pub participants: usize,

    /// Ordered condition sweep (`None` = a single null condition)
    pub conditions: Option<Vec<C>>,

    /// Nominal rounds per participant (>= 1)
    pub rounds: usize,

    /// Worker count (0 = one per available core)
    pub workers: usize,

    /// Render a progress bar while results arrive
    pub show_progress: bool,

    /// Experiment log destination and layout
    pub log: Option<LogConfig>,

    /// Master seed for per-worker RNGs (`None` = OS entropy)
    pub seed: Option<u64>,

    /// Keep participant results and return them from `run()`
    pub retain_results: bool,
}

impl<C> Default for HarnessConfig<C> {
    fn default() -> Self {
        Self {
            participants: 1,
            conditions: None,
            rounds: 1,
            workers: 0,
            show_progress: true,
            log: None,
            seed: None,
            retain_results: true,
        }
    }
}

impl<C> HarnessConfig<C> {
    /// Creates a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the participant count.
    pub fn with_participants(mut self, participants: usize) -> Self {
        self.participants = participants;
        self
    }

    /// Sets the condition sweep. The iterator is consumed immediately.
    pub fn with_conditions<I: IntoIterator<Item = C>>(mut self, conditions: I) -> Self {
        self.conditions = Some(conditions.into_iter().collect());
        self
    }

    /// Sets the nominal round count.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Sets the worker count (0 = all cores).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enables or disables the progress bar.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Sets the experiment log.
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = Some(log);
        self
    }

    /// Sets the master seed for per-worker RNGs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Chooses whether `run()` returns participant results.
    pub fn with_retain_results(mut self, retain: bool) -> Self {
        self.retain_results = retain;
        self
    }
}

impl<C: PartialEq> HarnessConfig<C> {
    /// Checks counts, the condition sweep and logging layout.
    ///
    /// Every condition must compare equal to itself (no NaN), otherwise it
    /// could neither be deduplicated nor looked up in the results.
    pub fn validate(&self) -> Result<()> {
        if self.participants < 1 {
            return Err(HarnessError::configuration("participant count must be at least 1"));
        }
        if self.rounds < 1 {
            return Err(HarnessError::configuration("round count must be at least 1"));
        }
        if let Some(conditions) = &self.conditions {
            if conditions.is_empty() {
                return Err(HarnessError::configuration("condition sequence must not be empty"));
            }
            if let Some(i) = conditions.iter().position(|c| !PartialEq::eq(c, c)) {
                return Err(HarnessError::configuration(format!(
                    "condition #{} is not equal to itself (NaN?)",
                    i
                )));
            }
        }
        if let Some(log) = &self.log {
            log.validate()?;
        }
        Ok(())
    }
}

impl<C> HarnessConfig<C> {
    /// Resolves the worker count actually used: 0 maps to the number of
    /// available cores, and the result is never below 1.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            self.workers
        }
    }
}

impl<C: Clone + PartialEq> HarnessConfig<C> {
    /// Materializes the condition sweep as an ordered list of distinct values.
    ///
    /// Repeated values keep their first position. With no conditions
    /// configured the list is the single null condition `[None]`.
    pub fn condition_values(&self) -> Vec<Option<C>> {
        match &self.conditions {
            None => vec![None],
            Some(conditions) => {
                let mut distinct: Vec<Option<C>> = Vec::with_capacity(conditions.len());
                for condition in conditions {
                    let candidate = Some(condition.clone());
                    if !distinct.contains(&candidate) {
                        distinct.push(candidate);
                    }
                }
                distinct
            }
        }
    }
}

/// Where the experiment log goes.
#[derive(Debug, Clone)]
pub enum LogDestination {
    /// A file, created (truncated) when the run starts
    File(PathBuf),

    /// An in-memory buffer (tests, embedding)
    Memory(MemorySink),
}

/// Layout of the experiment log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// One free-form text line per record
    Text,

    /// Header of field names, then one delimited row per record
    Delimited {
        fields: Vec<String>,
        delimiter: char,
    },
}

impl LogFormat {
    /// Comma-delimited layout with the given field names.
    pub fn csv<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LogFormat::Delimited {
            fields: fields.into_iter().map(Into::into).collect(),
            delimiter: ',',
        }
    }

    /// Returns true for the delimited layout.
    pub fn is_structured(&self) -> bool {
        matches!(self, LogFormat::Delimited { .. })
    }
}

/// Experiment log configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub destination: LogDestination,
    pub format: LogFormat,
}

impl LogConfig {
    /// Free-form text log written to a file.
    pub fn text(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: LogDestination::File(path.into()),
            format: LogFormat::Text,
        }
    }

    /// Comma-delimited log with a header row, written to a file.
    pub fn structured<I, S>(path: impl Into<PathBuf>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            destination: LogDestination::File(path.into()),
            format: LogFormat::csv(fields),
        }
    }

    /// Log collected in memory.
    pub fn memory(sink: MemorySink, format: LogFormat) -> Self {
        Self {
            destination: LogDestination::Memory(sink),
            format,
        }
    }

    /// Structured logs need field names and a usable delimiter.
    pub fn validate(&self) -> Result<()> {
        if let LogFormat::Delimited { fields, delimiter } = &self.format {
            if fields.is_empty() {
                return Err(HarnessError::configuration(
                    "structured logging requires at least one field name",
                ));
            }
            if fields.iter().any(|f| f.contains(|c: char| c == '\n' || c == '\r')) {
                return Err(HarnessError::configuration(
                    "log field names must not contain line breaks",
                ));
            }
            if matches!(delimiter, '"' | '\n' | '\r') {
                return Err(HarnessError::configuration(format!(
                    "invalid log delimiter {:?}",
                    delimiter
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::<u32>::default();

        assert_eq!(config.participants, 1);
        assert_eq!(config.rounds, 1);
        assert_eq!(config.workers, 0);
        assert!(config.show_progress);
        assert!(config.log.is_none());
        assert!(config.retain_results);
        assert_eq!(config.condition_values(), vec![None]);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_invalid_counts_rejected() {
        let zero_participants = HarnessConfig::<u32>::new().with_participants(0);
        assert!(matches!(zero_participants.validate(), Err(HarnessError::Configuration(_))));

        let zero_rounds = HarnessConfig::<u32>::new().with_rounds(0);
        assert!(matches!(zero_rounds.validate(), Err(HarnessError::Configuration(_))));

        let no_conditions = HarnessConfig::<u32>::new().with_conditions(Vec::new());
        assert!(matches!(no_conditions.validate(), Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn test_structured_log_needs_fields() {
        let config = HarnessConfig::<u32>::new()
            .with_log(LogConfig::structured("log.csv", Vec::<String>::new()));
        assert!(matches!(config.validate(), Err(HarnessError::Configuration(_))));

        let broken = HarnessConfig::<u32>::new()
            .with_log(LogConfig::structured("log.csv", ["a", "b\nc"]));
        assert!(matches!(broken.validate(), Err(HarnessError::Configuration(_))));

        let ok = HarnessConfig::<u32>::new().with_log(LogConfig::structured("log.csv", ["a", "b"]));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_nan_condition_rejected() {
        let config = HarnessConfig::new().with_conditions([1.0, f64::NAN, 2.0]);
        assert!(matches!(config.validate(), Err(HarnessError::Configuration(_))));

        let finite = HarnessConfig::new().with_conditions([1.0, 1.0, 2.0]);
        assert!(finite.validate().is_ok());
        assert_eq!(finite.condition_values(), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_lazy_conditions_materialized_once() {
        let config = HarnessConfig::new().with_conditions((0..4).map(|i| 1u32 << i));

        assert_eq!(config.conditions, Some(vec![1, 2, 4, 8]));
        assert_eq!(config.condition_values(), config.condition_values());
    }

    #[test]
    fn test_duplicate_conditions_collapse() {
        let config = HarnessConfig::new().with_conditions(['a', 'b', 'a', 'c', 'b']);

        assert_eq!(config.condition_values(), vec![Some('a'), Some('b'), Some('c')]);
    }

    #[test]
    fn test_explicit_workers_kept() {
        let config = HarnessConfig::<u32>::new().with_workers(100);
        assert_eq!(config.effective_workers(), 100);
    }
}
