//! Orchestrator - expands the sweep into participant tasks and drives a run.
//!
//! One orchestrator executes exactly one run:
//!
//! ```text
//! open log ─> prepare_experiment ─> spawn pool (lazy)
//!   for each condition (sweep order):
//!       prepare_condition(ctx) ─> submit P tasks with ctx copies ─> drain ready results
//!   block until every task has reported
//!       finish_participant per result, finish_condition when a condition completes
//! finish_experiment ─> shut down pool ─> close log
//! ```
//!
//! The first fault aborts the run: workers skip tasks they have not started,
//! tasks already running finish, partial results are discarded and that
//! fault is the single error `run()` returns.

use crate::config::HarnessConfig;
use crate::experiment::{Experiment, HookResult};
use crate::logger::{LogCollector, Logger};
use crate::progress::ProgressReporter;
use crate::results::{ConditionResults, RunResults};
use crate::worker::{guarded, PendingTask, TaskOutcome, WorkerPool};
use alhazen_env::{Context, HarnessError, Params, Result, RunId};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

/// Counters for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,

    /// Distinct conditions in the sweep
    pub conditions: usize,

    /// Participants finished across all conditions
    pub participants_finished: u64,

    /// Configured pool size after resolving 0 to the core count
    pub workers: usize,

    /// Workers that received at least one task
    pub workers_used: usize,

    /// Records written to the experiment log (header excluded)
    pub log_records: u64,

    pub elapsed: Duration,
}

/// Drives a single run of an experiment.
pub struct Orchestrator<E: Experiment> {
    /// Orchestrator-side instance; holds the Aggregate State
    experiment: E,
    config: HarnessConfig<E::Condition>,

    /// Distinct conditions in sweep order
    conditions: Vec<Option<E::Condition>>,
    run_id: RunId,
    has_run: bool,
    summary: Option<RunSummary>,
}

impl<E: Experiment> Orchestrator<E> {
    /// Validates the configuration and materializes the condition sweep.
    pub fn new(experiment: E, config: HarnessConfig<E::Condition>) -> Result<Self> {
        config.validate()?;
        let conditions = config.condition_values();

        Ok(Self {
            experiment,
            config,
            conditions,
            run_id: RunId::new(),
            has_run: false,
            summary: None,
        })
    }

    pub fn config(&self) -> &HarnessConfig<E::Condition> {
        &self.config
    }

    /// Distinct conditions in the order they run.
    pub fn conditions(&self) -> &[Option<E::Condition>] {
        &self.conditions
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The orchestrator-side experiment, with whatever the finish hooks
    /// accumulated.
    pub fn experiment(&self) -> &E {
        &self.experiment
    }

    pub fn into_experiment(self) -> E {
        self.experiment
    }

    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Counters from the last successful run.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Executes the run with no extra parameters.
    pub fn run(&mut self) -> Result<RunResults<E::Condition, E::Output>> {
        self.run_with(Params::new())
    }

    /// Executes the run, forwarding `params` to `prepare_experiment`.
    ///
    /// Fails with `HarnessError::Reuse` on every call after the first,
    /// whether or not the first call succeeded.
    pub fn run_with(&mut self, params: Params) -> Result<RunResults<E::Condition, E::Output>> {
        if self.has_run {
            warn!(run_id = %self.run_id, "Orchestrator reused");
            return Err(HarnessError::Reuse);
        }
        self.has_run = true;

        let span = info_span!("run", run_id = %self.run_id);
        let _enter = span.enter();
        let started = Instant::now();

        let (logger, collector) = match &self.config.log {
            Some(log) => {
                let (logger, collector) = LogCollector::start(log)?;
                (logger, Some(collector))
            }
            None => (Logger::disabled(), None),
        };

        let outcome = self.execute(&params, &logger);
        drop(logger);

        // Close the log even after a fault; the earlier error wins
        let records = match collector {
            Some(collector) => collector.finish(),
            None => Ok(0),
        };
        let (results, mut summary) = outcome?;
        summary.log_records = records?;
        summary.elapsed = started.elapsed();

        info!(
            participants = summary.participants_finished,
            conditions = summary.conditions,
            workers_used = summary.workers_used,
            log_records = summary.log_records,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run complete"
        );
        self.summary = Some(summary);
        Ok(results)
    }

    fn execute(
        &mut self,
        params: &Params,
        logger: &Logger,
    ) -> Result<(RunResults<E::Condition, E::Output>, RunSummary)> {
        let conditions = self.conditions.clone();
        let workers = self.config.effective_workers();
        let total = (self.config.participants * conditions.len()) as u64;

        run_hook("prepare_experiment", || {
            self.experiment.prepare_experiment(params, logger)
        })?;

        info!(
            participants = self.config.participants,
            conditions = conditions.len(),
            rounds = self.config.rounds,
            workers,
            "Starting run"
        );

        // Workers clone the experiment as prepare_experiment left it
        let mut pool = WorkerPool::new(
            self.experiment.clone(),
            workers,
            self.config.rounds,
            self.config.seed,
            logger.clone(),
        );
        let mut progress = ProgressReporter::new(total, self.config.show_progress);
        let mut ledger = Ledger::new(
            conditions.len(),
            self.config.participants,
            self.config.retain_results,
        );

        let outcome = self.dispatch(&conditions, &mut pool, &mut progress, &mut ledger);
        match &outcome {
            Ok(_) => progress.finish(),
            Err(e) => {
                error!(error = %e, "Run aborted");
                pool.abort();
                progress.abandon();
            }
        }

        // Let in-flight tasks drain before reporting
        let workers_used = pool.shutdown();
        let results = outcome?;

        let summary = RunSummary {
            run_id: self.run_id,
            conditions: conditions.len(),
            participants_finished: progress.completed(),
            workers,
            workers_used,
            log_records: 0,
            elapsed: Duration::ZERO,
        };
        Ok((results, summary))
    }

    fn dispatch(
        &mut self,
        conditions: &[Option<E::Condition>],
        pool: &mut WorkerPool<E>,
        progress: &mut ProgressReporter,
        ledger: &mut Ledger<E::Output>,
    ) -> Result<RunResults<E::Condition, E::Output>> {
        for (index, condition) in conditions.iter().enumerate() {
            let mut context = Context::new();
            run_hook("prepare_condition", || {
                self.experiment.prepare_condition(condition.as_ref(), &mut context)
            })?;

            debug!(condition = %describe(condition), "Dispatching condition");
            for participant in 0..self.config.participants {
                pool.submit(PendingTask {
                    condition_index: index,
                    condition: condition.clone(),
                    participant,
                    context: context.clone(),
                })?;
                ledger.dispatched();
            }

            while let Some(outcome) = pool.try_recv() {
                self.accept(outcome, conditions, progress, ledger)?;
            }
        }

        while ledger.outstanding() > 0 {
            let outcome = pool.recv()?;
            self.accept(outcome, conditions, progress, ledger)?;
        }

        let results = ledger.take_results(conditions);
        run_hook("finish_experiment", || self.experiment.finish_experiment(results))
    }

    /// Folds one worker result into the Aggregate State.
    fn accept(
        &mut self,
        outcome: TaskOutcome<E::Output>,
        conditions: &[Option<E::Condition>],
        progress: &mut ProgressReporter,
        ledger: &mut Ledger<E::Output>,
    ) -> Result<()> {
        let TaskOutcome {
            condition_index,
            participant,
            worker,
            result,
        } = outcome;
        let condition = &conditions[condition_index];

        let value = result.map_err(|message| HarnessError::Participant {
            condition: describe(condition),
            participant,
            worker,
            message,
        })?;

        ledger.claim(condition_index, participant)?;
        let value = run_hook("finish_participant", || {
            self.experiment
                .finish_participant(participant, condition.as_ref(), value)
        })?;
        progress.advance();

        if let Some(results) = ledger.store(condition_index, participant, value) {
            let results = run_hook("finish_condition", || {
                self.experiment.finish_condition(condition.as_ref(), results)
            })?;
            debug!(condition = %describe(condition), "Condition finished");
            ledger.close(condition_index, results);
        }
        Ok(())
    }
}

/// Runs an orchestrator-side hook, mapping errors and panics to
/// `HarnessError::Orchestrator`.
fn run_hook<T>(hook: &'static str, f: impl FnOnce() -> HookResult<T>) -> Result<T> {
    guarded(f).map_err(|message| HarnessError::Orchestrator { hook, message })
}

fn describe<C: std::fmt::Debug>(condition: &Option<C>) -> String {
    match condition {
        Some(c) => format!("{:?}", c),
        None => "none".to_string(),
    }
}

/// Per-condition completion tracking.
struct Ledger<O> {
    groups: Vec<Group<O>>,
    retain: bool,
    outstanding: usize,
}

struct Group<O> {
    delivered: Vec<bool>,
    remaining: usize,
    slots: Vec<Option<O>>,
    finished: Vec<O>,
}

impl<O> Ledger<O> {
    fn new(conditions: usize, participants: usize, retain: bool) -> Self {
        let groups = (0..conditions)
            .map(|_| Group {
                delivered: vec![false; participants],
                remaining: participants,
                slots: (0..participants).map(|_| None).collect(),
                finished: Vec::new(),
            })
            .collect();

        Self {
            groups,
            retain,
            outstanding: 0,
        }
    }

    fn dispatched(&mut self) {
        self.outstanding += 1;
    }

    fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Marks a (condition, participant) result as delivered.
    fn claim(&mut self, condition: usize, participant: usize) -> Result<()> {
        let group = &mut self.groups[condition];
        if std::mem::replace(&mut group.delivered[participant], true) {
            return Err(HarnessError::pool(format!(
                "participant {} of condition #{} reported twice",
                participant, condition
            )));
        }
        self.outstanding -= 1;
        Ok(())
    }

    /// Stores a claimed result. Returns the condition's ordered results
    /// once its last participant arrives.
    fn store(&mut self, condition: usize, participant: usize, value: O) -> Option<Vec<O>> {
        let group = &mut self.groups[condition];
        if self.retain {
            group.slots[participant] = Some(value);
        }
        group.remaining -= 1;

        (group.remaining == 0).then(|| group.slots.drain(..).flatten().collect())
    }

    fn close(&mut self, condition: usize, results: Vec<O>) {
        self.groups[condition].finished = results;
    }

    fn take_results<C: Clone>(&mut self, conditions: &[Option<C>]) -> RunResults<C, O> {
        let groups = conditions
            .iter()
            .zip(self.groups.iter_mut())
            .map(|(condition, group)| ConditionResults {
                condition: condition.clone(),
                results: std::mem::take(&mut group.finished),
            })
            .collect();
        RunResults::new(groups)
    }
}
