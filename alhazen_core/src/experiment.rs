//! The hook contract a concrete experiment implements.
//!
//! # Where hooks run
//!
//! ```text
//!   orchestrator (one thread)                 worker n (own clone of E)
//!   ─────────────────────────                 ─────────────────────────
//!   prepare_experiment(params)
//!   prepare_condition(c, ctx)  ── task{c, p, ctx.clone()} ──>  setup()  [first task only]
//!                                                              prepare_participant(task, ctx)
//!                                                              run_participant(...)        SingleShot
//!                                                              or run_participant_*(...)   Iterated
//!   finish_participant(p, c, r) <──────── result ──────────
//!   finish_condition(c, results)
//!   finish_experiment(results)
//! ```
//!
//! Orchestrator-side hooks mutate the orchestrator's instance, which is the
//! only place Aggregate State lives. Each worker owns a clone of the
//! experiment taken after `prepare_experiment`; whatever `setup()` and the
//! run hooks store on `self` stays inside that worker.
//!
//! # Choosing a participant style
//!
//! The associated `Style` type picks exactly one per-participant shape:
//!
//! ```ignore
//! impl Experiment for Walk {
//!     type Condition = f64;
//!     type Output = Vec<f64>;
//!     type Style = Iterated;
//! }
//!
//! impl IteratedExperiment for Walk {
//!     type Round = f64;
//!     fn run_participant_run(&mut self, round: usize, task: &Task<'_, f64>, ctx: &mut Context)
//!         -> HookResult<f64> { ... }
//! }
//! ```

use crate::logger::Logger;
use crate::results::RunResults;
use crate::rounds::drive_rounds;
use crate::worker::WorkerInfo;
use alhazen_env::{Context, Params, WorkerId};
use std::fmt;

/// Result type returned by user hooks.
pub type HookResult<T> = anyhow::Result<T>;

/// Lifecycle hooks shared by both participant styles.
///
/// Every hook has a no-op default; only the participant style's run hooks
/// are mandatory.
pub trait Experiment: Clone + Send + 'static {
    /// One point in the condition sweep.
    type Condition: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Participant Result.
    type Output: Send + 'static;

    /// `SingleShot` or `Iterated`.
    type Style: ParticipantStyle<Self>;

    /// Called once per worker, inside the worker, before its first task.
    ///
    /// The place to create resources that must not be shared between
    /// workers, such as an RNG (`worker.rng()`).
    fn setup(&mut self, _worker: &WorkerInfo) -> HookResult<()> {
        Ok(())
    }

    /// Called once per run, in the orchestrator, before the pool exists.
    ///
    /// Workers clone the experiment after this hook, so anything stored
    /// here (including a clone of `log`) is visible to every worker.
    fn prepare_experiment(&mut self, _params: &Params, _log: &Logger) -> HookResult<()> {
        Ok(())
    }

    /// Called once per condition, in the orchestrator, to build the
    /// baseline context every participant of the condition starts from.
    fn prepare_condition(
        &mut self,
        _condition: Option<&Self::Condition>,
        _context: &mut Context,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Called in the worker, on the participant's private context copy.
    fn prepare_participant(
        &mut self,
        _task: &Task<'_, Self::Condition>,
        _context: &mut Context,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Called in the orchestrator once per (condition, participant) as its
    /// result arrives. The returned value is what gets retained.
    fn finish_participant(
        &mut self,
        _participant: usize,
        _condition: Option<&Self::Condition>,
        result: Self::Output,
    ) -> HookResult<Self::Output> {
        Ok(result)
    }

    /// Called in the orchestrator after every participant of the condition
    /// has finished. `results` is ordered by participant index (empty when
    /// results are not retained).
    fn finish_condition(
        &mut self,
        _condition: Option<&Self::Condition>,
        results: Vec<Self::Output>,
    ) -> HookResult<Vec<Self::Output>> {
        Ok(results)
    }

    /// Called in the orchestrator after every condition has finished.
    fn finish_experiment(
        &mut self,
        results: RunResults<Self::Condition, Self::Output>,
    ) -> HookResult<RunResults<Self::Condition, Self::Output>> {
        Ok(results)
    }
}

/// Single-shot participant: one call produces the whole result.
pub trait SingleShotExperiment: Experiment {
    fn run_participant(
        &mut self,
        task: &Task<'_, Self::Condition>,
        context: &mut Context,
    ) -> HookResult<Self::Output>;
}

/// Iterated participant: the harness drives a round loop.
///
/// Used with `type Style = Iterated`. The values returned by
/// [`run_participant_finish`](Self::run_participant_finish) are converted
/// into `Self::Output` with `From<Vec<Self::Round>>`, so `Output` is usually
/// `Vec<Self::Round>` itself; any other type that implements that
/// conversion works too.
pub trait IteratedExperiment: Experiment {
    /// Value produced by one round.
    type Round: Send + 'static;

    /// Called once before round 0.
    fn run_participant_prepare(
        &mut self,
        _task: &Task<'_, Self::Condition>,
        _context: &mut Context,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Executes one round.
    fn run_participant_run(
        &mut self,
        round: usize,
        task: &Task<'_, Self::Condition>,
        context: &mut Context,
    ) -> HookResult<Self::Round>;

    /// Decides whether another round follows `round`.
    ///
    /// Defaults to exactly `task.rounds` rounds. Overrides may stop early or
    /// run past the nominal count.
    fn run_participant_continue(
        &mut self,
        round: usize,
        task: &Task<'_, Self::Condition>,
        _context: &Context,
    ) -> bool {
        round + 1 < task.rounds
    }

    /// Reshapes the accumulated round values before they are converted into
    /// the Participant Result. Defaults to identity.
    fn run_participant_finish(
        &mut self,
        _task: &Task<'_, Self::Condition>,
        results: Vec<Self::Round>,
    ) -> HookResult<Vec<Self::Round>> {
        Ok(results)
    }
}

/// Execution strategy for one participant, selected per experiment type.
pub trait ParticipantStyle<E: Experiment> {
    fn execute(
        experiment: &mut E,
        task: &Task<'_, E::Condition>,
        context: &mut Context,
    ) -> HookResult<E::Output>;
}

/// Marker: the experiment implements `SingleShotExperiment`.
#[derive(Debug, Clone, Copy)]
pub enum SingleShot {}

/// Marker: the experiment implements `IteratedExperiment`.
#[derive(Debug, Clone, Copy)]
pub enum Iterated {}

impl<E: SingleShotExperiment> ParticipantStyle<E> for SingleShot {
    fn execute(
        experiment: &mut E,
        task: &Task<'_, E::Condition>,
        context: &mut Context,
    ) -> HookResult<E::Output> {
        experiment.run_participant(task, context)
    }
}

impl<E> ParticipantStyle<E> for Iterated
where
    E: IteratedExperiment,
    E::Output: From<Vec<E::Round>>,
{
    fn execute(
        experiment: &mut E,
        task: &Task<'_, E::Condition>,
        context: &mut Context,
    ) -> HookResult<E::Output> {
        drive_rounds(experiment, task, context).map(Into::into)
    }
}

/// Read-only view of the participant task being executed in a worker.
#[derive(Debug)]
pub struct Task<'a, C> {
    /// Participant index within its condition, in `[0, participants)`
    pub participant: usize,

    /// Condition value (`None` for the null condition)
    pub condition: Option<&'a C>,

    /// Nominal round count
    pub rounds: usize,

    /// Worker executing the task
    pub worker: WorkerId,

    log: &'a Logger,
}

impl<'a, C> Task<'a, C> {
    pub fn new(
        participant: usize,
        condition: Option<&'a C>,
        rounds: usize,
        worker: WorkerId,
        log: &'a Logger,
    ) -> Self {
        Self {
            participant,
            condition,
            rounds,
            worker,
            log,
        }
    }

    /// Experiment log handle, usable from any run hook.
    pub fn log(&self) -> &'a Logger {
        self.log
    }
}
