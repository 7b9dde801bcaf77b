//! Worker Runtime - a fixed-size pool of worker threads.
//!
//! Each worker owns a private clone of the experiment (its worker context)
//! and a private task queue. Nothing a worker stores is ever visible to
//! another worker or to the orchestrator; results travel back over a
//! channel.
//!
//! # Partitioning
//!
//! Tasks are assigned round-robin by dispatch order: the k-th submitted task
//! goes to worker `k % size`. Workers are spawned on their first task, so a
//! pool larger than the workload leaves the extra workers unspawned, and
//! a given (seed, worker count) always maps the same tasks to the same
//! worker RNG.

use crate::experiment::{Experiment, ParticipantStyle, Task};
use crate::logger::Logger;
use alhazen_env::{Context, HarnessError, Result, WorkerId};
use crossbeam::channel::{self, Receiver, Sender};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// What a worker knows about itself; passed to `setup()`.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    id: WorkerId,
    master_seed: Option<u64>,
    log: Logger,
}

impl WorkerInfo {
    pub fn new(id: WorkerId, master_seed: Option<u64>, log: Logger) -> Self {
        Self { id, master_seed, log }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Seed for this worker, derived from the master seed and worker index.
    ///
    /// `None` when the run has no master seed.
    pub fn seed(&self) -> Option<u64> {
        self.master_seed.map(|master| {
            master
                .wrapping_mul(0x9e3779b97f4a7c15)
                .wrapping_add((self.id.0 as u64).wrapping_mul(0x517cc1b727220a95))
        })
    }

    /// A fresh RNG owned by this worker.
    ///
    /// Seeded from `seed()` when a master seed is configured, otherwise
    /// from OS entropy.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed() {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Experiment log handle.
    pub fn log(&self) -> &Logger {
        &self.log
    }
}

/// A participant task on its way to a worker.
#[derive(Debug)]
pub(crate) struct PendingTask<C> {
    pub condition_index: usize,
    pub condition: Option<C>,
    pub participant: usize,
    pub context: Context,
}

/// A finished task on its way back to the orchestrator.
#[derive(Debug)]
pub(crate) struct TaskOutcome<O> {
    pub condition_index: usize,
    pub participant: usize,
    pub worker: WorkerId,
    pub result: std::result::Result<O, String>,
}

struct WorkerSlot<C> {
    tx: Sender<PendingTask<C>>,
    handle: JoinHandle<()>,
}

/// Pool of lazily spawned worker threads.
pub(crate) struct WorkerPool<E: Experiment> {
    /// Source of each worker's private clone
    template: E,

    /// Configured pool size
    size: usize,

    /// Spawned workers, indexed by worker id
    slots: Vec<WorkerSlot<E::Condition>>,

    results_tx: Sender<TaskOutcome<E::Output>>,
    results_rx: Receiver<TaskOutcome<E::Output>>,

    /// Raised on the first fault; workers skip tasks they have not started
    abort: Arc<AtomicBool>,

    rounds: usize,
    master_seed: Option<u64>,
    log: Logger,

    /// Tasks submitted so far (round-robin cursor)
    submitted: usize,
}

impl<E: Experiment> WorkerPool<E> {
    pub(crate) fn new(template: E, size: usize, rounds: usize, master_seed: Option<u64>, log: Logger) -> Self {
        let (results_tx, results_rx) = channel::unbounded();
        Self {
            template,
            size: size.max(1),
            slots: Vec::new(),
            results_tx,
            results_rx,
            abort: Arc::new(AtomicBool::new(false)),
            rounds,
            master_seed,
            log,
            submitted: 0,
        }
    }

    /// Queues a task on its round-robin worker. Never blocks.
    pub(crate) fn submit(&mut self, task: PendingTask<E::Condition>) -> Result<WorkerId> {
        let index = self.submitted % self.size;
        if index == self.slots.len() {
            self.spawn_worker(index)?;
        }

        self.slots[index]
            .tx
            .send(task)
            .map_err(|_| HarnessError::pool(format!("worker-{} is gone", index)))?;
        self.submitted += 1;
        Ok(WorkerId(index))
    }

    fn spawn_worker(&mut self, index: usize) -> Result<()> {
        let (tx, rx) = channel::unbounded();
        let experiment = self.template.clone();
        let info = WorkerInfo::new(WorkerId(index), self.master_seed, self.log.clone());
        let results = self.results_tx.clone();
        let abort = Arc::clone(&self.abort);
        let rounds = self.rounds;

        let handle = thread::Builder::new()
            .name(format!("alhazen-worker-{}", index))
            .spawn(move || worker_loop(experiment, info, rounds, rx, results, abort))
            .map_err(|e| HarnessError::pool(format!("cannot spawn worker-{}: {}", index, e)))?;

        self.slots.push(WorkerSlot { tx, handle });
        Ok(())
    }

    /// Blocks until the next result arrives.
    pub(crate) fn recv(&self) -> Result<TaskOutcome<E::Output>> {
        // The pool holds a sender itself, so this only fails if every
        // worker died without reporting.
        self.results_rx
            .recv()
            .map_err(|_| HarnessError::pool("result channel closed"))
    }

    /// Returns a result if one is already waiting.
    pub(crate) fn try_recv(&self) -> Option<TaskOutcome<E::Output>> {
        self.results_rx.try_recv().ok()
    }

    /// Makes workers skip every task they have not started yet.
    pub(crate) fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Number of workers spawned so far.
    pub(crate) fn workers_used(&self) -> usize {
        self.slots.len()
    }

    /// Closes every task queue and waits for the workers to exit.
    ///
    /// Tasks already running finish first. Returns the number of workers
    /// that were used.
    pub(crate) fn shutdown(self) -> usize {
        let used = self.slots.len();
        for (index, slot) in self.slots.into_iter().enumerate() {
            drop(slot.tx);
            if slot.handle.join().is_err() {
                warn!("worker-{} exited abnormally", index);
            }
        }
        used
    }
}

/// Body of one worker thread.
fn worker_loop<E: Experiment>(
    mut experiment: E,
    info: WorkerInfo,
    rounds: usize,
    tasks: Receiver<PendingTask<E::Condition>>,
    results: Sender<TaskOutcome<E::Output>>,
    abort: Arc<AtomicBool>,
) {
    let mut setup: Option<std::result::Result<(), String>> = None;
    let mut executed = 0usize;

    for pending in tasks.iter() {
        if abort.load(Ordering::Acquire) {
            continue;
        }

        // One-time setup, on the first task this worker receives
        let ready = setup.get_or_insert_with(|| {
            debug!(worker = %info.id(), "Worker setup");
            guarded(|| experiment.setup(&info))
        });

        let PendingTask {
            condition_index,
            condition,
            participant,
            context,
        } = pending;
        let result = match ready {
            Err(message) => Err(format!("setup failed: {}", message)),
            Ok(()) => run_task(&mut experiment, &info, rounds, participant, condition.as_ref(), context),
        };
        executed += 1;

        let outcome = TaskOutcome {
            condition_index,
            participant,
            worker: info.id(),
            result,
        };
        if results.send(outcome).is_err() {
            break;
        }
    }

    debug!(worker = %info.id(), tasks = executed, "Worker finished");
}

/// Runs prepare_participant and the participant style for one task.
fn run_task<E: Experiment>(
    experiment: &mut E,
    info: &WorkerInfo,
    rounds: usize,
    participant: usize,
    condition: Option<&E::Condition>,
    mut context: Context,
) -> std::result::Result<E::Output, String> {
    let task = Task::new(participant, condition, rounds, info.id(), info.log());

    guarded(|| {
        experiment.prepare_participant(&task, &mut context)?;
        <E::Style as ParticipantStyle<E>>::execute(experiment, &task, &mut context)
    })
}

/// Runs a hook, turning both errors and panics into a message.
pub(crate) fn guarded<T>(hook: impl FnOnce() -> anyhow::Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{HookResult, SingleShot, SingleShotExperiment};
    use std::collections::{HashMap, HashSet};

    /// Echoes (participant, worker, setup count) and keeps a per-worker task counter.
    #[derive(Clone, Default)]
    struct Tagger {
        setups: usize,
        tasks_seen: usize,
        fail_participant: Option<usize>,
        panic_participant: Option<usize>,
    }

    impl Experiment for Tagger {
        type Condition = u32;
        type Output = (usize, WorkerId, usize, usize);
        type Style = SingleShot;

        fn setup(&mut self, _worker: &WorkerInfo) -> HookResult<()> {
            self.setups += 1;
            Ok(())
        }
    }

    impl SingleShotExperiment for Tagger {
        fn run_participant(&mut self, task: &Task<'_, u32>, _ctx: &mut Context) -> HookResult<Self::Output> {
            if self.fail_participant == Some(task.participant) {
                anyhow::bail!("participant {} refused", task.participant);
            }
            if self.panic_participant == Some(task.participant) {
                panic!("participant {} panicked", task.participant);
            }
            self.tasks_seen += 1;
            Ok((task.participant, task.worker, self.setups, self.tasks_seen))
        }
    }

    fn pending(participant: usize) -> PendingTask<u32> {
        PendingTask {
            condition_index: 0,
            condition: Some(1),
            participant,
            context: Context::new(),
        }
    }

    fn run_all(pool: &mut WorkerPool<Tagger>, count: usize) -> Vec<TaskOutcome<(usize, WorkerId, usize, usize)>> {
        for p in 0..count {
            pool.submit(pending(p)).unwrap();
        }
        (0..count).map(|_| pool.recv().unwrap()).collect()
    }

    #[test]
    fn test_round_robin_assignment() {
        let mut pool = WorkerPool::new(Tagger::default(), 3, 1, None, Logger::disabled());

        let ids: Vec<WorkerId> = (0..7).map(|p| pool.submit(pending(p)).unwrap()).collect();
        assert_eq!(ids.iter().map(|w| w.0).collect::<Vec<_>>(), vec![0, 1, 2, 0, 1, 2, 0]);

        for _ in 0..7 {
            let outcome = pool.recv().unwrap();
            assert_eq!(outcome.worker.0, outcome.participant % 3);
        }
        assert_eq!(pool.shutdown(), 3);
    }

    #[test]
    fn test_setup_once_per_worker_and_state_persists() {
        let mut pool = WorkerPool::new(Tagger::default(), 2, 1, None, Logger::disabled());
        let outcomes = run_all(&mut pool, 10);

        let mut per_worker: HashMap<WorkerId, Vec<usize>> = HashMap::new();
        for outcome in outcomes {
            let (_, worker, setups, seen) = outcome.result.unwrap();
            assert_eq!(setups, 1);
            per_worker.entry(worker).or_default().push(seen);
        }

        assert_eq!(per_worker.len(), 2);
        for seen in per_worker.values_mut() {
            seen.sort();
            assert_eq!(*seen, (1..=5).collect::<Vec<_>>());
        }
        pool.shutdown();
    }

    #[test]
    fn test_oversized_pool_spawns_only_needed_workers() {
        let mut pool = WorkerPool::new(Tagger::default(), 100, 1, None, Logger::disabled());
        let outcomes = run_all(&mut pool, 20);

        let workers: HashSet<WorkerId> = outcomes.iter().map(|o| o.worker).collect();
        assert_eq!(workers.len(), 20);
        assert_eq!(pool.workers_used(), 20);
        assert_eq!(pool.shutdown(), 20);
    }

    #[test]
    fn test_errors_and_panics_become_messages() {
        let tagger = Tagger {
            fail_participant: Some(1),
            panic_participant: Some(2),
            ..Default::default()
        };
        let mut pool = WorkerPool::new(tagger, 4, 1, None, Logger::disabled());
        let mut outcomes = run_all(&mut pool, 4);
        outcomes.sort_by_key(|o| o.participant);

        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.as_ref().unwrap_err().contains("refused"));
        assert!(outcomes[2].result.as_ref().unwrap_err().contains("panicked"));
        assert!(outcomes[3].result.is_ok());
        pool.shutdown();
    }

    #[test]
    fn test_failed_setup_fails_every_task_on_that_worker() {
        #[derive(Clone)]
        struct BrokenSetup;

        impl Experiment for BrokenSetup {
            type Condition = u32;
            type Output = ();
            type Style = SingleShot;

            fn setup(&mut self, _worker: &WorkerInfo) -> HookResult<()> {
                anyhow::bail!("no resources")
            }
        }

        impl SingleShotExperiment for BrokenSetup {
            fn run_participant(&mut self, _task: &Task<'_, u32>, _ctx: &mut Context) -> HookResult<()> {
                Ok(())
            }
        }

        let mut pool = WorkerPool::new(BrokenSetup, 1, 1, None, Logger::disabled());
        for p in 0..3 {
            pool.submit(pending(p)).unwrap();
        }
        for _ in 0..3 {
            let outcome = pool.recv().unwrap();
            assert!(outcome.result.unwrap_err().contains("setup failed: no resources"));
        }
        pool.shutdown();
    }

    #[test]
    fn test_worker_seeds() {
        let log = Logger::disabled();
        let a = WorkerInfo::new(WorkerId(0), Some(42), log.clone());
        let b = WorkerInfo::new(WorkerId(1), Some(42), log.clone());
        let a_again = WorkerInfo::new(WorkerId(0), Some(42), log.clone());
        let unseeded = WorkerInfo::new(WorkerId(0), None, log);

        assert_ne!(a.seed(), b.seed());
        assert_eq!(a.seed(), a_again.seed());
        assert_eq!(unseeded.seed(), None);

        use rand::Rng;
        let x: u64 = a.rng().gen();
        let y: u64 = a_again.rng().gen();
        let z: u64 = b.rng().gen();
        assert_eq!(x, y);
        assert_ne!(x, z);
    }
}
