//! Round Iterator - drives one participant's round loop inside a worker.

use crate::experiment::{HookResult, IteratedExperiment, Task};
use alhazen_env::Context;

/// Runs the iterated hooks for one participant.
///
/// ```text
/// run_participant_prepare
/// round = 0
/// loop:
///     values.push(run_participant_run(round))
///     if !run_participant_continue(round): break
///     round += 1
/// run_participant_finish(values)
/// ```
///
/// At least one round always executes. With the default continuation the
/// loop runs exactly `task.rounds` times.
pub fn drive_rounds<E: IteratedExperiment>(
    experiment: &mut E,
    task: &Task<'_, E::Condition>,
    context: &mut Context,
) -> HookResult<Vec<E::Round>> {
    experiment.run_participant_prepare(task, context)?;

    let mut values = Vec::with_capacity(task.rounds);
    let mut round = 0;
    loop {
        values.push(experiment.run_participant_run(round, task, context)?);
        if !experiment.run_participant_continue(round, task, context) {
            break;
        }
        round += 1;
    }

    experiment.run_participant_finish(task, values)
}
