//! One-step successor generation.
//!
//! Every enabled command races: memoryless delays are redrawn each
//! step, history-dependent delays keep their scheduled firing time
//! while continuously enabled. The earliest scheduled command fires;
//! exact ties are broken uniformly with a running streak counter, so
//! ties never need to be collected before one is chosen.

use rand::Rng;
use stratus_model::{eval, eval_bool, CompiledModel, EvalResult};

use crate::state::State;

/// Compute the successor of `state`.
///
/// If no command is enabled the successor is the same assignment with
/// `time = +inf` (deadlock); callers observe this via
/// [`State::is_deadlocked`].
pub fn next_state<R: Rng + ?Sized>(
    model: &CompiledModel,
    state: &State,
    rng: &mut R,
) -> EvalResult<State> {
    let commands = model.commands();
    let mut trigger_times = state.trigger_times.clone();

    let mut trigger: Option<usize> = None;
    let mut trigger_time = f64::INFINITY;
    let mut streak = 1u32;

    for (i, cmd) in commands.iter().enumerate() {
        if eval_bool(&cmd.guard, &state.values)? {
            let t = if cmd.delay.is_memoryless() {
                state.time + cmd.delay.sample(&state.values, rng)?
            } else if trigger_times[i].is_finite() {
                // Continuation: keep the previously scheduled firing time.
                trigger_times[i]
            } else {
                let t = state.time + cmd.delay.sample(&state.values, rng)?;
                trigger_times[i] = t;
                t
            };
            if t < trigger_time {
                trigger = Some(i);
                trigger_time = t;
                streak = 1;
            } else if t == trigger_time {
                streak += 1;
                if rng.gen::<f64>() * f64::from(streak) < 1.0 {
                    trigger = Some(i);
                }
            }
        } else if !cmd.delay.is_memoryless() {
            // Disabled: drop the schedule so re-enabling resamples.
            trigger_times[i] = f64::INFINITY;
        }
    }

    let Some(trigger) = trigger else {
        // Deadlock. The successor still carries the schedule resets for
        // commands that went disabled this step.
        return Ok(State {
            values: state.values.clone(),
            time: f64::INFINITY,
            trigger_times,
        });
    };

    // Updates read the pre-transition state.
    let mut values = state.values.clone();
    for update in &commands[trigger].updates {
        values[update.variable] = eval(&update.expr, &state.values)?;
    }
    if !commands[trigger].delay.is_memoryless() {
        trigger_times[trigger] = f64::INFINITY;
    }

    Ok(State {
        values,
        time: trigger_time,
        trigger_times,
    })
}
