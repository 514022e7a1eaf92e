//! Simulation state: variable values, the global clock, and cached
//! trigger times for non-memoryless commands.

use std::fmt;
use stratus_model::CompiledModel;

/// A point on a simulated trajectory.
///
/// `State` is a value type: `next_state` produces a fresh successor
/// and never mutates in place, so independent samples of the same
/// property can branch from one initial state freely.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Variable values, indexed by variable index.
    pub values: Vec<i64>,
    /// Elapsed time since the start of the path.
    pub time: f64,
    /// Scheduled firing time per command; `+inf` means unscheduled.
    /// Only non-memoryless commands ever hold a finite entry.
    pub trigger_times: Vec<f64>,
}

impl State {
    /// Create a state at time zero with unscheduled commands.
    pub fn new(values: Vec<i64>, num_commands: usize) -> Self {
        Self {
            values,
            time: 0.0,
            trigger_times: vec![f64::INFINITY; num_commands],
        }
    }

    /// The model's initial state.
    pub fn initial(model: &CompiledModel) -> Self {
        Self::new(model.initial_values(), model.commands().len())
    }

    /// A copy restarted at time zero with all trigger caches cleared,
    /// for drawing a new independent trajectory from this state.
    pub fn restarted(&self) -> Self {
        Self::new(self.values.clone(), self.trigger_times.len())
    }

    /// True once the simulation is stuck with no enabled command.
    pub fn is_deadlocked(&self) -> bool {
        self.time.is_infinite()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "] @ {:.4}", self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let s = State::new(vec![1, 2], 3);
        assert_eq!(s.time, 0.0);
        assert_eq!(s.trigger_times, vec![f64::INFINITY; 3]);
        assert!(!s.is_deadlocked());
    }

    #[test]
    fn test_restarted_clears_clock_and_caches() {
        let mut s = State::new(vec![4], 2);
        s.time = 3.5;
        s.trigger_times[1] = 4.0;
        let r = s.restarted();
        assert_eq!(r.values, vec![4]);
        assert_eq!(r.time, 0.0);
        assert!(r.trigger_times[1].is_infinite());
    }

    #[test]
    fn test_display() {
        let s = State::new(vec![1, 2], 0);
        assert_eq!(s.to_string(), "[1, 2] @ 0.0000");
    }
}
