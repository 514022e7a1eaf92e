//! Trajectory simulation for statistical model checking.

pub mod simulate;
pub mod state;

pub use simulate::next_state;
pub use state::State;
