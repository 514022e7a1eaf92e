//! Statistical primitives for acceptance-sampling verification.

pub mod accumulator;
pub mod plan;
pub mod special;

pub use accumulator::Sample;
pub use plan::{PlanError, SingleSamplingPlan};
pub use special::{erf, erfinv, norminv, tinv};
