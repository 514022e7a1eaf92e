//! Statistical CSL model checking over compiled stochastic models.
//!
//! Properties are verified by acceptance sampling: trajectories are drawn
//! from the model and an hypothesis test decides, within configurable error
//! bounds, whether the probability of the path formula meets the threshold.

pub mod effort;
pub mod formula;
pub mod session;
pub mod verify;

pub use effort::optimal_nested_error;
pub use formula::{CmpOp, PathFormula, Property, StateFormula};
pub use session::{
    Algorithm, CacheEntry, LocalSampler, ModelCheckingStats, SampleSource, SamplingParams,
    Session, VerifyError, VerifyResult,
};
