//! Verification sessions.
//!
//! A [`Session`] carries everything that persists across samples and across
//! repeated verification runs of the same property: the random number
//! generator, the per-operator memoization caches, accumulated run
//! statistics, and the source that produces path samples (local simulation
//! or a distributed broker).

use std::collections::HashMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use stratus_model::EvalError;
use stratus_stats::{PlanError, Sample};
use thiserror::Error;

/// Acceptance-sampling algorithm used for probabilistic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Fixed sample size, accept on observed proportion.
    Fixed,
    /// Sequential estimation with a Chow-Robbins stopping rule.
    Estimate,
    /// Single sampling plan with early termination.
    Ssp,
    /// Wald's sequential probability ratio test.
    Sprt,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Algorithm::Fixed => "fixed",
            Algorithm::Estimate => "estimate",
            Algorithm::Ssp => "ssp",
            Algorithm::Sprt => "sprt",
        };
        f.write_str(s)
    }
}

/// Tunable knobs shared by all verification algorithms.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub algorithm: Algorithm,
    /// Half-width of the indifference region around the threshold.
    pub delta: f64,
    /// Sample size for [`Algorithm::Fixed`].
    pub fixed_sample_size: u64,
    /// Reuse sample tallies across repeated verifications of the same
    /// probabilistic operator in the same state.
    pub memoization: bool,
    /// Trajectories longer than this are rejected.
    pub max_path_length: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            algorithm: Algorithm::Sprt,
            delta: 1e-2,
            fixed_sample_size: 1000,
            memoization: false,
            max_path_length: 1_000_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("sample source failed: {0}")]
    Source(String),
}

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Memoized tally for one probabilistic operator in one state.
///
/// `stat` is the success count for fixed, estimation, and single-sampling-plan
/// runs, and the accumulated log likelihood ratio for sequential probability
/// ratio runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheEntry {
    pub count: u64,
    pub stat: f64,
}

/// Per-run summary statistics, one observation per top-level verification.
#[derive(Debug, Clone, Default)]
pub struct ModelCheckingStats {
    /// Samples drawn by the outermost probabilistic operator.
    pub sample_size: Sample,
    /// Lengths of trajectories simulated at the outermost level.
    pub path_length: Sample,
    /// Wall-clock seconds per verification run.
    pub elapsed: Sample,
}

/// Produces path-formula samples for the outermost probabilistic operator.
///
/// `local` simulates one trajectory on the caller's own model; a
/// distributed implementation may instead hand back a sample received from
/// a remote worker, falling back to `local` to stay live.
pub trait SampleSource {
    /// Called when a sampling campaign for the probabilistic operator with
    /// the given cache id starts.
    fn start(&mut self, _property_index: usize) -> VerifyResult<()> {
        Ok(())
    }

    /// Called when the campaign ends.
    fn stop(&mut self) -> VerifyResult<()> {
        Ok(())
    }

    fn next_sample(
        &mut self,
        local: &mut dyn FnMut() -> VerifyResult<bool>,
    ) -> VerifyResult<bool>;
}

/// The default source: every sample is simulated in-process.
#[derive(Debug, Default)]
pub struct LocalSampler;

impl SampleSource for LocalSampler {
    fn next_sample(
        &mut self,
        local: &mut dyn FnMut() -> VerifyResult<bool>,
    ) -> VerifyResult<bool> {
        local()
    }
}

pub struct Session {
    pub params: SamplingParams,
    pub stats: ModelCheckingStats,
    pub(crate) rng: StdRng,
    /// Nesting depth of in-flight probabilistic verifications. Run
    /// statistics and the sample source apply only at depth one.
    pub(crate) depth: usize,
    pub(crate) caches: Vec<HashMap<Vec<i64>, CacheEntry>>,
    pub(crate) source: Box<dyn SampleSource>,
}

impl Session {
    /// A session for a property with `num_caches` probabilistic operators,
    /// sampling locally.
    pub fn new(params: SamplingParams, num_caches: usize, seed: u64) -> Session {
        Session::with_source(params, num_caches, seed, Box::new(LocalSampler))
    }

    pub fn with_source(
        params: SamplingParams,
        num_caches: usize,
        seed: u64,
        source: Box<dyn SampleSource>,
    ) -> Session {
        Session {
            params,
            stats: ModelCheckingStats::default(),
            rng: StdRng::seed_from_u64(seed),
            depth: 0,
            caches: vec![HashMap::new(); num_caches],
            source,
        }
    }

    /// Drops all memoized tallies. Required between runs whenever model
    /// constants change, since cached counts are keyed by state only.
    pub fn clear_cache(&mut self) {
        for cache in &mut self.caches {
            cache.clear();
        }
    }

    pub(crate) fn cached(&self, cache_id: usize, state: &[i64]) -> CacheEntry {
        if !self.params.memoization {
            return CacheEntry::default();
        }
        // An unindexed operator (formula built outside `Property::new`) or
        // an undersized session has no slot; it samples unmemoized.
        self.caches
            .get(cache_id)
            .and_then(|cache| cache.get(state))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn store(&mut self, cache_id: usize, state: &[i64], entry: CacheEntry) {
        if !self.params.memoization {
            return;
        }
        if let Some(cache) = self.caches.get_mut(cache_id) {
            cache.insert(state.to_vec(), entry);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("params", &self.params)
            .field("depth", &self.depth)
            .field("caches", &self.caches.len())
            .finish()
    }
}
