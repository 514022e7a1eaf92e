//! Single sampling plans for binomial acceptance tests.

use crate::special::norminv;
use thiserror::Error;

/// Invalid sampling-plan parameters.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("probabilities must satisfy 0 < p1 < p0 < 1, got p0={p0}, p1={p1}")]
    InvalidProbabilities { p0: f64, p1: f64 },

    #[error("error bounds must lie in (0, 1), got alpha={alpha}, beta={beta}")]
    InvalidErrorBounds { alpha: f64, beta: f64 },

    #[error("no feasible plan below n = {limit}")]
    NoFeasiblePlan { limit: u64 },
}

/// A fixed-size acceptance sampling plan `(n, c)`: draw `n` Bernoulli
/// trials and accept iff more than `c` successes are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleSamplingPlan {
    /// Number of trials.
    pub n: u64,
    /// Acceptance cutoff, `c < n`.
    pub c: u64,
}

/// Search cap: plans beyond this size indicate vanishing indifference
/// regions the exact search cannot serve in reasonable time.
const MAX_PLAN_SIZE: u64 = 1 << 26;

impl SingleSamplingPlan {
    /// Compute the minimal plan distinguishing success probability
    /// `p0` from `p1 < p0` such that
    /// `P(reject | p = p0) <= alpha` and `P(accept | p = p1) <= beta`.
    pub fn create(p0: f64, p1: f64, alpha: f64, beta: f64) -> Result<Self, PlanError> {
        if !(0.0..=1.0).contains(&p1) || !(0.0..=1.0).contains(&p0) || p1 >= p0 {
            return Err(PlanError::InvalidProbabilities { p0, p1 });
        }
        if !(alpha > 0.0 && alpha < 1.0 && beta > 0.0 && beta < 1.0) {
            return Err(PlanError::InvalidErrorBounds { alpha, beta });
        }

        // Exponential search for a feasible n, then binary search for
        // the minimal one. Feasibility is monotone in n.
        let mut hi = 1u64;
        loop {
            if feasible_cutoff(hi, p0, p1, alpha, beta).is_some() {
                break;
            }
            hi *= 2;
            if hi > MAX_PLAN_SIZE {
                return Err(PlanError::NoFeasiblePlan { limit: MAX_PLAN_SIZE });
            }
        }
        let mut lo = hi / 2 + 1;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if feasible_cutoff(mid, p0, p1, alpha, beta).is_some() {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let c = feasible_cutoff(hi, p0, p1, alpha, beta)
            .ok_or(PlanError::NoFeasiblePlan { limit: MAX_PLAN_SIZE })?;
        Ok(SingleSamplingPlan { n: hi, c })
    }

    /// Normal-approximation estimate of the plan size, for effort
    /// estimation where the exact combinatorial search would be
    /// wasteful.
    pub fn approx_size(p0: f64, p1: f64, alpha: f64, beta: f64) -> f64 {
        let za = norminv(1.0 - alpha);
        let zb = norminv(1.0 - beta);
        let num = za * (p0 * (1.0 - p0)).sqrt() + zb * (p1 * (1.0 - p1)).sqrt();
        let den = p0 - p1;
        let n = (num / den) * (num / den);
        n.max(1.0)
    }
}

/// For a fixed `n`, the smallest cutoff `c` meeting the consumer risk
/// (`P(accept | p1) <= beta`), if it also meets the producer risk
/// (`P(reject | p0) <= alpha`) and leaves room for acceptance.
fn feasible_cutoff(n: u64, p0: f64, p1: f64, alpha: f64, beta: f64) -> Option<u64> {
    // smallest c with BinCdf(c; n, p1) >= 1 - beta
    let c = smallest_cutoff(n, p1, 1.0 - beta)?;
    if c >= n {
        return None;
    }
    if binomial_cdf(c, n, p0) <= alpha {
        Some(c)
    } else {
        None
    }
}

/// Smallest `c` with `BinCdf(c; n, p) >= target`, walking the pmf in
/// log space for stability.
fn smallest_cutoff(n: u64, p: f64, target: f64) -> Option<u64> {
    if p <= 0.0 {
        // All mass at zero successes.
        return Some(0);
    }
    if p >= 1.0 {
        return Some(n);
    }
    let ln_p = p.ln();
    let ln_q = (1.0 - p).ln();
    let mut ln_pmf = n as f64 * ln_q;
    let mut cdf = ln_pmf.exp();
    let mut k = 0u64;
    while cdf < target && k < n {
        ln_pmf += ((n - k) as f64).ln() - ((k + 1) as f64).ln() + ln_p - ln_q;
        cdf += ln_pmf.exp();
        k += 1;
    }
    if cdf >= target {
        Some(k)
    } else {
        // Rounding left a sliver below target: the full CDF is 1.
        Some(n)
    }
}

/// `P(X <= c)` for `X ~ Binomial(n, p)`.
fn binomial_cdf(c: u64, n: u64, p: f64) -> f64 {
    if p <= 0.0 {
        return 1.0;
    }
    if p >= 1.0 {
        return if c >= n { 1.0 } else { 0.0 };
    }
    let ln_p = p.ln();
    let ln_q = (1.0 - p).ln();
    let mut ln_pmf = n as f64 * ln_q;
    let mut cdf = ln_pmf.exp();
    for k in 0..c.min(n) {
        ln_pmf += ((n - k) as f64).ln() - ((k + 1) as f64).ln() + ln_p - ln_q;
        cdf += ln_pmf.exp();
    }
    cdf.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_binomial_cdf_small_cases() {
        // Binomial(2, 0.5): P(X <= 0) = 0.25, P(X <= 1) = 0.75
        assert!((binomial_cdf(0, 2, 0.5) - 0.25).abs() < 1e-12);
        assert!((binomial_cdf(1, 2, 0.5) - 0.75).abs() < 1e-12);
        assert!((binomial_cdf(2, 2, 0.5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_plan_risks_are_met() {
        let plan = SingleSamplingPlan::create(0.55, 0.45, 0.05, 0.05).unwrap();
        assert!(plan.c < plan.n);
        assert!(binomial_cdf(plan.c, plan.n, 0.55) <= 0.05);
        assert!(1.0 - binomial_cdf(plan.c, plan.n, 0.45) <= 0.05);
        // Minimality: one fewer trial must be infeasible.
        assert!(feasible_cutoff(plan.n - 1, 0.55, 0.45, 0.05, 0.05).is_none());
    }

    #[test]
    fn test_wider_gap_shrinks_plan() {
        let narrow = SingleSamplingPlan::create(0.52, 0.48, 0.05, 0.05).unwrap();
        let medium = SingleSamplingPlan::create(0.55, 0.45, 0.05, 0.05).unwrap();
        let wide = SingleSamplingPlan::create(0.65, 0.35, 0.05, 0.05).unwrap();
        assert!(narrow.n > medium.n && medium.n > wide.n);
        assert!(narrow.c > medium.c && medium.c > wide.c);
    }

    #[test]
    fn test_extreme_probabilities() {
        // p1 = 0: a single success decides; a tiny plan must exist.
        let plan = SingleSamplingPlan::create(0.9, 0.0, 0.01, 0.01).unwrap();
        assert_eq!(plan.c, 0);
        assert!(plan.n >= 1);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SingleSamplingPlan::create(0.4, 0.6, 0.05, 0.05).is_err());
        assert!(SingleSamplingPlan::create(0.6, 0.4, 0.0, 0.05).is_err());
        assert!(SingleSamplingPlan::create(0.6, 0.4, 0.05, 1.0).is_err());
    }

    #[test]
    fn test_approx_size_tracks_exact() {
        let plan = SingleSamplingPlan::create(0.55, 0.45, 0.05, 0.05).unwrap();
        let approx = SingleSamplingPlan::approx_size(0.55, 0.45, 0.05, 0.05);
        let ratio = approx / plan.n as f64;
        assert!((0.5..2.0).contains(&ratio), "approx {} exact {}", approx, plan.n);
    }

    proptest! {
        #[test]
        fn prop_plan_is_well_formed(
            gap in 0.05f64..0.4,
            center in 0.3f64..0.7,
            alpha in 0.01f64..0.2,
            beta in 0.01f64..0.2,
        ) {
            let p0 = (center + gap / 2.0).min(0.99);
            let p1 = (center - gap / 2.0).max(0.01);
            let plan = SingleSamplingPlan::create(p0, p1, alpha, beta).unwrap();
            prop_assert!(plan.c < plan.n);
            prop_assert!(binomial_cdf(plan.c, plan.n, p0) <= alpha + 1e-9);
            prop_assert!(1.0 - binomial_cdf(plan.c, plan.n, p1) <= beta + 1e-9);
        }
    }
}
