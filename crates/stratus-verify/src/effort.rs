//! A-priori verification effort estimation.
//!
//! Effort is measured in expected simulated state transitions. It drives one
//! decision the verifier has to make before drawing a single sample: how much
//! of the error budget a probabilistic operator with nested probabilistic
//! operators should delegate to them. A larger nested error makes each
//! trajectory cheaper but widens the gap the outer test must resolve, so the
//! optimum is found numerically.

use stratus_stats::SingleSamplingPlan;

use crate::formula::{PathFormula, StateFormula};
use crate::session::Algorithm;

const INVPHI: f64 = 0.618_033_988_749_895;

/// Relative width at which the golden-section search stops.
const SEARCH_TOLERANCE: f64 = 1e-3;

/// Acceptance and rejection probabilities adjusted for nested sampling
/// error: a nested verification that itself errs with probability `nested`
/// dilutes the observable success probability on both sides.
pub(crate) fn error_bounds(threshold: f64, delta: f64, nested: f64) -> (f64, f64) {
    let p0 = ((threshold + delta) * (1.0 - nested)).min(1.0);
    let p1 = (1.0 - (1.0 - (threshold - delta)) * (1.0 - nested)).max(0.0);
    (p0, p1)
}

/// Expected number of samples an acceptance-sampling test needs to separate
/// `p0` from `p1` with error bounds `alpha` and `beta`.
fn test_size(algorithm: Algorithm, p0: f64, p1: f64, alpha: f64, beta: f64) -> f64 {
    match algorithm {
        Algorithm::Fixed | Algorithm::Estimate | Algorithm::Ssp => {
            SingleSamplingPlan::approx_size(p0, p1, alpha, beta)
        }
        Algorithm::Sprt => {
            // Wald's expected sample size under p0. The accumulated log
            // likelihood ratio drifts by d per sample and terminates at
            // log B with probability 1 - alpha, at log A with probability
            // alpha.
            let log_a = -alpha.ln() + if p1 > 0.0 { (1.0 - beta).ln() } else { 0.0 };
            let log_b = beta.ln() - if p0 < 1.0 { (1.0 - alpha).ln() } else { 0.0 };
            let drift = p0 * (p1 / p0).ln() + (1.0 - p0) * ((1.0 - p1) / (1.0 - p0)).ln();
            if !drift.is_finite() || drift == 0.0 {
                return 1.0;
            }
            ((alpha * log_a + (1.0 - alpha) * log_b) / drift).abs()
        }
    }
}

/// Minimizes `f` over `[a, b]` by golden-section search, returning the
/// midpoint of the final bracket.
fn golden_section_min(mut a: f64, mut b: f64, f: impl Fn(f64) -> f64) -> f64 {
    let width = b - a;
    let mut c = b - INVPHI * (b - a);
    let mut d = a + INVPHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    while b - a > SEARCH_TOLERANCE * width {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INVPHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INVPHI * (b - a);
            fd = f(d);
        }
    }
    0.5 * (a + b)
}

/// The error probability to delegate to nested probabilistic operators of
/// `path`, chosen to minimize the total effort of a test around `threshold`.
/// Zero when the path formula has no nested probabilistic operators.
///
/// Sampling workers call this with the same parameters as the verifier so
/// both sides agree on the nested error bounds.
pub fn optimal_nested_error(
    path: &PathFormula,
    threshold: f64,
    exit_rate: f64,
    delta: f64,
    alpha: f64,
    beta: f64,
    algorithm: Algorithm,
) -> f64 {
    if !path.has_probabilistic() {
        return 0.0;
    }
    // Beyond 2*delta/(1 + 2*delta) the diluted bounds collapse onto each
    // other and no test can separate them.
    let upper = 2.0 * delta / (1.0 + 2.0 * delta);
    golden_section_min(0.0, upper, |x| {
        let (p0, p1) = error_bounds(threshold, delta, x);
        test_size(algorithm, p0, p1, alpha, beta)
            * path.effort(exit_rate, delta, x, x, algorithm)
    })
}

impl StateFormula {
    /// Expected number of simulated transitions to verify this formula in
    /// one state with error bounds `alpha` and `beta`.
    pub fn effort(
        &self,
        exit_rate: f64,
        delta: f64,
        alpha: f64,
        beta: f64,
        algorithm: Algorithm,
    ) -> f64 {
        match self {
            StateFormula::Conjunction(children) | StateFormula::Disjunction(children) => children
                .iter()
                .map(|c| c.effort(exit_rate, delta, alpha, beta, algorithm))
                .sum(),
            StateFormula::Negation(operand) => {
                operand.effort(exit_rate, delta, beta, alpha, algorithm)
            }
            StateFormula::Implication(antecedent, consequent) => {
                antecedent.effort(exit_rate, delta, beta, alpha, algorithm)
                    + consequent.effort(exit_rate, delta, alpha, beta, algorithm)
            }
            StateFormula::Comparison { .. } => 1.0,
            StateFormula::Probabilistic {
                threshold, path, ..
            } => {
                let nested = optimal_nested_error(
                    path, *threshold, exit_rate, delta, alpha, beta, algorithm,
                );
                let (p0, p1) = error_bounds(*threshold, delta, nested);
                test_size(algorithm, p0, p1, alpha, beta)
                    * path.effort(exit_rate, delta, nested, nested, algorithm)
            }
        }
    }
}

impl PathFormula {
    /// Expected transitions per sampled trajectory: the exit-rate bound
    /// caps how many transitions fit in the time window, each checking the
    /// precondition, and those past `min_time` also the postcondition.
    pub fn effort(
        &self,
        exit_rate: f64,
        delta: f64,
        alpha: f64,
        beta: f64,
        algorithm: Algorithm,
    ) -> f64 {
        let PathFormula::Until {
            pre,
            post,
            min_time,
            max_time,
        } = self;
        exit_rate
            * (max_time * pre.effort(exit_rate, delta, beta, alpha, algorithm)
                + (max_time - min_time) * post.effort(exit_rate, delta, alpha, beta, algorithm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::CmpOp;
    use proptest::prelude::*;
    use std::cell::Cell;
    use stratus_model::Expr;

    fn atom() -> StateFormula {
        StateFormula::comparison(CmpOp::Gt, Expr::var(0), Expr::int(0))
    }

    #[test]
    fn test_comparison_effort_is_one() {
        assert_eq!(atom().effort(4.0, 0.01, 0.01, 0.01, Algorithm::Ssp), 1.0);
    }

    #[test]
    fn test_conjunction_sums_children() {
        let conj = StateFormula::Conjunction(vec![atom(), atom(), atom()]);
        assert_eq!(conj.effort(4.0, 0.01, 0.01, 0.01, Algorithm::Ssp), 3.0);
    }

    #[test]
    fn test_until_effort_scales_with_exit_rate_and_window() {
        let path = PathFormula::until(atom(), atom(), 2.0, 10.0);
        let effort = path.effort(5.0, 0.01, 0.01, 0.01, Algorithm::Ssp);
        // 5 * (10 * 1 + 8 * 1)
        assert!((effort - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_probabilistic_matches_plan_size() {
        let f = StateFormula::probabilistic(0.5, false, PathFormula::eventually(atom(), 0.0, 1.0));
        let effort = f.effort(4.0, 0.05, 0.01, 0.01, Algorithm::Ssp);
        // One trajectory costs q * (max * pre + (max - min) * post) = 8 steps.
        let expected = SingleSamplingPlan::approx_size(0.55, 0.45, 0.01, 0.01) * 8.0;
        assert!((effort - expected).abs() < 1e-6, "effort = {effort}");
    }

    #[test]
    fn test_nested_error_inside_search_interval() {
        let inner = StateFormula::probabilistic(0.5, false, PathFormula::eventually(atom(), 0.0, 1.0));
        let path = PathFormula::eventually(inner, 0.0, 1.0);
        let delta = 0.05;
        let x = optimal_nested_error(&path, 0.5, 4.0, delta, 0.01, 0.01, Algorithm::Ssp);
        assert!(x > 0.0);
        assert!(x < 2.0 * delta / (1.0 + 2.0 * delta));
    }

    #[test]
    fn test_nested_error_zero_without_nesting() {
        let path = PathFormula::eventually(atom(), 0.0, 1.0);
        let x = optimal_nested_error(&path, 0.5, 4.0, 0.01, 0.01, 0.01, Algorithm::Ssp);
        assert_eq!(x, 0.0);
    }

    #[test]
    fn test_golden_section_converges_quickly() {
        let calls = Cell::new(0u32);
        let x = golden_section_min(0.0, 1.0, |x| {
            calls.set(calls.get() + 1);
            (x - 0.3).powi(2)
        });
        assert!((x - 0.3).abs() < 1e-3);
        // Each iteration after the first two evaluates once; relative width
        // 1e-3 needs about 15 iterations.
        assert!(calls.get() <= 30, "{} evaluations", calls.get());
    }

    #[test]
    fn test_sprt_size_finite_and_positive() {
        let n = test_size(Algorithm::Sprt, 0.55, 0.45, 0.01, 0.01);
        assert!(n.is_finite());
        assert!(n > 1.0);
    }

    proptest! {
        // Interior points of the search interval must leave a positive gap
        // between the error bounds, or plan construction inside the search
        // would fail.
        #[test]
        fn prop_error_bounds_stay_separated(
            threshold in 0.05f64..0.95,
            delta in 0.001f64..0.04,
            frac in 0.0f64..0.9,
        ) {
            let nested = frac * 2.0 * delta / (1.0 + 2.0 * delta);
            let (p0, p1) = error_bounds(threshold, delta, nested);
            prop_assert!(p0 > p1);
            prop_assert!((0.0..=1.0).contains(&p0));
            prop_assert!((0.0..=1.0).contains(&p1));
        }
    }
}
