//! Inverse normal and inverse Student's t approximations.
//!
//! These drive confidence intervals and sample-size estimates, so
//! what matters is controlled behavior at the domain boundaries:
//! out-of-domain inputs yield NaN and boundary inputs yield signed
//! infinity, never a panic or an error.

use std::f64::consts::PI;

/// Error function, Abramowitz & Stegun 7.1.26 (max error ~1.5e-7).
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Inverse error function.
///
/// Rational approximation on `|y| <= 0.7`, an asymptotic branch in
/// `sqrt(-ln((1-|y|)/2))` on the tails, then one Newton correction
/// step through [`erf`]. Returns `±inf` at `y = ±1` and NaN outside
/// `[-1, 1]`.
pub fn erfinv(y: f64) -> f64 {
    const A: [f64; 4] = [0.886226899, -1.645349621, 0.914624893, -0.140543331];
    const B: [f64; 4] = [-2.118377725, 1.442710462, -0.329097515, 0.012229801];
    const C: [f64; 4] = [-1.970840454, -1.624906493, 3.429567803, 1.641345311];
    const D: [f64; 2] = [3.543889200, 1.637067800];

    if y.is_nan() || y < -1.0 || y > 1.0 {
        return f64::NAN;
    }
    if y == 1.0 {
        return f64::INFINITY;
    }
    if y == -1.0 {
        return f64::NEG_INFINITY;
    }

    let mut x;
    if y.abs() <= 0.7 {
        let z = y * y;
        let num = ((A[3] * z + A[2]) * z + A[1]) * z + A[0];
        let den = (((B[3] * z + B[2]) * z + B[1]) * z + B[0]) * z + 1.0;
        x = y * num / den;
    } else {
        let z = (-((1.0 - y.abs()) / 2.0).ln()).sqrt();
        let num = ((C[3] * z + C[2]) * z + C[1]) * z + C[0];
        let den = (D[1] * z + D[0]) * z + 1.0;
        x = y.signum() * num / den;
    }

    // One Newton step: d/dx erf(x) = 2/sqrt(pi) * exp(-x^2).
    x -= (erf(x) - y) / (2.0 / PI.sqrt() * (-x * x).exp());
    x
}

/// Inverse of the standard normal CDF.
pub fn norminv(p: f64) -> f64 {
    std::f64::consts::SQRT_2 * erfinv(2.0 * p - 1.0)
}

/// Inverse of the Student's t CDF with `v` degrees of freedom.
///
/// Closed form for `v == 1`; otherwise a Cornish-Fisher asymptotic
/// expansion in `norminv(p)` with `1/v` terms up to fourth order.
/// `v <= 0` yields NaN; `p` at 0 or 1 yields signed infinity.
pub fn tinv(p: f64, v: u64) -> f64 {
    if v == 0 || p.is_nan() || p < 0.0 || p > 1.0 {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    if v == 1 {
        return (PI * (p - 0.5)).tan();
    }

    let x = norminv(p);
    let v = v as f64;
    let x2 = x * x;
    let g1 = (x2 + 1.0) * x / 4.0;
    let g2 = ((5.0 * x2 + 16.0) * x2 + 3.0) * x / 96.0;
    let g3 = (((3.0 * x2 + 19.0) * x2 + 17.0) * x2 - 15.0) * x / 384.0;
    let g4 = ((((79.0 * x2 + 776.0) * x2 + 1482.0) * x2 - 1920.0) * x2 - 945.0) * x / 92160.0;
    x + g1 / v + g2 / (v * v) + g3 / (v * v * v) + g4 / (v * v * v * v)
}
