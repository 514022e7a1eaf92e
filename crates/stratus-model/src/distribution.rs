//! Delay distributions attached to commands.
//!
//! Parameters are expressions evaluated in the state that schedules
//! the delay, so rates may depend on queue lengths and similar.

use crate::expr::{eval, EvalResult, Expr};
use rand::Rng;
use std::f64::consts::PI;
use std::sync::Arc;

/// A distribution parameter: either a fixed value or a state expression.
#[derive(Debug, Clone)]
pub enum Param {
    Value(f64),
    Expr(Arc<Expr>),
}

impl Param {
    pub fn value(v: f64) -> Param {
        Param::Value(v)
    }

    pub fn expr(e: Arc<Expr>) -> Param {
        Param::Expr(e)
    }

    /// Evaluate the parameter in the given state.
    pub fn eval(&self, values: &[i64]) -> EvalResult<f64> {
        match self {
            Param::Value(v) => Ok(*v),
            Param::Expr(e) => Ok(eval(e, values)? as f64),
        }
    }

    /// Fold constants out of an expression parameter.
    pub fn resolve_constants(&self, consts: &[i64]) -> EvalResult<Param> {
        match self {
            Param::Value(v) => Ok(Param::Value(*v)),
            Param::Expr(e) => Ok(Param::Expr(e.resolve_constants(consts)?)),
        }
    }
}

/// A command's firing-delay distribution.
///
/// Only the exponential is memoryless; the others carry history and
/// get their trigger times cached across simulation steps.
#[derive(Debug, Clone)]
pub enum Delay {
    /// Exponential with the given rate.
    Exponential { rate: Param },
    /// Weibull with scale eta and shape beta.
    Weibull { scale: Param, shape: Param },
    /// Lognormal: exp of a normal with the given log-space mean and stddev.
    Lognormal { scale: Param, shape: Param },
    /// Uniform on [low, high).
    Uniform { low: Param, high: Param },
}

impl Delay {
    pub fn exponential(rate: Param) -> Delay {
        Delay::Exponential { rate }
    }

    pub fn weibull(scale: Param, shape: Param) -> Delay {
        Delay::Weibull { scale, shape }
    }

    pub fn lognormal(scale: Param, shape: Param) -> Delay {
        Delay::Lognormal { scale, shape }
    }

    pub fn uniform(low: Param, high: Param) -> Delay {
        Delay::Uniform { low, high }
    }

    /// True iff sampling is independent of prior enabled time.
    pub fn is_memoryless(&self) -> bool {
        matches!(self, Delay::Exponential { .. })
    }

    /// Draw one delay in the given state.
    pub fn sample<R: Rng + ?Sized>(&self, values: &[i64], rng: &mut R) -> EvalResult<f64> {
        match self {
            Delay::Exponential { rate } => {
                let rate = rate.eval(values)?;
                let u: f64 = rng.gen();
                Ok(-(-u).ln_1p() / rate)
            }
            Delay::Weibull { scale, shape } => {
                let scale = scale.eval(values)?;
                let shape = shape.eval(values)?;
                let u: f64 = rng.gen();
                Ok(scale * (-(-u).ln_1p()).powf(1.0 / shape))
            }
            Delay::Lognormal { scale, shape } => {
                let scale = scale.eval(values)?;
                let shape = shape.eval(values)?;
                // Box-Muller
                let u1: f64 = rng.gen();
                let u2: f64 = rng.gen();
                let z = (-2.0 * (1.0 - u1).ln()).sqrt() * (2.0 * PI * u2).cos();
                Ok((scale + shape * z).exp())
            }
            Delay::Uniform { low, high } => {
                let low = low.eval(values)?;
                let high = high.eval(values)?;
                let u: f64 = rng.gen();
                Ok(low + u * (high - low))
            }
        }
    }

    /// Inverse of the mean delay in the given state, used as the
    /// per-command contribution to the model's exit-rate bound.
    pub fn rate_estimate(&self, values: &[i64]) -> EvalResult<f64> {
        match self {
            Delay::Exponential { rate } => rate.eval(values),
            Delay::Weibull { scale, shape } => {
                let scale = scale.eval(values)?;
                let shape = shape.eval(values)?;
                // mean = scale * Gamma(1 + 1/shape)
                Ok(1.0 / (scale * gamma(1.0 + 1.0 / shape)))
            }
            Delay::Lognormal { scale, shape } => {
                let scale = scale.eval(values)?;
                let shape = shape.eval(values)?;
                Ok(1.0 / (scale + shape * shape / 2.0).exp())
            }
            Delay::Uniform { low, high } => {
                let low = low.eval(values)?;
                let high = high.eval(values)?;
                Ok(2.0 / (low + high))
            }
        }
    }

    /// Resolve constant references in all parameters.
    pub fn resolve_constants(&self, consts: &[i64]) -> EvalResult<Delay> {
        Ok(match self {
            Delay::Exponential { rate } => Delay::Exponential {
                rate: rate.resolve_constants(consts)?,
            },
            Delay::Weibull { scale, shape } => Delay::Weibull {
                scale: scale.resolve_constants(consts)?,
                shape: shape.resolve_constants(consts)?,
            },
            Delay::Lognormal { scale, shape } => Delay::Lognormal {
                scale: scale.resolve_constants(consts)?,
                shape: shape.resolve_constants(consts)?,
            },
            Delay::Uniform { low, high } => Delay::Uniform {
                low: low.resolve_constants(consts)?,
                high: high.resolve_constants(consts)?,
            },
        })
    }
}

/// Lanczos approximation of the gamma function, for Weibull means.
fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        PI / ((PI * x).sin() * gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut a = COEF[0];
        let t = x + G + 0.5;
        for (i, &c) in COEF.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_memoryless_flag() {
        assert!(Delay::exponential(Param::value(2.0)).is_memoryless());
        assert!(!Delay::weibull(Param::value(1.0), Param::value(2.0)).is_memoryless());
        assert!(!Delay::uniform(Param::value(0.0), Param::value(1.0)).is_memoryless());
    }

    #[test]
    fn test_exponential_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Delay::exponential(Param::value(4.0));
        let n = 20_000;
        let mean: f64 = (0..n)
            .map(|_| d.sample(&[], &mut rng).unwrap())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 0.25).abs() < 0.01, "mean {}", mean);
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let d = Delay::uniform(Param::value(1.0), Param::value(3.0));
        for _ in 0..1000 {
            let s = d.sample(&[], &mut rng).unwrap();
            assert!((1.0..3.0).contains(&s));
        }
    }

    #[test]
    fn test_gamma_known_values() {
        assert!((gamma(1.0) - 1.0).abs() < 1e-9);
        assert!((gamma(5.0) - 24.0).abs() < 1e-6);
        assert!((gamma(0.5) - PI.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_state_dependent_rate() {
        let mut rng = StdRng::seed_from_u64(3);
        // rate = v0, so mean delay = 1/v0
        let d = Delay::exponential(Param::expr(Expr::var(0)));
        let n = 20_000;
        let mean: f64 = (0..n)
            .map(|_| d.sample(&[8], &mut rng).unwrap())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 0.125).abs() < 0.01, "mean {}", mean);
    }
}
