//! Running observation accumulator (Welford's method).

use std::fmt;

/// Running mean, min, max, and standard deviation over a stream of
/// observations, without storing them.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation.
    pub fn add_observation(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Unbiased sample variance.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.4} stddev {:.4} min {:.4} max {:.4} (n={})",
            self.mean(),
            self.stddev(),
            self.min(),
            self.max(),
            self.count
        )
    }
}
