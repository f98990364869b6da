//! Running sample statistics.

use norta_core::Real;

/// Mergeable running mean and variance.
///
/// Samples are folded in with Welford's update; two accumulators over
/// disjoint samples combine exactly with Chan's pairwise formula, which is
/// how per-chunk Monte Carlo results are reduced.  The result of a merge
/// depends on the merge order only through rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Statistics {
    count: usize,
    mean: Real,
    /// Sum of squared deviations from `mean`.
    m2: Real,
}

impl Statistics {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn add(&mut self, x: Real) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as Real;
        self.m2 += delta * (x - self.mean);
    }

    /// Fold the samples of `other` into `self`.
    pub fn merge(&mut self, other: &Statistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let (na, nb) = (self.count as Real, other.count as Real);
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
    }

    /// Number of samples.
    pub fn samples(&self) -> usize {
        self.count
    }

    /// Sample mean, `None` when empty.
    pub fn mean(&self) -> Option<Real> {
        (self.count > 0).then_some(self.mean)
    }

    /// Unbiased sample variance, `None` below 2 samples.
    pub fn variance(&self) -> Option<Real> {
        (self.count > 1).then(|| self.m2.max(0.0) / (self.count - 1) as Real)
    }

    /// Standard error of the mean, `s / √n`.
    pub fn error_estimate(&self) -> Option<Real> {
        self.variance().map(|v| (v / self.count as Real).sqrt())
    }
}
