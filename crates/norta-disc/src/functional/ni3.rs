use super::{check_rho, par_map_indexed, CorrelationFunctional, Evaluation, Strategy};
use crate::grid::BreakpointGrid;
use crate::options::CalibrationOptions;
use norta_core::{Real, Result, Size};
use norta_math::random_numbers::{stream_seed, BivariateNormalRng};
use norta_math::Statistics;
use std::sync::Arc;

/// Samples drawn by one rayon task; each chunk owns its own generator.
pub const SAMPLE_CHUNK: usize = 4096;

/// Default ρ offset of the common-random-numbers gradient estimate.
pub const DEFAULT_GRADIENT_STEP: Real = 0.05;

/// Tuning of the [`Ni3`] Monte Carlo estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ni3Settings {
    /// Samples per batch.
    pub sample_size: Size,
    /// Base seed; batch `k`, chunk `c` draws from
    /// `stream_seed(stream_seed(seed, k), c)`.
    pub seed: u64,
    /// ρ offset of the forward-difference gradient.
    pub gradient_step: Real,
}

impl Default for Ni3Settings {
    fn default() -> Self {
        Self::from(&CalibrationOptions::default())
    }
}

impl From<&CalibrationOptions> for Ni3Settings {
    fn from(options: &CalibrationOptions) -> Self {
        Self {
            sample_size: options.monte_carlo_sample_size,
            seed: options.seed,
            gradient_step: DEFAULT_GRADIENT_STEP,
        }
    }
}

/// Running summary of the Monte Carlo batches drawn so far.
#[derive(Debug, Clone, Default)]
pub struct RunningEstimator {
    samples: usize,
    functional: Statistics,
    gradient: Statistics,
    batch_variance: Statistics,
}

impl RunningEstimator {
    /// Create an empty estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch: its functional estimate, the variance of that
    /// estimate, its gradient estimate and the number of samples used.
    pub fn record(&mut self, value: Real, variance: Real, gradient: Real, samples: usize) {
        self.samples += samples;
        self.functional.add(value);
        self.gradient.add(gradient);
        self.batch_variance.add(variance);
    }

    /// Number of batches recorded.
    pub fn batches(&self) -> usize {
        self.functional.samples()
    }

    /// Total number of samples drawn.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Mean of the batch functional estimates.
    pub fn functional_mean(&self) -> Option<Real> {
        self.functional.mean()
    }

    /// Mean of the batch gradient estimates.
    pub fn gradient_mean(&self) -> Option<Real> {
        self.gradient.mean()
    }

    /// Mean of the per-batch estimator variances.
    pub fn mean_batch_variance(&self) -> Option<Real> {
        self.batch_variance.mean()
    }

    /// Forget all recorded batches.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Monte Carlo estimate of `g(ρ)` through the NORTA transform.
///
/// Each call draws a fresh batch of standard normal pairs at ρ, maps them to
/// support indices through the breakpoint grid and averages `w1 · w2`.  The
/// same normals, recorrelated at `ρ ± gradient_step`, give a
/// common-random-numbers difference quotient for `dg/dρ`.  Batches are split
/// into [`SAMPLE_CHUNK`]-sized chunks with their own seed streams and merged
/// in chunk order, so results for a fixed seed do not depend on the number
/// of threads.
#[derive(Debug, Clone)]
pub struct Ni3 {
    grid: Arc<BreakpointGrid>,
    settings: Ni3Settings,
    batch: u64,
    estimator: RunningEstimator,
}

impl Ni3 {
    /// Create the strategy over `grid`.
    pub fn new(grid: Arc<BreakpointGrid>, settings: Ni3Settings) -> Self {
        Self {
            grid,
            settings,
            batch: 0,
            estimator: RunningEstimator::new(),
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &Ni3Settings {
        &self.settings
    }

    /// Running summary of the batches drawn so far.
    pub fn estimator(&self) -> &RunningEstimator {
        &self.estimator
    }

    /// Forget the running summary.  The batch counter keeps advancing so
    /// later batches still draw fresh numbers.
    pub fn reset_estimator(&mut self) {
        self.estimator.reset();
    }

    fn sample_chunk(
        &self,
        seed: u64,
        len: usize,
        rho: Real,
        shifted: Real,
    ) -> (Statistics, Statistics) {
        let grid = &*self.grid;
        let (w1, w2) = (grid.row_scores(), grid.col_scores());
        let complement = ((1.0 - rho) * (1.0 + rho)).max(0.0).sqrt();
        let shifted_complement = ((1.0 - shifted) * (1.0 + shifted)).max(0.0).sqrt();
        let step = shifted - rho;

        let mut rng = BivariateNormalRng::new(seed, rho);
        let mut products = Statistics::new();
        let mut slopes = Statistics::new();
        for _ in 0..len {
            let (z1, w) = rng.next_independent();
            let x1 = w1[grid.row_of(z1)];
            let here = x1 * w2[grid.col_of(rho * z1 + complement * w)];
            let there = x1 * w2[grid.col_of(shifted * z1 + shifted_complement * w)];
            products.add(here);
            slopes.add((there - here) / step);
        }
        (products, slopes)
    }
}

impl CorrelationFunctional for Ni3 {
    fn strategy(&self) -> Strategy {
        Strategy::Ni3
    }

    fn grid(&self) -> &BreakpointGrid {
        &self.grid
    }

    fn evaluate(&mut self, rho: Real) -> Result<Evaluation> {
        check_rho(rho)?;
        norta_core::ensure!(
            self.settings.sample_size >= 2,
            "Monte Carlo batches need at least 2 samples, got {}",
            self.settings.sample_size
        );
        let n = self.settings.sample_size;
        let h = self.settings.gradient_step;
        let shifted = if rho + h <= 1.0 { rho + h } else { rho - h };
        let batch_seed = stream_seed(self.settings.seed, self.batch);
        self.batch += 1;

        let chunks = n.div_ceil(SAMPLE_CHUNK);
        let this = &*self;
        let partials = par_map_indexed(chunks, n, |c| {
            let len = SAMPLE_CHUNK.min(n - c * SAMPLE_CHUNK);
            this.sample_chunk(stream_seed(batch_seed, c as u64), len, rho, shifted)
        });

        let mut products = Statistics::new();
        let mut slopes = Statistics::new();
        for (p, s) in &partials {
            products.merge(p);
            slopes.merge(s);
        }
        let value = products.mean().unwrap_or(0.0);
        let error = products.error_estimate().unwrap_or(0.0);
        let gradient = slopes.mean().unwrap_or(0.0);
        self.estimator.record(value, error * error, gradient, n);

        Ok(Evaluation {
            rho,
            value,
            error,
            gradient: Some(gradient),
            cost: n,
        })
    }
}
