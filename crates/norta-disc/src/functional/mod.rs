//! The correlation functional `g(ρ) = E[w1(X1) w2(X2)]` under a normal
//! copula with correlation ρ.
//!
//! Four interchangeable strategies implement [`CorrelationFunctional`]:
//!
//! * [`Ni1`]: brute force, four `Φ₂` corners per cell, stateless.
//! * [`Ni2a`]: summation by parts, each corner evaluated once per ρ, row
//!   sums cached for the current ρ.
//! * [`Ni2b`]: [`Ni2a`] plus a cross-iteration corner cache corrected with
//!   the closed-form derivative `∂Φ₂/∂ρ = φ₂` for small steps in ρ.
//! * [`Ni3`]: Monte Carlo estimate through the NORTA transform.
//!
//! Each strategy owns its own cache; the shared [`BreakpointGrid`] is
//! immutable and passed around behind an `Arc`.

mod ni1;
mod ni2a;
mod ni2b;
mod ni3;

pub use ni1::Ni1;
pub use ni2a::Ni2a;
pub use ni2b::{Ni2b, Ni2bSettings};
pub use ni3::{Ni3, Ni3Settings, RunningEstimator};

use crate::grid::BreakpointGrid;
use crate::options::CalibrationOptions;
use norta_core::{Real, Result};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Work sizes (cells or corners) from which evaluation fans out over rayon.
pub const PARALLEL_CELL_THRESHOLD: usize = 4096;

/// Strategy used to evaluate the correlation functional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Strategy {
    /// Brute-force exact cell sum.
    Ni1,
    /// Exact corner sum with per-ρ row cache.
    Ni2a,
    /// Exact corner sum with derivative-corrected cross-iteration cache.
    Ni2b,
    /// Monte Carlo with stochastic approximation.
    Ni3,
    /// Pick by grid size.
    #[default]
    Auto,
}

impl Strategy {
    /// Whether the strategy evaluates `g` deterministically.
    pub fn is_exact(self) -> bool {
        !matches!(self, Strategy::Ni3)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Ni1 => "NI1",
            Strategy::Ni2a => "NI2a",
            Strategy::Ni2b => "NI2b",
            Strategy::Ni3 => "NI3",
            Strategy::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// One evaluation of the functional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Trial correlation.
    pub rho: Real,
    /// `g(ρ)`, exact or estimated.
    pub value: Real,
    /// Error estimate of `value`: 0 for exact strategies, accumulated
    /// correction drift for [`Ni2b`], standard error for [`Ni3`].
    pub error: Real,
    /// Estimate of `dg/dρ` when the strategy produces one.
    pub gradient: Option<Real>,
    /// Work done: `Φ₂` evaluations, or Monte Carlo samples for [`Ni3`].
    pub cost: usize,
}

impl Evaluation {
    pub(crate) fn exact(rho: Real, value: Real, cost: usize) -> Self {
        Self {
            rho,
            value,
            error: 0.0,
            gradient: None,
            cost,
        }
    }
}

/// A non-fatal precision problem detected during a calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrecisionWarning {
    /// The [`Ni2b`] correction drift exceeded its bound before the scheduled
    /// full recomputation; the cache was rebuilt at `rho`.
    CorrectionDrift {
        /// Trial correlation at which the drift was detected.
        rho: Real,
        /// Accumulated drift, in correlation units.
        drift: Real,
        /// Configured bound, in correlation units.
        bound: Real,
    },
    /// The Monte Carlo standard error of ρ exceeds the configured threshold.
    StandardError {
        /// Estimated standard error of the calibrated ρ.
        std_error: Real,
        /// Configured threshold.
        bound: Real,
    },
}

impl fmt::Display for PrecisionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecisionWarning::CorrectionDrift { rho, drift, bound } => write!(
                f,
                "correction drift {drift:e} exceeded bound {bound:e} at rho = {rho}; cache rebuilt"
            ),
            PrecisionWarning::StandardError { std_error, bound } => write!(
                f,
                "standard error of rho {std_error:e} exceeds threshold {bound:e}"
            ),
        }
    }
}

/// Capability shared by all strategies: evaluate `g(ρ)` with an error
/// estimate.
pub trait CorrelationFunctional: Send {
    /// Which strategy this is.
    fn strategy(&self) -> Strategy;

    /// The grid the functional is evaluated over.
    fn grid(&self) -> &BreakpointGrid;

    /// Evaluate `g(ρ)`.
    ///
    /// # Errors
    /// [`norta_core::Error::InvalidArgument`] when `ρ` is not in `[-1, 1]`.
    fn evaluate(&mut self, rho: Real) -> Result<Evaluation>;

    /// Take the precision warnings raised since the last call.
    fn take_warnings(&mut self) -> Vec<PrecisionWarning> {
        Vec::new()
    }
}

/// Build the functional for a concrete strategy.  `Auto` is resolved from
/// the grid size and `options` first.
pub fn build(
    strategy: Strategy,
    grid: Arc<BreakpointGrid>,
    options: &CalibrationOptions,
) -> Box<dyn CorrelationFunctional> {
    match resolve(strategy, &grid, options) {
        Strategy::Ni1 => Box::new(Ni1::new(grid)),
        Strategy::Ni2a => Box::new(Ni2a::new(grid)),
        Strategy::Ni2b => Box::new(Ni2b::new(grid, Ni2bSettings::from(options))),
        Strategy::Ni3 => Box::new(Ni3::new(grid, Ni3Settings::from(options))),
        Strategy::Auto => unreachable!("resolve returns a concrete strategy"),
    }
}

/// Resolve `Auto` to a concrete strategy.
///
/// NI1 for grids up to `ni1_cell_limit` cells, NI2a up to
/// `exact_cell_limit`, NI3 beyond.
pub fn resolve(strategy: Strategy, grid: &BreakpointGrid, options: &CalibrationOptions) -> Strategy {
    match strategy {
        Strategy::Auto => {
            let cells = grid.cells();
            if cells <= options.ni1_cell_limit {
                Strategy::Ni1
            } else if cells <= options.exact_cell_limit {
                Strategy::Ni2a
            } else {
                Strategy::Ni3
            }
        }
        concrete => concrete,
    }
}

pub(crate) fn check_rho(rho: Real) -> Result<()> {
    if rho.is_finite() && (-1.0..=1.0).contains(&rho) {
        Ok(())
    } else {
        Err(norta_core::Error::InvalidArgument(format!(
            "trial correlation must lie in [-1, 1], got {rho}"
        )))
    }
}

/// Evaluate `f(k)` for `k in 0..count`, in parallel when `work` reaches
/// [`PARALLEL_CELL_THRESHOLD`].
///
/// Results are collected in index order so the caller's reduction is
/// independent of the thread count.
pub(crate) fn par_map_indexed<T, F>(count: usize, work: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if work >= PARALLEL_CELL_THRESHOLD {
        (0..count).into_par_iter().map(f).collect()
    } else {
        (0..count).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marginal::{CorrelationKind, MarginalTable};

    fn grid(n: usize) -> Arc<BreakpointGrid> {
        let support: Vec<Real> = (0..n).map(|i| i as Real).collect();
        let mass = vec![1.0 / n as Real; n];
        let m = MarginalTable::new(support, mass).unwrap();
        Arc::new(BreakpointGrid::new(&m, &m, CorrelationKind::Rank))
    }

    #[test]
    fn auto_resolution_by_size() {
        let options = CalibrationOptions::default()
            .with_ni1_cell_limit(100)
            .with_exact_cell_limit(2_500);
        assert_eq!(resolve(Strategy::Auto, &grid(10), &options), Strategy::Ni1);
        assert_eq!(resolve(Strategy::Auto, &grid(20), &options), Strategy::Ni2a);
        assert_eq!(resolve(Strategy::Auto, &grid(60), &options), Strategy::Ni3);
        assert_eq!(resolve(Strategy::Ni2b, &grid(60), &options), Strategy::Ni2b);
    }

    #[test]
    fn build_returns_requested_strategy() {
        let options = CalibrationOptions::default();
        for s in [Strategy::Ni1, Strategy::Ni2a, Strategy::Ni2b, Strategy::Ni3] {
            assert_eq!(build(s, grid(5), &options).strategy(), s);
        }
    }

    #[test]
    fn build_resolves_auto_at_every_size() {
        let options = CalibrationOptions::default()
            .with_ni1_cell_limit(100)
            .with_exact_cell_limit(2_500);
        for (n, expected) in [(10, Strategy::Ni1), (20, Strategy::Ni2a), (60, Strategy::Ni3)] {
            assert_eq!(build(Strategy::Auto, grid(n), &options).strategy(), expected);
        }
    }

    #[test]
    fn strategy_display() {
        assert_eq!(Strategy::Ni2a.to_string(), "NI2a");
        assert_eq!(Strategy::Auto.to_string(), "auto");
        assert!(!Strategy::Ni3.is_exact());
    }

    #[test]
    fn rejects_out_of_range_rho() {
        let options = CalibrationOptions::default();
        for s in [Strategy::Ni1, Strategy::Ni2a, Strategy::Ni2b, Strategy::Ni3] {
            let mut f = build(s, grid(4), &options);
            assert!(f.evaluate(1.5).is_err());
            assert!(f.evaluate(f64::NAN).is_err());
        }
    }
}
