//! The calibration façade.
//!
//! [`NortaInitDisc`] owns the breakpoint grid of one marginal pair and runs
//! the root search for any number of target correlations over it;
//! [`compute_rho`] is the one-shot form.

use crate::functional::{
    build, resolve, CorrelationFunctional, Ni2a, Ni3, Ni3Settings, PrecisionWarning, Strategy,
};
use crate::grid::BreakpointGrid;
use crate::marginal::{CorrelationKind, MarginalTable};
use crate::options::CalibrationOptions;
use crate::solver::{self, Solution};
use log::{info, warn};
use norta_core::{Real, Result};
use std::sync::Arc;

/// Result of a calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Correlation of the underlying bivariate normal.
    pub rho: Real,
    /// Root-finder iterations (Brent steps or Monte Carlo batches).
    pub iterations: usize,
    /// Achieved residual in correlation units.
    pub residual: Real,
    /// Strategy actually used (`Auto` resolved).
    pub strategy: Strategy,
    /// Functional evaluations performed.
    pub evaluations: usize,
    /// Summed evaluation cost (`Φ₂` calls or Monte Carlo samples).
    pub cost: usize,
    /// Standard error of `rho`, for Monte Carlo calibrations.
    pub std_error: Option<Real>,
    /// Non-fatal precision problems met on the way.
    pub warnings: Vec<PrecisionWarning>,
}

impl Calibration {
    fn from_solution(strategy: Strategy, solution: Solution) -> Self {
        Self {
            rho: solution.rho,
            iterations: solution.iterations,
            residual: solution.residual,
            strategy,
            evaluations: solution.evaluations,
            cost: solution.cost,
            std_error: solution.std_error,
            warnings: solution.warnings,
        }
    }
}

/// NORTA initialisation for a pair of discrete marginals.
///
/// Finds the correlation `ρ_Z` of a standard bivariate normal such that the
/// pair `(F1⁻¹(Φ(Z1)), F2⁻¹(Φ(Z2)))` has a requested rank or linear
/// correlation.
///
/// # Example
/// ```
/// use norta_disc::{CalibrationOptions, CorrelationKind, MarginalTable, NortaInitDisc, Strategy};
///
/// let m1 = MarginalTable::new(vec![0.0, 1.0, 2.0], vec![0.2, 0.5, 0.3]).unwrap();
/// let m2 = MarginalTable::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.1, 0.4, 0.4, 0.1]).unwrap();
/// let norta = NortaInitDisc::new(&m1, &m2, CorrelationKind::Rank, CalibrationOptions::default())
///     .unwrap();
/// let c = norta.compute_rho(0.3, Strategy::Ni1).unwrap();
/// assert!(c.rho > 0.3 && c.rho < 0.4);
/// ```
#[derive(Debug, Clone)]
pub struct NortaInitDisc {
    grid: Arc<BreakpointGrid>,
    options: CalibrationOptions,
}

impl NortaInitDisc {
    /// Build the breakpoint grid for `(m1, m2)`.
    ///
    /// # Errors
    /// [`norta_core::Error::InvalidArgument`] when `options` fail validation.
    pub fn new(
        m1: &MarginalTable,
        m2: &MarginalTable,
        kind: CorrelationKind,
        options: CalibrationOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            grid: Arc::new(BreakpointGrid::new(m1, m2, kind)),
            options,
        })
    }

    /// The shared breakpoint grid.
    pub fn grid(&self) -> &Arc<BreakpointGrid> {
        &self.grid
    }

    /// The options in use.
    pub fn options(&self) -> &CalibrationOptions {
        &self.options
    }

    /// The correlation kind targets refer to.
    pub fn kind(&self) -> CorrelationKind {
        self.grid.kind()
    }

    /// The concrete strategy `strategy` resolves to on this grid.
    pub fn resolve(&self, strategy: Strategy) -> Strategy {
        resolve(strategy, &self.grid, &self.options)
    }

    /// A fresh functional for direct evaluation of `g(ρ)`.
    pub fn functional(&self, strategy: Strategy) -> Box<dyn CorrelationFunctional> {
        build(strategy, self.grid.clone(), &self.options)
    }

    /// Correlations attained at `ρ = ∓(1 − ε)`, evaluated exactly.
    pub fn attainable_range(&self) -> Result<(Real, Real)> {
        let mut exact = Ni2a::new(self.grid.clone());
        solver::attainable_range(&mut exact, self.options.bracket_epsilon)
    }

    /// Calibrate `ρ_Z` for `target`.
    ///
    /// # Errors
    /// * [`norta_core::Error::InvalidArgument`] for a target outside
    ///   `[-1, 1]`.
    /// * [`norta_core::Error::UnachievableCorrelation`] with the attainable
    ///   range when no ρ reproduces `target`.
    /// * [`norta_core::Error::NonConvergence`] when the deterministic solver
    ///   exhausts its iterations.
    pub fn compute_rho(&self, target: Real, strategy: Strategy) -> Result<Calibration> {
        let concrete = self.resolve(strategy);
        info!(
            "calibrating {:?} correlation {target} on a {}x{} grid with {concrete}",
            self.kind(),
            self.grid.rows(),
            self.grid.cols()
        );

        let solution = if concrete.is_exact() {
            let mut functional = build(concrete, self.grid.clone(), &self.options);
            solver::solve_deterministic(functional.as_mut(), target, &self.options)
        } else {
            let mut functional = Ni3::new(self.grid.clone(), Ni3Settings::from(&self.options));
            solver::solve_stochastic(&mut functional, target, &self.options)
        };
        let solution = solution.map_err(|e| {
            warn!("{concrete} calibration of {target} failed: {e}");
            e
        })?;

        for w in &solution.warnings {
            warn!("{concrete}: {w}");
        }
        let calibration = Calibration::from_solution(concrete, solution);
        info!(
            "{concrete}: rho = {:.10} after {} iterations ({} evaluations, residual {:e})",
            calibration.rho, calibration.iterations, calibration.evaluations, calibration.residual
        );
        Ok(calibration)
    }
}

/// One-shot calibration of `ρ_Z` for a marginal pair.
///
/// Equivalent to building a [`NortaInitDisc`] and calling
/// [`NortaInitDisc::compute_rho`] once.
pub fn compute_rho(
    m1: &MarginalTable,
    m2: &MarginalTable,
    target: Real,
    kind: CorrelationKind,
    strategy: Strategy,
    options: &CalibrationOptions,
) -> Result<Calibration> {
    NortaInitDisc::new(m1, m2, kind, options.clone())?.compute_rho(target, strategy)
}
