//! Root finders driving a correlation functional to a target correlation.
//!
//! Exact strategies are solved by Brent's method on the bracket
//! `[-1 + ε, 1 − ε]`.  Monte Carlo estimates are too noisy for bracketing,
//! so NI3 is driven by a Robbins–Monro iteration with Polyak–Ruppert
//! averaging instead.  Residuals are always reported in correlation units.

use crate::functional::{CorrelationFunctional, Evaluation, Ni3, PrecisionWarning};
use crate::options::CalibrationOptions;
use log::debug;
use norta_core::{Error, Real, Result};
use norta_math::solvers1d::{Bracket, Brent};
use norta_math::Statistics;

/// Floor on the gradient used to scale stochastic steps, in correlation
/// units per unit ρ.
pub const MIN_GRADIENT: Real = 0.05;

/// Slack, in standard errors, granted to a Monte Carlo estimate of the
/// attainable range before a target is declared unattainable.
pub const RANGE_SLACK: Real = 3.0;

/// Outcome of a root search.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The calibrated normal correlation.
    pub rho: Real,
    /// Solver iterations (Brent steps or stochastic batches).
    pub iterations: usize,
    /// Achieved residual in correlation units.
    pub residual: Real,
    /// Functional evaluations, including the bracket ends.
    pub evaluations: usize,
    /// Summed evaluation cost (`Φ₂` calls or Monte Carlo samples).
    pub cost: usize,
    /// Standard error of `rho` for stochastic solutions.
    pub std_error: Option<Real>,
    /// Precision warnings raised during the search.
    pub warnings: Vec<PrecisionWarning>,
}

/// Bookkeeping wrapper turning functional values into residuals.
struct Objective<'a, F: ?Sized> {
    functional: &'a mut F,
    target: Real,
    evaluations: usize,
    cost: usize,
}

impl<'a, F: CorrelationFunctional + ?Sized> Objective<'a, F> {
    fn new(functional: &'a mut F, target: Real) -> Self {
        Self {
            functional,
            target,
            evaluations: 0,
            cost: 0,
        }
    }

    fn evaluate(&mut self, rho: Real) -> Result<Evaluation> {
        let e = self.functional.evaluate(rho)?;
        self.evaluations += 1;
        self.cost += e.cost;
        Ok(e)
    }

    fn correlation(&self, e: &Evaluation) -> Real {
        self.functional.grid().correlation(e.value)
    }

    fn residual(&mut self, rho: Real) -> Result<Real> {
        let e = self.evaluate(rho)?;
        let r = self.correlation(&e) - self.target;
        debug!(
            "{}: rho = {rho:.12}, residual = {r:e}, cost = {}",
            self.functional.strategy(),
            e.cost
        );
        Ok(r)
    }
}

fn check_target(target: Real) -> Result<()> {
    if target.is_finite() && (-1.0..=1.0).contains(&target) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "target correlation must lie in [-1, 1], got {target}"
        )))
    }
}

/// Correlations attained at `ρ = −1 + ε` and `ρ = 1 − ε`.
pub fn attainable_range(
    functional: &mut dyn CorrelationFunctional,
    epsilon: Real,
) -> Result<(Real, Real)> {
    let lo = functional.evaluate(-1.0 + epsilon)?;
    let hi = functional.evaluate(1.0 - epsilon)?;
    let grid = functional.grid();
    Ok((grid.correlation(lo.value), grid.correlation(hi.value)))
}

/// Solve `corr(ρ) = target` with Brent's method.
///
/// # Errors
/// * [`Error::InvalidArgument`] for invalid options, or a non-finite target
///   or one outside `[-1, 1]`.
/// * [`Error::UnachievableCorrelation`] when the residual has the same sign
///   at both ends of the bracket.
/// * [`Error::NonConvergence`] when `max_iterations` is exhausted.
pub fn solve_deterministic(
    functional: &mut dyn CorrelationFunctional,
    target: Real,
    options: &CalibrationOptions,
) -> Result<Solution> {
    options.validate()?;
    check_target(target)?;
    let (lo, hi) = (-1.0 + options.bracket_epsilon, 1.0 - options.bracket_epsilon);
    let mut objective = Objective::new(functional, target);
    let bracket = Bracket {
        x_min: lo,
        f_min: objective.residual(lo)?,
        x_max: hi,
        f_max: objective.residual(hi)?,
    };
    if bracket.f_min > 0.0 || bracket.f_max < 0.0 {
        return Err(Error::UnachievableCorrelation {
            target,
            min: target + bracket.f_min,
            max: target + bracket.f_max,
        });
    }

    let brent = Brent::new(
        options.root_tolerance,
        options.residual_tolerance,
        options.max_iterations,
    );
    let outcome = brent.solve(|rho| objective.residual(rho), bracket)?;
    if !outcome.converged {
        return Err(Error::NonConvergence {
            iterations: outcome.iterations,
            rho: outcome.root,
            residual: outcome.value,
        });
    }

    let (evaluations, cost) = (objective.evaluations, objective.cost);
    Ok(Solution {
        rho: outcome.root,
        iterations: outcome.iterations,
        residual: outcome.value,
        evaluations,
        cost,
        std_error: None,
        warnings: functional.take_warnings(),
    })
}

/// Solve `corr(ρ) = target` by stochastic approximation on Monte Carlo
/// estimates.
///
/// Starting from `ρ₀ = target`, batch `k` at `ρ_k` gives a residual `r_k`
/// and the running gradient `ĝ` (floored at [`MIN_GRADIENT`]); the update is
/// `ρ_{k+1} = clamp(ρ_k − a_k r_k / ĝ)` with `a_k = step_gain / (k +
/// step_offset)`.  The estimate is the mean of the last
/// `averaging_fraction` of the iterates and its standard error is derived
/// from the batch variances over the same window.
///
/// # Errors
/// * [`Error::InvalidArgument`] for invalid options or target.
/// * [`Error::UnachievableCorrelation`] when the target lies more than
///   [`RANGE_SLACK`] standard errors outside the estimated range.
pub fn solve_stochastic(
    functional: &mut Ni3,
    target: Real,
    options: &CalibrationOptions,
) -> Result<Solution> {
    options.validate()?;
    check_target(target)?;
    let (lo, hi) = (-1.0 + options.bracket_epsilon, 1.0 - options.bracket_epsilon);
    let scale = functional.grid().scale();
    let mut evaluations = 0;
    let mut cost = 0;

    let low = functional.evaluate(lo)?;
    let high = functional.evaluate(hi)?;
    evaluations += 2;
    cost += low.cost + high.cost;
    let (r_lo, r_hi) = (
        functional.grid().correlation(low.value),
        functional.grid().correlation(high.value),
    );
    if target < r_lo - RANGE_SLACK * low.error / scale
        || target > r_hi + RANGE_SLACK * high.error / scale
    {
        return Err(Error::UnachievableCorrelation {
            target,
            min: r_lo,
            max: r_hi,
        });
    }
    functional.reset_estimator();

    let batches = options.monte_carlo_batches;
    let window = (batches as Real * options.averaging_fraction).ceil() as usize;
    let window = window.clamp(1, batches);
    let mut iterates = Statistics::new();
    let mut residuals = Statistics::new();
    let mut variances = Statistics::new();
    let mut gradient = MIN_GRADIENT;
    let mut rho = target.clamp(lo, hi);

    for k in 0..batches {
        let e = functional.evaluate(rho)?;
        evaluations += 1;
        cost += e.cost;
        let residual = functional.grid().correlation(e.value) - target;
        gradient = functional
            .estimator()
            .gradient_mean()
            .map_or(MIN_GRADIENT, |g| (g / scale).max(MIN_GRADIENT));
        let step = options.step_gain / (k as Real + options.step_offset);
        rho = (rho - step * residual / gradient).clamp(lo, hi);
        debug!(
            "NI3 batch {k}: residual = {residual:e}, gradient = {gradient:.6}, next rho = {rho:.8}"
        );
        if k >= batches - window {
            iterates.add(rho);
            residuals.add(residual);
            let se = e.error / scale;
            variances.add(se * se);
        }
    }

    let estimate = iterates.mean().unwrap_or(rho);
    let mean_variance = variances.mean().unwrap_or(0.0);
    let std_error = (mean_variance / window as Real).sqrt() / gradient;
    let mut warnings = Vec::new();
    if std_error > options.max_standard_error {
        warnings.push(PrecisionWarning::StandardError {
            std_error,
            bound: options.max_standard_error,
        });
    }

    Ok(Solution {
        rho: estimate,
        iterations: batches,
        residual: residuals.mean().unwrap_or(0.0),
        evaluations,
        cost,
        std_error: Some(std_error),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functional::{Ni1, Ni2b, Ni2bSettings, Ni3Settings};
    use crate::grid::BreakpointGrid;
    use crate::marginal::{CorrelationKind, MarginalTable};
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn grid() -> Arc<BreakpointGrid> {
        let m1 = MarginalTable::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![0.1, 0.3, 0.3, 0.2, 0.1],
        )
        .unwrap();
        let m2 = MarginalTable::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.25, 0.25, 0.3, 0.2]).unwrap();
        Arc::new(BreakpointGrid::new(&m1, &m2, CorrelationKind::Rank))
    }

    #[test]
    fn brent_hits_the_target() {
        let g = grid();
        let options = CalibrationOptions::default();
        let mut f = Ni1::new(g.clone());
        let s = solve_deterministic(&mut f, 0.5, &options).unwrap();
        let achieved = g.correlation(f.evaluate(s.rho).unwrap().value);
        assert_abs_diff_eq!(achieved, 0.5, epsilon = 1e-9);
        assert!(s.residual.abs() < 1e-9);
        assert_eq!(s.evaluations, s.iterations + 2);
        assert!(s.std_error.is_none());
    }

    #[test]
    fn zero_target_gives_zero_rho() {
        let mut f = Ni1::new(grid());
        let s = solve_deterministic(&mut f, 0.0, &CalibrationOptions::default()).unwrap();
        assert_abs_diff_eq!(s.rho, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn unattainable_target_reports_range() {
        let g = grid();
        let mut f = Ni1::new(g);
        let err = solve_deterministic(&mut f, 0.9999, &CalibrationOptions::default()).unwrap_err();
        match err {
            Error::UnachievableCorrelation { target, min, max } => {
                assert_eq!(target, 0.9999);
                assert!(min < -0.8 && max > 0.8 && max < 0.9999);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn iteration_cap_is_reported() {
        let options = CalibrationOptions::default()
            .with_max_iterations(1)
            .with_root_tolerance(1e-15)
            .with_residual_tolerance(0.0);
        let mut f = Ni1::new(grid());
        let err = solve_deterministic(&mut f, 0.37, &options).unwrap_err();
        assert!(matches!(err, Error::NonConvergence { iterations: 1, .. }), "{err}");
    }

    #[test]
    fn invalid_target() {
        let mut f = Ni1::new(grid());
        let options = CalibrationOptions::default();
        assert!(matches!(
            solve_deterministic(&mut f, f64::NAN, &options),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            solve_deterministic(&mut f, 1.5, &options),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn corrected_cache_converges_to_the_same_root() {
        let g = grid();
        let options = CalibrationOptions::default();
        let exact = solve_deterministic(&mut Ni1::new(g.clone()), -0.35, &options).unwrap();
        let mut cached = Ni2b::new(g, Ni2bSettings::from(&options));
        let s = solve_deterministic(&mut cached, -0.35, &options).unwrap();
        assert_abs_diff_eq!(s.rho, exact.rho, epsilon = 1e-8);
        assert!(cached.corrected_evaluations() > 0);
        assert!(s.cost < exact.cost);
    }

    #[test]
    fn stochastic_agrees_with_brent() {
        let g = grid();
        let options = CalibrationOptions::default()
            .with_monte_carlo_sample_size(20_000)
            .with_monte_carlo_batches(100);
        let exact = solve_deterministic(&mut Ni1::new(g.clone()), 0.4, &options).unwrap();
        let mut mc = Ni3::new(g, Ni3Settings::from(&options));
        let s = solve_stochastic(&mut mc, 0.4, &options).unwrap();
        let se = s.std_error.unwrap();
        assert!(se > 0.0 && se < options.max_standard_error);
        assert!(
            (s.rho - exact.rho).abs() < 3.0 * se,
            "{} vs {} (se {se})",
            s.rho,
            exact.rho
        );
        assert!(s.warnings.is_empty());
        assert_eq!(s.iterations, 100);
        assert_eq!(mc.estimator().batches(), 100);
    }

    #[test]
    fn stochastic_rejects_unattainable() {
        // Bernoulli(0.2) against Bernoulli(0.8): the rank correlation cannot
        // exceed 0.25.
        let m1 = MarginalTable::new(vec![0.0, 1.0], vec![0.8, 0.2]).unwrap();
        let m2 = MarginalTable::new(vec![0.0, 1.0], vec![0.2, 0.8]).unwrap();
        let g = Arc::new(BreakpointGrid::new(&m1, &m2, CorrelationKind::Rank));
        let options = CalibrationOptions::default().with_monte_carlo_batches(10);
        let mut mc = Ni3::new(g, Ni3Settings::from(&options));
        match solve_stochastic(&mut mc, 0.9, &options) {
            Err(Error::UnachievableCorrelation { max, .. }) => {
                assert!((max - 0.25).abs() < 0.05, "max {max}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tiny_batches_raise_standard_error_warning() {
        let options = CalibrationOptions::default()
            .with_monte_carlo_sample_size(50)
            .with_monte_carlo_batches(4)
            .with_max_standard_error(1e-6);
        let mut mc = Ni3::new(grid(), Ni3Settings::from(&options));
        let s = solve_stochastic(&mut mc, 0.2, &options).unwrap();
        assert!(matches!(
            s.warnings.as_slice(),
            [PrecisionWarning::StandardError { .. }]
        ));
    }
}
