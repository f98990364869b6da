use super::{
    check_rho, par_map_indexed, CorrelationFunctional, Evaluation, PrecisionWarning, Strategy,
};
use crate::grid::BreakpointGrid;
use crate::options::CalibrationOptions;
use norta_core::{Real, Result, Size};
use norta_math::{bivariate_normal_cdf, bivariate_normal_pdf, bivariate_normal_pdf_drho};
use std::sync::Arc;

/// Trapezoidal corrections are only attempted while both the cached and the
/// requested ρ stay inside `[-CORRECTION_RHO_LIMIT, CORRECTION_RHO_LIMIT]`;
/// `φ₂` is too steep near ±1 for a two-point rule.
const CORRECTION_RHO_LIMIT: Real = 0.99;

/// Tuning of the [`Ni2b`] corner cache.
///
/// Bounds are expressed in correlation units and scaled by `σ1 σ2` before
/// they are compared with functional values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ni2bSettings {
    /// Largest `|Δρ|` served by a correction.
    pub max_correction_step: Real,
    /// Largest estimated error of a single correction step.
    pub step_error_bound: Real,
    /// Largest accumulated drift before a forced rebuild and a warning.
    pub drift_bound: Real,
    /// Full recomputation after this many consecutive corrections.
    pub refresh_interval: Size,
}

impl Default for Ni2bSettings {
    fn default() -> Self {
        Self::from(&CalibrationOptions::default())
    }
}

impl From<&CalibrationOptions> for Ni2bSettings {
    fn from(options: &CalibrationOptions) -> Self {
        Self {
            max_correction_step: options.max_correction_step,
            step_error_bound: options.step_error_bound,
            drift_bound: options.drift_bound,
            refresh_interval: options.refresh_interval,
        }
    }
}

/// A corner `(i, j)` whose `Φ₂` value depends on ρ, with its weight `u_i v_j`.
#[derive(Debug, Clone, Copy)]
struct Corner {
    i: usize,
    j: usize,
    weight: Real,
}

/// Exact corner sum with a cache that survives across trial correlations.
///
/// A full evaluation stores every active corner `Φ₂(a_i, b_j; ρ)` together
/// with its density `φ₂ = ∂Φ₂/∂ρ` and the density slope `φ₂' = ∂φ₂/∂ρ`.  A
/// later call at a nearby ρ updates the corners with the end-corrected
/// trapezoidal rule
///
/// ```text
/// Φ₂(ρ + Δ) ≈ Φ₂(ρ) + Δ (φ₂(ρ) + φ₂(ρ + Δ)) / 2 + Δ² (φ₂'(ρ) − φ₂'(ρ + Δ)) / 12
/// ```
///
/// which costs two closed-form exponentials per corner instead of one
/// quadrature.  The magnitude of the end correction bounds the step error;
/// steps that are too large, that would exceed the per-step bound, or that
/// come after `refresh_interval` corrections are served by a full
/// recomputation instead.  If the summed step errors exceed `drift_bound`
/// the cache is rebuilt and a [`PrecisionWarning::CorrectionDrift`] is
/// queued.
#[derive(Debug, Clone)]
pub struct Ni2b {
    grid: Arc<BreakpointGrid>,
    settings: Ni2bSettings,
    active: Vec<Corner>,
    fixed: Real,
    corners: Vec<Real>,
    densities: Vec<(Real, Real)>,
    rho: Option<Real>,
    value: Real,
    drift: Real,
    corrections_since_refresh: usize,
    full_evaluations: usize,
    corrected_evaluations: usize,
    warnings: Vec<PrecisionWarning>,
}

impl Ni2b {
    /// Create the strategy over `grid`.
    ///
    /// Corners with a zero weight or fixed by the margins are folded into a
    /// constant once, here.
    pub fn new(grid: Arc<BreakpointGrid>, settings: Ni2bSettings) -> Self {
        let (u, v) = (grid.row_coefficients(), grid.col_coefficients());
        let mut fixed = grid.constant();
        let mut active = Vec::new();
        for (i, &ui) in u[..grid.rows() - 1].iter().enumerate() {
            for (j, &vj) in v[..grid.cols() - 1].iter().enumerate() {
                let weight = ui * vj;
                if weight == 0.0 {
                    continue;
                }
                match grid.pruned_corner(i, j) {
                    Some(c) => fixed += weight * c,
                    None => active.push(Corner { i, j, weight }),
                }
            }
        }
        Self {
            grid,
            settings,
            active,
            fixed,
            corners: Vec::new(),
            densities: Vec::new(),
            rho: None,
            value: 0.0,
            drift: 0.0,
            corrections_since_refresh: 0,
            full_evaluations: 0,
            corrected_evaluations: 0,
            warnings: Vec::new(),
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &Ni2bSettings {
        &self.settings
    }

    /// Number of corners whose value depends on ρ.
    pub fn active_corners(&self) -> usize {
        self.active.len()
    }

    /// Evaluations served by a full `Φ₂` pass.
    pub fn full_evaluations(&self) -> usize {
        self.full_evaluations
    }

    /// Evaluations served by a derivative correction.
    pub fn corrected_evaluations(&self) -> usize {
        self.corrected_evaluations
    }

    /// Drift accumulated since the last full pass, in functional units.
    pub fn drift(&self) -> Real {
        self.drift
    }

    fn weighted_sum(&self) -> Real {
        self.fixed
            + self
                .active
                .iter()
                .zip(&self.corners)
                .map(|(c, v)| c.weight * v)
                .sum::<Real>()
    }

    fn recompute(&mut self, rho: Real) -> Evaluation {
        let (a, b) = (self.grid.row_breakpoints(), self.grid.col_breakpoints());
        let active = &self.active;
        let values = par_map_indexed(active.len(), active.len(), |k| {
            let c = active[k];
            (
                bivariate_normal_cdf(a[c.i], b[c.j], rho),
                (
                    bivariate_normal_pdf(a[c.i], b[c.j], rho),
                    bivariate_normal_pdf_drho(a[c.i], b[c.j], rho),
                ),
            )
        });
        let (corners, densities): (Vec<Real>, Vec<(Real, Real)>) = values.into_iter().unzip();
        self.corners = corners;
        self.densities = densities;
        self.rho = Some(rho);
        self.drift = 0.0;
        self.corrections_since_refresh = 0;
        self.full_evaluations += 1;
        self.value = self.weighted_sum();
        Evaluation::exact(rho, self.value, self.active.len())
    }

    fn densities_at(&self, rho: Real) -> Vec<(Real, Real)> {
        let (a, b) = (self.grid.row_breakpoints(), self.grid.col_breakpoints());
        let active = &self.active;
        par_map_indexed(active.len(), active.len(), |k| {
            let c = active[k];
            (
                bivariate_normal_pdf(a[c.i], b[c.j], rho),
                bivariate_normal_pdf_drho(a[c.i], b[c.j], rho),
            )
        })
    }

    /// Try to move the cache from `from` to `rho` by a corrected trapezoidal
    /// step.
    ///
    /// Returns `None` when the step must be replaced by a full pass.
    fn correct(&mut self, from: Real, rho: Real) -> Option<Evaluation> {
        let dr = rho - from;
        let scale = self.grid.scale();
        if dr.abs() > self.settings.max_correction_step
            || self.corrections_since_refresh >= self.settings.refresh_interval
            || from.abs() > CORRECTION_RHO_LIMIT
            || rho.abs() > CORRECTION_RHO_LIMIT
        {
            return None;
        }

        let next = self.densities_at(rho);
        let h2 = dr * dr / 12.0;
        let step_error = h2
            * self
                .active
                .iter()
                .zip(self.densities.iter().zip(&next))
                .map(|(c, (old, new))| (c.weight * (old.1 - new.1)).abs())
                .sum::<Real>();
        if step_error > self.settings.step_error_bound * scale {
            return None;
        }

        for ((corner, old), new) in self.corners.iter_mut().zip(&self.densities).zip(&next) {
            *corner += 0.5 * dr * (old.0 + new.0) + h2 * (old.1 - new.1);
        }
        self.densities = next;
        self.rho = Some(rho);
        self.drift += step_error;
        self.corrections_since_refresh += 1;

        if self.drift > self.settings.drift_bound * scale {
            self.warnings.push(PrecisionWarning::CorrectionDrift {
                rho,
                drift: self.drift / scale,
                bound: self.settings.drift_bound,
            });
            return None;
        }

        self.corrected_evaluations += 1;
        self.value = self.weighted_sum();
        Some(Evaluation {
            rho,
            value: self.value,
            error: self.drift,
            gradient: None,
            cost: 0,
        })
    }
}

impl CorrelationFunctional for Ni2b {
    fn strategy(&self) -> Strategy {
        Strategy::Ni2b
    }

    fn grid(&self) -> &BreakpointGrid {
        &self.grid
    }

    fn evaluate(&mut self, rho: Real) -> Result<Evaluation> {
        check_rho(rho)?;
        let evaluation = match self.rho {
            Some(cached) if cached == rho => Evaluation {
                rho,
                value: self.value,
                error: self.drift,
                gradient: None,
                cost: 0,
            },
            Some(cached) => match self.correct(cached, rho) {
                Some(e) => e,
                None => self.recompute(rho),
            },
            None => self.recompute(rho),
        };
        Ok(evaluation)
    }

    fn take_warnings(&mut self) -> Vec<PrecisionWarning> {
        std::mem::take(&mut self.warnings)
    }
}
