use super::{check_rho, par_map_indexed, CorrelationFunctional, Evaluation, Strategy};
use crate::grid::BreakpointGrid;
use norta_core::{Real, Result};
use norta_math::bivariate_normal_cdf;
use std::sync::Arc;

/// Exact evaluation over the summation-by-parts corners.
///
/// Each finite corner `Φ₂(a_i, b_j; ρ)` is evaluated once, rows are
/// accumulated into partial sums `Σ_j v_j Φ₂(a_i, b_j; ρ)`, and corners fixed
/// by the univariate margins are skipped.  Row sums are cached for the most
/// recent ρ only; a call at a different ρ recomputes them.
#[derive(Debug, Clone)]
pub struct Ni2a {
    grid: Arc<BreakpointGrid>,
    cached_rho: Option<Real>,
    row_sums: Vec<Real>,
    value: Real,
}

impl Ni2a {
    /// Create the strategy over `grid`.
    pub fn new(grid: Arc<BreakpointGrid>) -> Self {
        Self {
            grid,
            cached_rho: None,
            row_sums: Vec::new(),
            value: 0.0,
        }
    }

    /// Row partial sums for the cached ρ, if any.
    pub fn row_sums(&self) -> Option<(Real, &[Real])> {
        self.cached_rho.map(|rho| (rho, self.row_sums.as_slice()))
    }
}

/// Compute the corner row sums of `grid` at `rho`.
///
/// Returns the sums for the interior rows `0..m1-1` and the number of `Φ₂`
/// evaluations performed.
pub(crate) fn corner_row_sums(grid: &BreakpointGrid, rho: Real) -> (Vec<Real>, usize) {
    let (a, b) = (grid.row_breakpoints(), grid.col_breakpoints());
    let (u, v) = (grid.row_coefficients(), grid.col_coefficients());
    let inner_rows = grid.rows() - 1;
    let inner_cols = grid.cols() - 1;

    let rows = par_map_indexed(inner_rows, grid.cells(), |i| {
        if u[i] == 0.0 {
            return (0.0, 0);
        }
        let mut sum = 0.0;
        let mut calls = 0;
        for j in 0..inner_cols {
            if v[j] == 0.0 {
                continue;
            }
            let corner = match grid.pruned_corner(i, j) {
                Some(c) => c,
                None => {
                    calls += 1;
                    bivariate_normal_cdf(a[i], b[j], rho)
                }
            };
            sum += v[j] * corner;
        }
        (sum, calls)
    });
    let calls = rows.iter().map(|r| r.1).sum();
    (rows.into_iter().map(|r| r.0).collect(), calls)
}

/// `K + Σ_i u_i · row_i`.
pub(crate) fn combine_rows(grid: &BreakpointGrid, row_sums: &[Real]) -> Real {
    grid.constant()
        + grid
            .row_coefficients()
            .iter()
            .zip(row_sums)
            .map(|(u, s)| u * s)
            .sum::<Real>()
}

impl CorrelationFunctional for Ni2a {
    fn strategy(&self) -> Strategy {
        Strategy::Ni2a
    }

    fn grid(&self) -> &BreakpointGrid {
        &self.grid
    }

    fn evaluate(&mut self, rho: Real) -> Result<Evaluation> {
        check_rho(rho)?;
        if self.cached_rho == Some(rho) {
            return Ok(Evaluation::exact(rho, self.value, 0));
        }
        let (row_sums, calls) = corner_row_sums(&self.grid, rho);
        self.value = combine_rows(&self.grid, &row_sums);
        self.row_sums = row_sums;
        self.cached_rho = Some(rho);
        Ok(Evaluation::exact(rho, self.value, calls))
    }
}
