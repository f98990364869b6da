use super::{check_rho, par_map_indexed, CorrelationFunctional, Evaluation, Strategy};
use crate::grid::BreakpointGrid;
use norta_core::{Real, Result};
use norta_math::bivariate_normal_cdf;
use std::sync::Arc;

/// Brute-force evaluation: every cell probability is the rectangle
/// difference of its four `Φ₂` corners.
///
/// Exact up to `Φ₂` precision and stateless, which makes it the reference
/// the other strategies are checked against.
#[derive(Debug, Clone)]
pub struct Ni1 {
    grid: Arc<BreakpointGrid>,
}

impl Ni1 {
    /// Create the strategy over `grid`.
    pub fn new(grid: Arc<BreakpointGrid>) -> Self {
        Self { grid }
    }
}

impl CorrelationFunctional for Ni1 {
    fn strategy(&self) -> Strategy {
        Strategy::Ni1
    }

    fn grid(&self) -> &BreakpointGrid {
        &self.grid
    }

    fn evaluate(&mut self, rho: Real) -> Result<Evaluation> {
        check_rho(rho)?;
        let grid = &*self.grid;
        let (a, b) = (grid.row_breakpoints(), grid.col_breakpoints());
        let (w1, w2) = (grid.row_scores(), grid.col_scores());

        let rows = par_map_indexed(grid.rows(), grid.cells(), |i| {
            let (hi_a, lo_a) = (a[i], grid.row_lower(i));
            let mut sum = 0.0;
            for (j, (&hi_b, &w)) in b.iter().zip(w2).enumerate() {
                let lo_b = grid.col_lower(j);
                let p = bivariate_normal_cdf(hi_a, hi_b, rho)
                    - bivariate_normal_cdf(lo_a, hi_b, rho)
                    - bivariate_normal_cdf(hi_a, lo_b, rho)
                    + bivariate_normal_cdf(lo_a, lo_b, rho);
                sum += w * p;
            }
            w1[i] * sum
        });
        let value = rows.iter().sum();
        Ok(Evaluation::exact(rho, value, 4 * grid.cells()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marginal::{CorrelationKind, MarginalTable};
    use approx::assert_abs_diff_eq;

    fn grid(kind: CorrelationKind) -> Arc<BreakpointGrid> {
        let m1 = MarginalTable::new(vec![0.0, 1.0, 2.0], vec![0.2, 0.5, 0.3]).unwrap();
        let m2 = MarginalTable::new(vec![1.0, 3.0, 4.0, 8.0], vec![0.1, 0.4, 0.4, 0.1]).unwrap();
        Arc::new(BreakpointGrid::new(&m1, &m2, kind))
    }

    #[test]
    fn independence_gives_product_of_means() {
        for kind in [CorrelationKind::Rank, CorrelationKind::Linear] {
            let g = grid(kind);
            let mut f = Ni1::new(g.clone());
            let e = f.evaluate(0.0).unwrap();
            assert_abs_diff_eq!(g.correlation(e.value), 0.0, epsilon = 1e-12);
            assert_eq!(e.error, 0.0);
        }
    }

    #[test]
    fn comonotone_limit_for_identical_marginals() {
        // With ρ = 1 and identical marginals X1 = X2, so g = E[F(X)²].
        let m = MarginalTable::new(vec![0.0, 1.0, 2.0], vec![0.2, 0.5, 0.3]).unwrap();
        let g = Arc::new(BreakpointGrid::new(&m, &m, CorrelationKind::Rank));
        let expected: Real = m.mass().iter().zip(m.cdf()).map(|(p, f)| p * f * f).sum();
        let e = Ni1::new(g.clone()).evaluate(1.0).unwrap();
        assert_abs_diff_eq!(e.value, expected, epsilon = 1e-14);
        assert_abs_diff_eq!(g.correlation(e.value), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cost_counts_four_corners_per_cell() {
        let g = grid(CorrelationKind::Rank);
        let e = Ni1::new(g.clone()).evaluate(0.3).unwrap();
        assert_eq!(e.cost, 4 * g.cells());
    }
}
