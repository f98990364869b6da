//! Normal-quantile breakpoint grid for a pair of marginals.
//!
//! Row `i` of the grid is the interval `(a[i-1], a[i]]` with
//! `a[i] = Φ⁻¹(F1(x_{1,i}))`, `a[-1] = −∞` and `a[m1-1] = +∞`; columns are
//! the same for the second marginal.  A standard normal pair falls into cell
//! `(i, j)` exactly when the NORTA transform maps it to `(x_{1,i}, x_{2,j})`.
//!
//! Summation by parts turns the cell sum of the correlation functional into
//! a weighted sum over corners,
//!
//! ```text
//! g(ρ) = Σ_{i,j} w1_i w2_j P_ij(ρ) = K + Σ_{i<m1-1, j<m2-1} u_i v_j Φ₂(a_i, b_j; ρ)
//! ```
//!
//! with `u_i = w1_i − w1_{i+1}`, `u_{m1-1} = w1_{m1-1}` (same for `v`) and a
//! ρ-independent constant `K` collecting the corners on the infinite edges.

use crate::marginal::{CorrelationKind, MarginalTable};
use norta_core::Real;
use norta_math::{normal_cdf, normal_cdf_inverse};

/// Corner probabilities below this bound (or within it of 1) are treated
/// as ρ-independent.
pub const PRUNE_THRESHOLD: Real = 1e-15;

/// Breakpoints, scores, and the summation-by-parts reduction for one
/// marginal pair.  Immutable once built.
#[derive(Debug, Clone)]
pub struct BreakpointGrid {
    kind: CorrelationKind,
    a: Vec<Real>,
    b: Vec<Real>,
    p1: Vec<Real>,
    p2: Vec<Real>,
    w1: Vec<Real>,
    w2: Vec<Real>,
    u: Vec<Real>,
    v: Vec<Real>,
    constant: Real,
    mean1: Real,
    sd1: Real,
    mean2: Real,
    sd2: Real,
}

impl BreakpointGrid {
    /// Build the grid for `(m1, m2)` with scores chosen by `kind`.
    pub fn new(m1: &MarginalTable, m2: &MarginalTable, kind: CorrelationKind) -> Self {
        let a = breakpoints(m1.cdf());
        let b = breakpoints(m2.cdf());
        let w1 = m1.scores(kind).to_vec();
        let w2 = m2.scores(kind).to_vec();
        let u = differences(&w1);
        let v = differences(&w2);
        let (mean1, sd1) = m1.score_moments(kind);
        let (mean2, sd2) = m2.score_moments(kind);

        // Edge probabilities as the corner evaluations see them, so that the
        // reduced sum and the cell sum share the same margins.
        let p1: Vec<Real> = a.iter().map(|&x| normal_cdf(x)).collect();
        let p2: Vec<Real> = b.iter().map(|&x| normal_cdf(x)).collect();
        // Tables have at least two points, so both splits are non-empty.
        let (last_u, inner_u) = (u[u.len() - 1], &u[..u.len() - 1]);
        let (last_v, inner_v) = (v[v.len() - 1], &v[..v.len() - 1]);
        let edge_a: Real = inner_u.iter().zip(&p1).map(|(u, c)| u * c).sum();
        let edge_b: Real = inner_v.iter().zip(&p2).map(|(v, c)| v * c).sum();
        let constant = last_u * last_v + last_u * edge_b + last_v * edge_a;

        Self {
            kind,
            a,
            b,
            p1,
            p2,
            w1,
            w2,
            u,
            v,
            constant,
            mean1,
            sd1,
            mean2,
            sd2,
        }
    }

    /// The correlation kind the scores were built for.
    pub fn kind(&self) -> CorrelationKind {
        self.kind
    }

    /// Number of rows (support points of the first marginal).
    pub fn rows(&self) -> usize {
        self.a.len()
    }

    /// Number of columns (support points of the second marginal).
    pub fn cols(&self) -> usize {
        self.b.len()
    }

    /// Number of cells, `m1 · m2`.
    pub fn cells(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Row breakpoints `a[0..m1]`; the last one is `+∞`.
    pub fn row_breakpoints(&self) -> &[Real] {
        &self.a
    }

    /// Column breakpoints `b[0..m2]`; the last one is `+∞`.
    pub fn col_breakpoints(&self) -> &[Real] {
        &self.b
    }

    /// `Φ(a[i])`, the first margin's cumulative probabilities as seen
    /// through the breakpoints.
    pub fn row_probabilities(&self) -> &[Real] {
        &self.p1
    }

    /// `Φ(b[j])` for the second margin.
    pub fn col_probabilities(&self) -> &[Real] {
        &self.p2
    }

    /// Lower edge of row `i`, `a[i-1]` (`−∞` for the first row).
    pub fn row_lower(&self, i: usize) -> Real {
        if i == 0 {
            f64::NEG_INFINITY
        } else {
            self.a[i - 1]
        }
    }

    /// Lower edge of column `j`, `b[j-1]` (`−∞` for the first column).
    pub fn col_lower(&self, j: usize) -> Real {
        if j == 0 {
            f64::NEG_INFINITY
        } else {
            self.b[j - 1]
        }
    }

    /// Row scores `w1`.
    pub fn row_scores(&self) -> &[Real] {
        &self.w1
    }

    /// Column scores `w2`.
    pub fn col_scores(&self) -> &[Real] {
        &self.w2
    }

    /// Summation-by-parts row coefficients `u`.
    pub fn row_coefficients(&self) -> &[Real] {
        &self.u
    }

    /// Summation-by-parts column coefficients `v`.
    pub fn col_coefficients(&self) -> &[Real] {
        &self.v
    }

    /// The ρ-independent part `K` of the reduced sum.
    pub fn constant(&self) -> Real {
        self.constant
    }

    /// Row index of the cell containing the standard normal value `z`,
    /// i.e. the index of the NORTA-transformed first coordinate.
    pub fn row_of(&self, z: Real) -> usize {
        self.a.partition_point(|&x| x < z)
    }

    /// Column index of the cell containing `z`.
    pub fn col_of(&self, z: Real) -> usize {
        self.b.partition_point(|&x| x < z)
    }

    /// Value of the interior corner `Φ₂(a_i, b_j; ρ)` when it is determined
    /// to within [`PRUNE_THRESHOLD`] by the univariate margins, `None` when
    /// it has to be evaluated.
    pub fn pruned_corner(&self, i: usize, j: usize) -> Option<Real> {
        let (p, q) = (self.p1[i], self.p2[j]);
        if p <= PRUNE_THRESHOLD || q <= PRUNE_THRESHOLD {
            Some(0.0)
        } else if 1.0 - p <= PRUNE_THRESHOLD {
            Some(q)
        } else if 1.0 - q <= PRUNE_THRESHOLD {
            Some(p)
        } else {
            None
        }
    }

    /// Mean and standard deviation of the row scores.
    pub fn row_moments(&self) -> (Real, Real) {
        (self.mean1, self.sd1)
    }

    /// Mean and standard deviation of the column scores.
    pub fn col_moments(&self) -> (Real, Real) {
        (self.mean2, self.sd2)
    }

    /// `σ1 · σ2`, the scale converting functional values to correlations.
    pub fn scale(&self) -> Real {
        self.sd1 * self.sd2
    }

    /// Correlation implied by a functional value: `(g − μ1 μ2) / (σ1 σ2)`.
    pub fn correlation(&self, g: Real) -> Real {
        (g - self.mean1 * self.mean2) / self.scale()
    }

    /// Functional value implied by a correlation: `r σ1 σ2 + μ1 μ2`.
    pub fn functional_target(&self, r: Real) -> Real {
        r * self.scale() + self.mean1 * self.mean2
    }
}

fn breakpoints(cdf: &[Real]) -> Vec<Real> {
    let mut a: Vec<Real> = cdf.iter().map(|&p| normal_cdf_inverse(p)).collect();
    if let Some(last) = a.last_mut() {
        *last = f64::INFINITY;
    }
    a
}

fn differences(w: &[Real]) -> Vec<Real> {
    let mut d: Vec<Real> = w.windows(2).map(|p| p[0] - p[1]).collect();
    if let Some(&last) = w.last() {
        d.push(last);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn table(mass: &[Real]) -> MarginalTable {
        let support = (0..mass.len()).map(|i| i as Real).collect();
        MarginalTable::new(support, mass.to_vec()).unwrap()
    }

    #[test]
    fn breakpoints_invert_cdf() {
        let m = table(&[0.2, 0.3, 0.5]);
        let g = BreakpointGrid::new(&m, &m, CorrelationKind::Rank);
        assert_eq!(g.rows(), 3);
        assert_abs_diff_eq!(normal_cdf(g.row_breakpoints()[0]), 0.2, epsilon = 1e-14);
        assert_abs_diff_eq!(normal_cdf(g.row_breakpoints()[1]), 0.5, epsilon = 1e-14);
        assert_eq!(g.row_breakpoints()[2], f64::INFINITY);
        assert_eq!(g.row_lower(0), f64::NEG_INFINITY);
    }

    #[test]
    fn zero_leading_mass_maps_to_negative_infinity() {
        let m = table(&[0.0, 0.4, 0.6]);
        let g = BreakpointGrid::new(&m, &m, CorrelationKind::Rank);
        assert_eq!(g.row_breakpoints()[0], f64::NEG_INFINITY);
        assert_eq!(g.pruned_corner(0, 1), Some(0.0));
    }

    #[test]
    fn independence_constant() {
        // At ρ = 0 the reduced sum must equal E[w1] E[w2].
        let m1 = table(&[0.1, 0.2, 0.3, 0.4]);
        let m2 = table(&[0.5, 0.25, 0.25]);
        for kind in [CorrelationKind::Rank, CorrelationKind::Linear] {
            let g = BreakpointGrid::new(&m1, &m2, kind);
            let mut sum = g.constant();
            for i in 0..g.rows() - 1 {
                for j in 0..g.cols() - 1 {
                    sum += g.row_coefficients()[i]
                        * g.col_coefficients()[j]
                        * g.row_probabilities()[i]
                        * g.col_probabilities()[j];
                }
            }
            let (mu1, _) = g.row_moments();
            let (mu2, _) = g.col_moments();
            assert_abs_diff_eq!(sum, mu1 * mu2, epsilon = 1e-14);
            assert_abs_diff_eq!(g.correlation(sum), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn edge_probabilities_follow_breakpoints() {
        let m = table(&[0.0, 0.2, 0.3, 0.5]);
        let g = BreakpointGrid::new(&m, &m, CorrelationKind::Rank);
        let p = g.row_probabilities();
        assert_eq!(p[0], 0.0);
        assert_eq!(p[3], 1.0);
        for (i, &x) in g.row_breakpoints().iter().enumerate() {
            assert_eq!(p[i], normal_cdf(x));
        }
        assert_abs_diff_eq!(p[2], m.cdf()[2], epsilon = 1e-15);
    }

    #[test]
    fn cell_lookup_matches_quantile_transform() {
        let m = table(&[0.2, 0.3, 0.5]);
        let g = BreakpointGrid::new(&m, &m, CorrelationKind::Rank);
        assert_eq!(g.row_of(-3.0), 0);
        assert_eq!(g.row_of(normal_cdf_inverse(0.3)), 1);
        assert_eq!(g.row_of(5.0), 2);
        assert_eq!(g.col_of(f64::INFINITY), 2);
    }

    #[test]
    fn target_and_correlation_are_inverse() {
        let m1 = table(&[0.1, 0.6, 0.3]);
        let m2 = table(&[0.3, 0.3, 0.4]);
        let g = BreakpointGrid::new(&m1, &m2, CorrelationKind::Linear);
        assert_abs_diff_eq!(g.correlation(g.functional_target(0.37)), 0.37, epsilon = 1e-14);
    }

    proptest! {
        #[test]
        fn breakpoints_non_decreasing(raw in proptest::collection::vec(0.01f64..1.0, 2..30)) {
            let total: Real = raw.iter().sum::<Real>() + 1.0;
            let mut mass: Vec<Real> = raw.iter().map(|p| p / total).collect();
            mass.push(1.0 / total);
            let m = table(&mass);
            let g = BreakpointGrid::new(&m, &m, CorrelationKind::Rank);
            prop_assert!(g.row_breakpoints().windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(*g.row_breakpoints().last().unwrap(), f64::INFINITY);
        }
    }
}
