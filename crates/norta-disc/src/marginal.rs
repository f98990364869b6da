//! Discrete marginal tables.
//!
//! A [`MarginalTable`] is the validated, read-only view of a discrete
//! marginal distribution the correlation engine works from: ordered finite
//! support, masses, cumulative probabilities, and the first two moments of
//! both `X` and `F(X)`.

use norta_core::{ensure, ensure_marginal, Real, Result};
use statrs::distribution::{Discrete, DiscreteCDF};

/// Absolute tolerance on `Σ mass − 1` accepted by [`MarginalTable::new`].
pub const MASS_TOLERANCE: Real = 1e-8;

/// Upper bound on the support size built by
/// [`MarginalTable::from_distribution`].
pub const MAX_SUPPORT_POINTS: usize = 1 << 22;

/// Which correlation between `X1` and `X2` a target refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CorrelationKind {
    /// Correlation of `F1(X1)` and `F2(X2)` (Spearman's rank correlation for
    /// continuous marginals).
    #[default]
    Rank,
    /// Pearson correlation of `X1` and `X2`.
    Linear,
}

/// A validated discrete marginal distribution with finite support.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalTable {
    support: Vec<Real>,
    mass: Vec<Real>,
    cdf: Vec<Real>,
    mean_f: Real,
    sd_f: Real,
    mean_x: Real,
    sd_x: Real,
}

impl MarginalTable {
    /// Build a table from support points and their probabilities.
    ///
    /// Masses are renormalised to sum to exactly one after validation, and
    /// the last cumulative probability is pinned to 1.
    ///
    /// # Errors
    /// [`norta_core::Error::InvalidMarginal`] when the table has fewer than
    /// two points, the support is not strictly increasing, masses are
    /// negative or do not sum to 1 within [`MASS_TOLERANCE`], or `F(X)` is
    /// degenerate.
    pub fn new(support: Vec<Real>, mass: Vec<Real>) -> Result<Self> {
        ensure_marginal!(
            support.len() >= 2,
            "at least 2 support points are required, got {}",
            support.len()
        );
        ensure_marginal!(
            support.len() == mass.len(),
            "support has {} points but mass has {}",
            support.len(),
            mass.len()
        );
        ensure_marginal!(
            support.iter().all(|x| x.is_finite()),
            "support points must be finite"
        );
        if let Some(i) = support.windows(2).position(|w| w[1] <= w[0]) {
            return Err(norta_core::Error::InvalidMarginal(format!(
                "support must be strictly increasing: x[{}] = {} >= x[{}] = {}",
                i,
                support[i],
                i + 1,
                support[i + 1]
            )));
        }
        ensure_marginal!(
            mass.iter().all(|p| p.is_finite() && *p >= 0.0),
            "masses must be finite and non-negative"
        );
        let total: Real = mass.iter().sum();
        ensure_marginal!(
            (total - 1.0).abs() <= MASS_TOLERANCE,
            "masses sum to {total}, expected 1"
        );

        let mass: Vec<Real> = mass.into_iter().map(|p| p / total).collect();
        let mut cdf = Vec::with_capacity(mass.len());
        let mut acc = 0.0;
        for &p in &mass {
            acc += p;
            cdf.push(acc.min(1.0));
        }
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        let (mean_f, sd_f) = moments(&mass, &cdf);
        let (mean_x, sd_x) = moments(&mass, &support);
        ensure_marginal!(
            sd_f > 0.0,
            "distribution is degenerate: all mass sits on one support point"
        );

        Ok(Self {
            support,
            mass,
            cdf,
            mean_f,
            sd_f,
            mean_x,
            sd_x,
        })
    }

    /// Tabulate a distribution on the non-negative integers, truncated at
    /// the first `k` with `F(k) >= truncation_quantile`.
    ///
    /// The tail mass `1 − Σ_{i<k} p(i)` is folded onto `k`.
    pub fn from_distribution<D>(dist: &D, truncation_quantile: Real) -> Result<Self>
    where
        D: Discrete<u64, f64> + DiscreteCDF<u64, f64>,
    {
        ensure!(
            truncation_quantile > 0.0 && truncation_quantile < 1.0,
            "truncation quantile must lie in (0, 1), got {truncation_quantile}"
        );
        let mut support = Vec::new();
        let mut mass = Vec::new();
        let mut k: u64 = 0;
        loop {
            ensure_marginal!(
                support.len() < MAX_SUPPORT_POINTS,
                "support exceeds {MAX_SUPPORT_POINTS} points before reaching quantile \
                 {truncation_quantile}"
            );
            support.push(k as Real);
            mass.push(dist.pmf(k));
            if dist.cdf(k) >= truncation_quantile {
                break;
            }
            k += 1;
        }
        let head: Real = mass[..mass.len() - 1].iter().sum();
        if let Some(last) = mass.last_mut() {
            *last = (1.0 - head).max(0.0);
        }
        Self::new(support, mass)
    }

    /// Number of support points.
    pub fn len(&self) -> usize {
        self.support.len()
    }

    /// Always `false`: a valid table has at least two points.
    pub fn is_empty(&self) -> bool {
        self.support.is_empty()
    }

    /// Support points, strictly increasing.
    pub fn support(&self) -> &[Real] {
        &self.support
    }

    /// Probability masses.
    pub fn mass(&self) -> &[Real] {
        &self.mass
    }

    /// Cumulative probabilities `F(x_i)`; the last entry is exactly 1.
    pub fn cdf(&self) -> &[Real] {
        &self.cdf
    }

    /// Mean of `F(X)`.
    pub fn mean_f(&self) -> Real {
        self.mean_f
    }

    /// Standard deviation of `F(X)`.
    pub fn sd_f(&self) -> Real {
        self.sd_f
    }

    /// Mean of `X`.
    pub fn mean_x(&self) -> Real {
        self.mean_x
    }

    /// Standard deviation of `X`.
    pub fn sd_x(&self) -> Real {
        self.sd_x
    }

    /// Per-point scores whose cross-moment the functional computes: `F(x_i)`
    /// for rank targets, `x_i` for linear ones.
    pub fn scores(&self, kind: CorrelationKind) -> &[Real] {
        match kind {
            CorrelationKind::Rank => &self.cdf,
            CorrelationKind::Linear => &self.support,
        }
    }

    /// Mean and standard deviation of the scores.
    pub fn score_moments(&self, kind: CorrelationKind) -> (Real, Real) {
        match kind {
            CorrelationKind::Rank => (self.mean_f, self.sd_f),
            CorrelationKind::Linear => (self.mean_x, self.sd_x),
        }
    }
}

/// Two-pass mean and standard deviation of `values` under `mass`.
fn moments(mass: &[Real], values: &[Real]) -> (Real, Real) {
    let mean: Real = mass.iter().zip(values).map(|(p, x)| p * x).sum();
    let var: Real = mass
        .iter()
        .zip(values)
        .map(|(p, x)| p * (x - mean) * (x - mean))
        .sum();
    (mean, var.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use norta_core::Error;
    use statrs::distribution::{NegativeBinomial, Poisson};

    #[test]
    fn bernoulli_moments() {
        let t = MarginalTable::new(vec![0.0, 1.0], vec![0.3, 0.7]).unwrap();
        assert_eq!(t.cdf(), &[0.3, 1.0]);
        // F(X) takes 0.3 w.p. 0.3 and 1.0 w.p. 0.7
        assert_abs_diff_eq!(t.mean_f(), 0.09 + 0.7, epsilon = 1e-15);
        assert_abs_diff_eq!(t.sd_f(), (0.21_f64 * 0.49).sqrt(), epsilon = 1e-15);
        assert_abs_diff_eq!(t.mean_x(), 0.7, epsilon = 1e-15);
        assert_abs_diff_eq!(t.sd_x(), 0.21_f64.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn scores_follow_kind() {
        let t = MarginalTable::new(vec![2.0, 5.0, 9.0], vec![0.2, 0.5, 0.3]).unwrap();
        assert_eq!(t.scores(CorrelationKind::Linear), &[2.0, 5.0, 9.0]);
        assert_eq!(t.scores(CorrelationKind::Rank), t.cdf());
        assert_eq!(t.score_moments(CorrelationKind::Linear), (t.mean_x(), t.sd_x()));
    }

    #[test]
    fn rejects_short_support() {
        let err = MarginalTable::new(vec![1.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidMarginal(_)), "{err}");
    }

    #[test]
    fn rejects_unsorted_support() {
        let err = MarginalTable::new(vec![0.0, 2.0, 2.0], vec![0.2, 0.3, 0.5]).unwrap_err();
        assert!(matches!(err, Error::InvalidMarginal(_)));
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn rejects_bad_mass() {
        assert!(matches!(
            MarginalTable::new(vec![0.0, 1.0], vec![0.5, 0.6]),
            Err(Error::InvalidMarginal(_))
        ));
        assert!(matches!(
            MarginalTable::new(vec![0.0, 1.0], vec![-0.1, 1.1]),
            Err(Error::InvalidMarginal(_))
        ));
        assert!(matches!(
            MarginalTable::new(vec![0.0, 1.0], vec![0.5]),
            Err(Error::InvalidMarginal(_))
        ));
    }

    #[test]
    fn rejects_degenerate() {
        let err = MarginalTable::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidMarginal(_)));
    }

    #[test]
    fn renormalises_within_tolerance() {
        let t = MarginalTable::new(vec![0.0, 1.0], vec![0.5, 0.5 + 1e-10]).unwrap();
        assert_abs_diff_eq!(t.mass().iter().sum::<Real>(), 1.0, epsilon = 1e-15);
        assert_eq!(*t.cdf().last().unwrap(), 1.0);
    }

    #[test]
    fn poisson_truncation() {
        let d = Poisson::new(3.0).unwrap();
        let t = MarginalTable::from_distribution(&d, 1.0 - 1e-6).unwrap();
        let k = t.len() - 1;
        assert!(d.cdf(k as u64) >= 1.0 - 1e-6);
        assert!(d.cdf(k as u64 - 1) < 1.0 - 1e-6);
        assert_abs_diff_eq!(t.mean_x(), 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(t.mass().iter().sum::<Real>(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn negative_binomial_truncation() {
        let d = NegativeBinomial::new(15.68, 0.3861).unwrap();
        let t = MarginalTable::from_distribution(&d, 1.0 - 1e-6).unwrap();
        assert_eq!(t.len(), 80);
        assert_abs_diff_eq!(t.mean_x(), 15.68 * (1.0 - 0.3861) / 0.3861, epsilon = 1e-3);
    }

    #[test]
    fn truncation_quantile_is_validated() {
        let d = Poisson::new(3.0).unwrap();
        assert!(MarginalTable::from_distribution(&d, 1.0).is_err());
        assert!(MarginalTable::from_distribution(&d, 0.0).is_err());
    }
}
