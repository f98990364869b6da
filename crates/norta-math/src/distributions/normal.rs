//! Univariate standard normal distribution.

use norta_core::Real;
use libm::erfc;
use statrs::function::erf::erfc_inv;
use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

/// `1 / √(2π)`.
pub const FRAC_1_SQRT_2PI: Real = 0.398_942_280_401_432_7;

/// The standard normal probability density function.
///
/// `φ(x) = exp(-x²/2) / √(2π)`
#[inline]
pub fn normal_pdf(x: Real) -> Real {
    (-0.5 * x * x).exp() * FRAC_1_SQRT_2PI
}

/// The standard normal cumulative distribution function Φ(x).
///
/// Evaluated through the complementary error function so that both tails
/// keep full relative precision: `Φ(x) = erfc(-x/√2) / 2`, with `libm`'s
/// `erfc` (error below one ulp).  Infinite arguments map to 0 and 1.
#[inline]
pub fn normal_cdf(x: Real) -> Real {
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    if x == f64::INFINITY {
        return 1.0;
    }
    0.5 * erfc(-x * FRAC_1_SQRT_2)
}

/// The inverse standard normal CDF (probit function).
///
/// Starts from `Φ⁻¹(q) = -√2 · erfc⁻¹(2q)` on the lower half
/// `q = min(p, 1 − p)` (where `1 − p` is exact) and takes one Halley step
/// against [`normal_cdf`], so that `normal_cdf(normal_cdf_inverse(p))`
/// reproduces `p` to rounding.  The upper half is mirrored through
/// `Φ⁻¹(p) = -Φ⁻¹(1 − p)`.
///
/// `p <= 0` maps to `-∞` and `p >= 1` to `+∞`; these are the breakpoints of
/// a marginal's first and last cells.
pub fn normal_cdf_inverse(p: Real) -> Real {
    if p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let upper = p > 0.5;
    let q = if upper { 1.0 - p } else { p };
    let x = lower_quantile(q);
    if upper {
        -x
    } else {
        x
    }
}

/// `Φ⁻¹(q)` for `0 < q <= ½`.
fn lower_quantile(q: Real) -> Real {
    let x = -SQRT_2 * erfc_inv(2.0 * q);
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    // Halley step on Φ(x) − q = 0
    let u = (normal_cdf(x) - q) / normal_pdf(x);
    let refined = x - u / (1.0 + 0.5 * x * u);
    if refined.is_finite() {
        refined
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normal_pdf_at_zero() {
        let expected = 1.0 / (2.0 * std::f64::consts::PI).sqrt();
        assert_abs_diff_eq!(normal_pdf(0.0), expected, epsilon = 1e-15);
    }

    #[test]
    fn normal_cdf_at_zero() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn normal_cdf_reference_values() {
        // 30-digit references; the error function must be good to an ulp.
        assert_abs_diff_eq!(normal_cdf(1.0), 0.841_344_746_068_542_9, epsilon = 2e-16);
        assert_abs_diff_eq!(normal_cdf(-1.96), 0.024_997_895_148_220_436, epsilon = 5e-17);
        assert_abs_diff_eq!(normal_cdf(3.0), 0.998_650_101_968_369_9, epsilon = 2e-16);
        let erf_one = 2.0 * normal_cdf(SQRT_2) - 1.0;
        assert_abs_diff_eq!(erf_one, 0.842_700_792_949_714_9, epsilon = 1e-15);
    }

    #[test]
    fn normal_cdf_tails() {
        assert_abs_diff_eq!(normal_cdf(10.0), 1.0, epsilon = 1e-15);
        assert!(normal_cdf(-10.0) < 1e-20);
        assert!(normal_cdf(-10.0) > 0.0);
        assert_eq!(normal_cdf(f64::NEG_INFINITY), 0.0);
        assert_eq!(normal_cdf(f64::INFINITY), 1.0);
    }

    #[test]
    fn inverse_cdf_roundtrip() {
        for p in [1e-12, 1e-6, 0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99, 1.0 - 1e-9] {
            let x = normal_cdf_inverse(p);
            let p2 = normal_cdf(x);
            assert!(((p2 - p) / p).abs() < 1e-12, "p = {p}: Φ(Φ⁻¹(p)) = {p2}");
        }
    }

    #[test]
    fn inverse_cdf_reference_values() {
        assert_abs_diff_eq!(normal_cdf_inverse(0.5), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(normal_cdf_inverse(0.975), 1.959_963_984_540_054, epsilon = 1e-14);
        assert_abs_diff_eq!(normal_cdf_inverse(0.025), -1.959_963_984_540_054, epsilon = 1e-14);
        assert_abs_diff_eq!(normal_cdf_inverse(0.2), -0.841_621_233_572_914_2, epsilon = 1e-15);
        assert_abs_diff_eq!(normal_cdf_inverse(1e-6), -4.753_424_308_822_899, epsilon = 1e-13);
    }

    #[test]
    fn inverse_cdf_inverts_to_rounding() {
        for p in [0.2, 0.3, 0.5, 0.7, 0.95, 1e-3, 0.999] {
            assert_abs_diff_eq!(normal_cdf(normal_cdf_inverse(p)), p, epsilon = 1e-14 * p);
        }
    }

    #[test]
    fn inverse_cdf_endpoints() {
        assert_eq!(normal_cdf_inverse(0.0), f64::NEG_INFINITY);
        assert_eq!(normal_cdf_inverse(1.0), f64::INFINITY);
        assert!(normal_cdf_inverse(f64::NAN).is_nan());
    }
}
