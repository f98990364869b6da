//! 1D root-finding solvers.
//!
//! The objective is `FnMut` and fallible: each evaluation of the correlation
//! functional may update a strategy's cache and may fail.  The solver reports
//! the iteration count and final residual instead of only the root so that
//! callers can surface convergence diagnostics.

use norta_core::Real;

const DEFAULT_ACCURACY: Real = 1.0e-11;

/// A bracket `[x_min, x_max]` with the objective already evaluated at both
/// ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    /// Lower end.
    pub x_min: Real,
    /// `f(x_min)`.
    pub f_min: Real,
    /// Upper end.
    pub x_max: Real,
    /// `f(x_max)`.
    pub f_max: Real,
}

impl Bracket {
    /// Whether the objective changes sign (or vanishes) across the bracket.
    pub fn straddles_root(&self) -> bool {
        self.f_min * self.f_max <= 0.0
    }
}

/// Result of a solver run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOutcome {
    /// Final iterate.
    pub root: Real,
    /// Objective value at `root`.
    pub value: Real,
    /// Number of objective evaluations after the bracket evaluations.
    pub iterations: usize,
    /// Whether a tolerance was met before the iteration cap.
    pub converged: bool,
}

/// Brent's method: bisection, secant and inverse quadratic interpolation on
/// a sign-changing bracket.
///
/// Stops when `|f(x)| <= residual_accuracy` or the bracket half-width drops
/// below `accuracy`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brent {
    accuracy: Real,
    residual_accuracy: Real,
    max_iterations: usize,
}

impl Default for Brent {
    fn default() -> Self {
        Self {
            accuracy: DEFAULT_ACCURACY,
            residual_accuracy: 0.0,
            max_iterations: 100,
        }
    }
}

impl Brent {
    /// Create a solver with the given abscissa accuracy, residual accuracy
    /// and iteration cap.  Non-positive `accuracy` falls back to `1e-11`.
    pub fn new(accuracy: Real, residual_accuracy: Real, max_iterations: usize) -> Self {
        Self {
            accuracy: if accuracy > 0.0 {
                accuracy
            } else {
                DEFAULT_ACCURACY
            },
            residual_accuracy: residual_accuracy.max(0.0),
            max_iterations,
        }
    }

    /// Abscissa accuracy.
    pub fn accuracy(&self) -> Real {
        self.accuracy
    }

    /// Iteration cap.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Find a root of `f` inside `bracket`.
    ///
    /// The bracket must straddle a root; otherwise the returned outcome has
    /// `converged == false` and `iterations == 0`.  Errors from `f` are
    /// propagated unchanged.
    pub fn solve<F, E>(&self, mut f: F, bracket: Bracket) -> Result<SolverOutcome, E>
    where
        F: FnMut(Real) -> Result<Real, E>,
    {
        let Bracket {
            x_min: mut a,
            f_min: mut fa,
            x_max: mut b,
            f_max: mut fb,
        } = bracket;

        if !bracket.straddles_root() {
            let (root, value) = if fa.abs() < fb.abs() { (a, fa) } else { (b, fb) };
            return Ok(SolverOutcome {
                root,
                value,
                iterations: 0,
                converged: false,
            });
        }
        if fa == 0.0 {
            return Ok(SolverOutcome {
                root: a,
                value: fa,
                iterations: 0,
                converged: true,
            });
        }
        if fb == 0.0 {
            return Ok(SolverOutcome {
                root: b,
                value: fb,
                iterations: 0,
                converged: true,
            });
        }

        let mut c = b;
        let mut fc = fb;
        let mut d = b - a;
        let mut e = d;

        for iteration in 0..=self.max_iterations {
            if fb * fc > 0.0 {
                c = a;
                fc = fa;
                d = b - a;
                e = d;
            }
            if fc.abs() < fb.abs() {
                a = b;
                b = c;
                c = a;
                fa = fb;
                fb = fc;
                fc = fa;
            }
            let tol = 2.0 * f64::EPSILON * b.abs() + 0.5 * self.accuracy;
            let xm = 0.5 * (c - b);
            if xm.abs() <= tol || fb.abs() <= self.residual_accuracy {
                return Ok(SolverOutcome {
                    root: b,
                    value: fb,
                    iterations: iteration,
                    converged: true,
                });
            }
            if iteration == self.max_iterations {
                break;
            }
            if e.abs() >= tol && fa.abs() > fb.abs() {
                let s = fb / fa;
                let (p, q) = if a == c {
                    (2.0 * xm * s, 1.0 - s)
                } else {
                    let q = fa / fc;
                    let r = fb / fc;
                    let p = s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0));
                    let q = (q - 1.0) * (r - 1.0) * (s - 1.0);
                    (p, q)
                };
                let (p, q) = if p > 0.0 { (p, -q) } else { (-p, q) };
                if 2.0 * p < (3.0 * xm * q - (tol * q).abs()) && 2.0 * p < (e * q).abs() {
                    e = d;
                    d = p / q;
                } else {
                    d = xm;
                    e = d;
                }
            } else {
                d = xm;
                e = d;
            }
            a = b;
            fa = fb;
            b += if d.abs() > tol {
                d
            } else if xm > 0.0 {
                tol
            } else {
                -tol
            };
            fb = f(b)?;
        }
        Ok(SolverOutcome {
            root: b,
            value: fb,
            iterations: self.max_iterations,
            converged: false,
        })
    }
}
