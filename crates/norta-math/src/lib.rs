//! # norta-math
//!
//! Mathematical building blocks for norta-rs: univariate and bivariate
//! normal distributions (error function via libm and statrs), a bracketing 1D root
//! solver, random number generation, and statistics accumulators.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Normal distributions.
pub mod distributions;

/// Random number generators.
pub mod random_numbers;

/// 1D root-finding solvers.
pub mod solvers1d;

/// Statistics accumulators.
pub mod statistics;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use distributions::{
    bivariate_normal_cdf, bivariate_normal_pdf, bivariate_normal_pdf_drho, normal_cdf,
    normal_cdf_inverse, normal_pdf,
};
pub use statistics::Statistics;
