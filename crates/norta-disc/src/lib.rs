//! # norta-disc
//!
//! NORTA initialisation for discrete marginals: find the correlation `ρ_Z`
//! of a standard bivariate normal that, pushed through the marginal
//! quantile functions, reproduces a target rank or linear correlation.
//!
//! The pipeline is
//!
//! 1. [`MarginalTable`]: validated support, masses and moments;
//! 2. [`BreakpointGrid`]: normal-quantile breakpoints of both marginals;
//! 3. a [`CorrelationFunctional`] strategy evaluating `g(ρ)` over the grid;
//! 4. a root finder (Brent, or stochastic approximation for Monte Carlo);
//!
//! all driven by [`NortaInitDisc`] / [`compute_rho`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Calibration façade.
pub mod calibrator;

/// Correlation functional strategies.
pub mod functional;

/// Normal-quantile breakpoint grid.
pub mod grid;

/// Discrete marginal tables.
pub mod marginal;

/// Pairwise calibration of correlation matrices.
pub mod matrix;

/// Calibration options.
pub mod options;

/// Deterministic and stochastic root finders.
pub mod solver;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use calibrator::{compute_rho, Calibration, NortaInitDisc};
pub use functional::{CorrelationFunctional, Evaluation, PrecisionWarning, Strategy};
pub use grid::BreakpointGrid;
pub use marginal::{CorrelationKind, MarginalTable};
pub use matrix::{calibrate_matrix, MatrixCalibration};
pub use options::CalibrationOptions;
