//! # norta
//!
//! NORTA ("NORmal To Anything") initialisation for pairs of discrete
//! marginal distributions.
//!
//! Given two discrete marginals and a target rank or linear correlation, the
//! library finds the correlation `ρ_Z` of a standard bivariate normal such
//! that `(F1⁻¹(Φ(Z1)), F2⁻¹(Φ(Z2)))` reproduces the target.
//!
//! This crate is a **façade** that re-exports all public items from the
//! underlying workspace crates. Application code should depend on this
//! crate rather than the individual `norta-*` crates.
//!
//! ## Quick start
//!
//! ```toml
//! [dependencies]
//! norta = "0.1"
//! ```
//!
//! ```rust
//! use norta::{compute_rho, CalibrationOptions, CorrelationKind, MarginalTable, Strategy};
//!
//! let m1 = MarginalTable::new(vec![0.0, 1.0, 2.0], vec![0.2, 0.5, 0.3]).unwrap();
//! let m2 = MarginalTable::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.1, 0.4, 0.4, 0.1]).unwrap();
//! let c = compute_rho(
//!     &m1,
//!     &m2,
//!     0.3,
//!     CorrelationKind::Rank,
//!     Strategy::Auto,
//!     &CalibrationOptions::default(),
//! )
//! .unwrap();
//! assert!(c.rho > 0.3);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, and error definitions.
pub use norta_core as core;

/// Normal distributions, root solvers, RNG and statistics.
pub use norta_math as math;

/// Marginal tables, correlation functionals and calibration.
pub use norta_disc as disc;

pub use norta_core::{Error, Real, Result};
pub use norta_disc::{
    calibrate_matrix, compute_rho, BreakpointGrid, Calibration, CalibrationOptions,
    CorrelationFunctional, CorrelationKind, Evaluation, MarginalTable, MatrixCalibration,
    NortaInitDisc, PrecisionWarning, Strategy,
};
