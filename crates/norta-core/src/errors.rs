//! Error types for norta-rs.
//!
//! Every failure a calibration can hit is a variant of the single
//! `thiserror`-derived [`Error`] enum.  The `ensure!` and `ensure_marginal!`
//! macros cover the common early-return checks.

use thiserror::Error;

/// The top-level error type used throughout norta-rs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Precondition violated.
    #[error("precondition not satisfied: {0}")]
    Precondition(String),

    /// A discrete marginal table failed validation.
    #[error("invalid marginal: {0}")]
    InvalidMarginal(String),

    /// The target correlation lies outside the range the marginals can
    /// attain under a normal copula.
    #[error(
        "target correlation {target} is not attainable; attainable range is [{min}, {max}]"
    )]
    UnachievableCorrelation {
        /// The requested correlation.
        target: f64,
        /// Correlation obtained with ρ_Z → −1.
        min: f64,
        /// Correlation obtained with ρ_Z → +1.
        max: f64,
    },

    /// The deterministic root finder hit its iteration cap.
    #[error(
        "root finder did not converge after {iterations} iterations \
         (last rho = {rho}, residual = {residual:e})"
    )]
    NonConvergence {
        /// Number of iterations performed.
        iterations: usize,
        /// Last iterate.
        rho: f64,
        /// Residual at the last iterate, in correlation units.
        residual: f64,
    },

    /// Invalid argument (options, targets, indices).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Shorthand `Result` type used throughout norta-rs.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Returns `Err(Error::Precondition(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use norta_core::{ensure, errors::Error};
/// fn positive(x: f64) -> norta_core::errors::Result<f64> {
///     ensure!(x > 0.0, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Precondition(
                format!($($msg)*)
            ));
        }
    };
}

/// Returns `Err(Error::InvalidMarginal(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use norta_core::{ensure_marginal, errors::Error};
/// fn check(points: usize) -> norta_core::errors::Result<()> {
///     ensure_marginal!(points >= 2, "need at least 2 support points, got {points}");
///     Ok(())
/// }
/// assert!(check(3).is_ok());
/// assert!(matches!(check(1), Err(Error::InvalidMarginal(_))));
/// ```
#[macro_export]
macro_rules! ensure_marginal {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::InvalidMarginal(
                format!($($msg)*)
            ));
        }
    };
}
