//! Pairwise calibration of a full correlation matrix.

use crate::calibrator::{Calibration, NortaInitDisc};
use crate::functional::Strategy;
use crate::marginal::{CorrelationKind, MarginalTable};
use crate::options::CalibrationOptions;
use log::{info, warn};
use nalgebra::DMatrix;
use norta_core::{Error, Real, Result};
use rayon::prelude::*;

/// Largest asymmetry `|R_ij − R_ji|` accepted in a target matrix.
pub const SYMMETRY_TOLERANCE: Real = 1e-12;

/// Calibrated normal correlation matrix.
#[derive(Debug, Clone)]
pub struct MatrixCalibration {
    /// Symmetric `ρ_Z` matrix with unit diagonal.
    pub rho: DMatrix<Real>,
    /// Per-pair results for `i < j`, in row-major order.
    pub pairs: Vec<((usize, usize), Calibration)>,
    /// Whether `rho` admits a Cholesky factorisation.  Pairwise calibration
    /// does not guarantee it.
    pub positive_definite: bool,
}

/// Calibrate `ρ_Z` for every pair of `marginals` against `targets`.
///
/// Pairs are independent and are calibrated in parallel.
///
/// # Errors
/// [`Error::InvalidArgument`] when `targets` is not a symmetric
/// `n × n` matrix with unit diagonal for `n = marginals.len()`; otherwise
/// the error of a failing pair.
pub fn calibrate_matrix(
    marginals: &[MarginalTable],
    targets: &DMatrix<Real>,
    kind: CorrelationKind,
    strategy: Strategy,
    options: &CalibrationOptions,
) -> Result<MatrixCalibration> {
    let n = marginals.len();
    if targets.nrows() != n || targets.ncols() != n {
        return Err(Error::InvalidArgument(format!(
            "target matrix is {}x{}, expected {n}x{n}",
            targets.nrows(),
            targets.ncols()
        )));
    }
    for i in 0..n {
        if (targets[(i, i)] - 1.0).abs() > SYMMETRY_TOLERANCE {
            return Err(Error::InvalidArgument(format!(
                "target matrix diagonal entry ({i}, {i}) is {}, expected 1",
                targets[(i, i)]
            )));
        }
        for j in (i + 1)..n {
            if (targets[(i, j)] - targets[(j, i)]).abs() > SYMMETRY_TOLERANCE {
                return Err(Error::InvalidArgument(format!(
                    "target matrix is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    options.validate()?;

    let indices: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    info!("calibrating {} pairs of {n} marginals", indices.len());

    let pairs = indices
        .par_iter()
        .map(|&(i, j)| -> Result<((usize, usize), Calibration)> {
            let norta = NortaInitDisc::new(&marginals[i], &marginals[j], kind, options.clone())?;
            let calibration = norta.compute_rho(targets[(i, j)], strategy)?;
            Ok(((i, j), calibration))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rho = DMatrix::<Real>::identity(n, n);
    for ((i, j), c) in &pairs {
        rho[(*i, *j)] = c.rho;
        rho[(*j, *i)] = c.rho;
    }
    let positive_definite = rho.clone().cholesky().is_some();
    if !positive_definite {
        warn!("calibrated normal correlation matrix is not positive definite");
    }

    Ok(MatrixCalibration {
        rho,
        pairs,
        positive_definite,
    })
}
