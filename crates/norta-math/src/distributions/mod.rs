//! Normal distributions used by the correlation-matching engine.
//!
//! The univariate CDF uses `libm`'s `erfc` and the quantile starts from
//! `statrs`' `erfc_inv`;
//! the bivariate CDF is evaluated by Gauss–Legendre quadrature.

pub mod bivariate_normal;
pub mod normal;

pub use bivariate_normal::{
    bivariate_normal_cdf, bivariate_normal_pdf, bivariate_normal_pdf_drho,
};
pub use normal::{normal_cdf, normal_cdf_inverse, normal_pdf};
