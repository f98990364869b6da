//! Calibration options.

use norta_core::{Real, Result, Size};

/// Knobs of a calibration.  Every field has a default; use the `with_*`
/// setters to override them and [`CalibrationOptions::validate`] before use.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationOptions {
    /// Tail quantile at which unbounded supports are truncated.
    pub truncation_quantile: Real,
    /// Bracket half-width at which the deterministic solver stops.
    pub root_tolerance: Real,
    /// Residual (correlation units) at which the deterministic solver stops.
    pub residual_tolerance: Real,
    /// Iteration cap of the deterministic solver.
    pub max_iterations: Size,
    /// The search bracket is `[-1 + ε, 1 − ε]`.
    pub bracket_epsilon: Real,

    /// Samples per Monte Carlo batch.
    pub monte_carlo_sample_size: Size,
    /// Number of stochastic-approximation steps, one batch each.
    pub monte_carlo_batches: Size,
    /// Base seed of the Monte Carlo streams.
    pub seed: u64,
    /// Step gain `a0` in `a_k = a0 / (k + c)`.
    pub step_gain: Real,
    /// Step offset `c` in `a_k = a0 / (k + c)`.
    pub step_offset: Real,
    /// Fraction of the last iterates averaged into the estimate.
    pub averaging_fraction: Real,
    /// Standard error of ρ above which a precision warning is raised.
    pub max_standard_error: Real,

    /// Largest `|Δρ|` the NI2b cache corrects instead of recomputing.
    pub max_correction_step: Real,
    /// Largest per-step NI2b correction error, in correlation units.
    pub step_error_bound: Real,
    /// Largest accumulated NI2b drift, in correlation units.
    pub drift_bound: Real,
    /// NI2b recomputes fully after this many consecutive corrections.
    pub refresh_interval: Size,

    /// `Auto` picks NI1 up to this many cells.
    pub ni1_cell_limit: Size,
    /// `Auto` picks NI2a up to this many cells and NI3 beyond.
    pub exact_cell_limit: Size,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            truncation_quantile: 1.0 - 1e-6,
            root_tolerance: 1e-9,
            residual_tolerance: 1e-12,
            max_iterations: 100,
            bracket_epsilon: 1e-9,
            monte_carlo_sample_size: 10_000,
            monte_carlo_batches: 200,
            seed: 42,
            step_gain: 1.0,
            step_offset: 1.0,
            averaging_fraction: 0.5,
            max_standard_error: 1e-2,
            max_correction_step: 0.05,
            step_error_bound: 1e-10,
            drift_bound: 1e-8,
            refresh_interval: 8,
            ni1_cell_limit: 400,
            exact_cell_limit: 250_000,
        }
    }
}

macro_rules! setters {
    ($($(#[$doc:meta])* $name:ident => $field:ident: $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, value: $ty) -> Self {
                self.$field = value;
                self
            }
        )*
    };
}

impl CalibrationOptions {
    setters! {
        /// Set the truncation quantile.
        with_truncation_quantile => truncation_quantile: Real;
        /// Set the root tolerance.
        with_root_tolerance => root_tolerance: Real;
        /// Set the residual tolerance.
        with_residual_tolerance => residual_tolerance: Real;
        /// Set the deterministic iteration cap.
        with_max_iterations => max_iterations: Size;
        /// Set the bracket epsilon.
        with_bracket_epsilon => bracket_epsilon: Real;
        /// Set the Monte Carlo batch size.
        with_monte_carlo_sample_size => monte_carlo_sample_size: Size;
        /// Set the number of Monte Carlo batches.
        with_monte_carlo_batches => monte_carlo_batches: Size;
        /// Set the base seed.
        with_seed => seed: u64;
        /// Set the step gain.
        with_step_gain => step_gain: Real;
        /// Set the step offset.
        with_step_offset => step_offset: Real;
        /// Set the averaged fraction of iterates.
        with_averaging_fraction => averaging_fraction: Real;
        /// Set the standard-error warning threshold.
        with_max_standard_error => max_standard_error: Real;
        /// Set the largest corrected NI2b step.
        with_max_correction_step => max_correction_step: Real;
        /// Set the NI2b per-step error bound.
        with_step_error_bound => step_error_bound: Real;
        /// Set the NI2b drift bound.
        with_drift_bound => drift_bound: Real;
        /// Set the NI2b refresh interval.
        with_refresh_interval => refresh_interval: Size;
        /// Set the NI1 cell limit of `Auto`.
        with_ni1_cell_limit => ni1_cell_limit: Size;
        /// Set the exact-strategy cell limit of `Auto`.
        with_exact_cell_limit => exact_cell_limit: Size;
    }

    /// Check that every option is in range.
    ///
    /// # Errors
    /// [`norta_core::Error::InvalidArgument`] naming the first offending
    /// option.
    pub fn validate(&self) -> Result<()> {
        let open_unit = |x: Real| x > 0.0 && x < 1.0;
        let positive = |x: Real| x.is_finite() && x > 0.0;
        check(
            open_unit(self.truncation_quantile),
            "truncation_quantile",
            "must lie in (0, 1)",
        )?;
        check(positive(self.root_tolerance), "root_tolerance", "must be positive")?;
        check(
            self.residual_tolerance.is_finite() && self.residual_tolerance >= 0.0,
            "residual_tolerance",
            "must be non-negative",
        )?;
        check(self.max_iterations > 0, "max_iterations", "must be positive")?;
        check(
            self.bracket_epsilon > 0.0 && self.bracket_epsilon < 0.5,
            "bracket_epsilon",
            "must lie in (0, 0.5)",
        )?;
        check(
            self.monte_carlo_sample_size >= 2,
            "monte_carlo_sample_size",
            "must be at least 2",
        )?;
        check(
            self.monte_carlo_batches > 0,
            "monte_carlo_batches",
            "must be positive",
        )?;
        check(positive(self.step_gain), "step_gain", "must be positive")?;
        check(positive(self.step_offset), "step_offset", "must be positive")?;
        check(
            self.averaging_fraction > 0.0 && self.averaging_fraction <= 1.0,
            "averaging_fraction",
            "must lie in (0, 1]",
        )?;
        check(
            positive(self.max_standard_error),
            "max_standard_error",
            "must be positive",
        )?;
        check(
            positive(self.max_correction_step),
            "max_correction_step",
            "must be positive",
        )?;
        check(
            positive(self.step_error_bound),
            "step_error_bound",
            "must be positive",
        )?;
        check(positive(self.drift_bound), "drift_bound", "must be positive")?;
        check(
            self.refresh_interval > 0,
            "refresh_interval",
            "must be positive",
        )?;
        check(
            self.ni1_cell_limit <= self.exact_cell_limit,
            "ni1_cell_limit",
            "must not exceed exact_cell_limit",
        )
    }
}

fn check(ok: bool, name: &str, requirement: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(norta_core::Error::InvalidArgument(format!(
            "option `{name}` {requirement}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use norta_core::Error;

    #[test]
    fn defaults_are_valid() {
        let o = CalibrationOptions::default();
        o.validate().unwrap();
        assert_eq!(o.max_iterations, 100);
        assert_eq!(o.seed, 42);
        assert_eq!(o.ni1_cell_limit, 400);
    }

    #[test]
    fn setters_chain() {
        let o = CalibrationOptions::default()
            .with_seed(7)
            .with_monte_carlo_batches(50)
            .with_root_tolerance(1e-6);
        assert_eq!(o.seed, 7);
        assert_eq!(o.monte_carlo_batches, 50);
        assert_eq!(o.root_tolerance, 1e-6);
    }

    #[test]
    fn invalid_values_are_named() {
        let err = CalibrationOptions::default()
            .with_truncation_quantile(1.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("truncation_quantile")));

        let err = CalibrationOptions::default()
            .with_averaging_fraction(0.0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("averaging_fraction"));

        assert!(CalibrationOptions::default()
            .with_ni1_cell_limit(10)
            .with_exact_cell_limit(5)
            .validate()
            .is_err());
        assert!(CalibrationOptions::default()
            .with_step_gain(f64::NAN)
            .validate()
            .is_err());
    }
}
