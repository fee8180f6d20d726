//! Summary statistics and standardization

use crate::{MathError, Result};
use statrs::statistics::Statistics;

/// Standard deviations at or below this value are treated as degenerate.
pub const MIN_STD_DEV: f64 = 1e-6;

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take the mean of an empty series".to_string(),
        ));
    }

    Ok(values.iter().mean())
}

/// Sample standard deviation (n - 1 denominator).
///
/// Returns `None` when it is undefined, i.e. for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let sd = values.iter().std_dev();
    sd.is_finite().then_some(sd)
}

/// Location and scale used to standardize a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    /// Mean of the fitted series
    pub mean: f64,
    /// Divisor; 1.0 when the standard deviation is degenerate
    pub scale: f64,
}

impl Scaler {
    /// Fit a scaler on a whole series.
    ///
    /// The scale falls back to 1.0 when the sample standard deviation is
    /// undefined or not above [`MIN_STD_DEV`], so a flat series maps to
    /// `y - mean` rather than blowing up.
    pub fn fit(values: &[f64]) -> Result<Self> {
        let mean = mean(values)?;
        let scale = match sample_std_dev(values) {
            Some(sd) if sd > MIN_STD_DEV => sd,
            _ => 1.0,
        };

        Ok(Self { mean, scale })
    }

    /// Scale a single value
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_and_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(mean(&values).unwrap(), 5.0);
        // Sample variance = 32 / 7
        assert_abs_diff_eq!(sample_std_dev(&values).unwrap(), (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_undefined_std() {
        assert!(mean(&[]).is_err());
        assert_eq!(sample_std_dev(&[3.0]), None);
    }

    #[test]
    fn test_scaler_standardizes() {
        let values = [10.0, 20.0, 30.0];
        let scaler = Scaler::fit(&values).unwrap();

        assert_abs_diff_eq!(scaler.transform(10.0), -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaler.transform(20.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaler.transform(30.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scaler_guard_on_constant_series() {
        let values = [42.0; 6];
        let scaler = Scaler::fit(&values).unwrap();

        assert_eq!(scaler.scale, 1.0);
        assert!(values.iter().all(|&v| scaler.transform(v) == 0.0));
    }

    #[test]
    fn test_scaler_guard_on_single_value() {
        let scaler = Scaler::fit(&[7.0]).unwrap();
        assert_eq!(scaler.scale, 1.0);
        assert_eq!(scaler.transform(9.0), 2.0);
    }
}
