//! Aggregate accuracy metrics
//!
//! Both metrics normalize by aggregate actual volume. When the actual
//! volume is exactly zero the denominator becomes 1, so an all-zero region
//! reports the raw error sum instead of failing.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

fn check_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "actual ({}) and forecast ({}) must have the same length",
            y_true.len(),
            y_pred.len()
        )));
    }
    Ok(())
}

fn guarded(denominator: f64) -> f64 {
    if denominator == 0.0 {
        1.0
    } else {
        denominator
    }
}

/// Weighted absolute percentage error: `Σ|y - ŷ| / Σ|y|`
pub fn wape(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let error: f64 = y_true.iter().zip(y_pred).map(|(y, p)| (y - p).abs()).sum();
    let volume: f64 = y_true.iter().map(|y| y.abs()).sum();
    Ok(error / guarded(volume))
}

/// Signed aggregate error: `Σ(ŷ - y) / Σy`. Positive means over-forecasting.
pub fn bias(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let error: f64 = y_true.iter().zip(y_pred).map(|(y, p)| p - y).sum();
    let volume: f64 = y_true.iter().sum();
    Ok(error / guarded(volume))
}

/// WAPE and bias of one forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub wape: f64,
    pub bias: f64,
}

impl ForecastMetrics {
    /// Compute both metrics
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        Ok(Self {
            wape: wape(y_true, y_pred)?,
            bias: bias(y_true, y_pred)?,
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WAPE: {:.4}, Bias: {:+.4}", self.wape, self.bias)
    }
}
