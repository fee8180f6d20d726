//! Window-based series features
//!
//! Contains the streaming Simple Moving Average and the two column
//! transforms built on top of it:
//! - lagged values (`y[t - k]`)
//! - shifted rolling means (mean of the `w` values strictly before `t`)
//!
//! Both transforms return `None` wherever the lookback extends before the
//! start of the series, so callers can drop incomplete rows instead of
//! imputing them.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) implementation
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Update the SMA with a new value
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }
    }

    /// Get the current SMA value
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for SMA calculation. Need {} values, have {}.",
                self.period,
                self.values.len()
            )));
        }

        Ok(self.sum / self.period as f64)
    }

    /// Whether a full window has been observed
    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.period
    }
}

/// Value `lag` positions back for every index, `None` before the series start.
pub fn lagged(values: &[f64], lag: usize) -> Result<Vec<Option<f64>>> {
    if lag == 0 {
        return Err(MathError::InvalidInput(
            "Lag must be greater than zero".to_string(),
        ));
    }

    Ok((0..values.len())
        .map(|i| i.checked_sub(lag).map(|j| values[j]))
        .collect())
}

/// Rolling mean of the `window` values preceding each index.
///
/// The current value is never part of its own window: index `t` sees
/// `values[t - window..t]`. Indices with fewer than `window` predecessors
/// are `None`.
pub fn rolling_mean_shifted(values: &[f64], window: usize) -> Result<Vec<Option<f64>>> {
    let mut sma = SimpleMovingAverage::new(window)?;
    let mut result = Vec::with_capacity(values.len());

    for &value in values {
        result.push(if sma.is_ready() { Some(sma.value()?) } else { None });
        sma.update(value);
    }

    Ok(result)
}
