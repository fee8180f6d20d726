//! # Demand Math
//!
//! Numeric building blocks shared by the weekly demand forecasting pipeline:
//! lagged and shifted rolling-window features, summary statistics with the
//! guarded standardization used for sequence inputs, and a bounded
//! Nelder-Mead minimizer used to estimate time series model parameters.

use thiserror::Error;

pub mod moving_averages;
pub mod optimization;
pub mod stats;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
