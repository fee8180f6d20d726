//! Error types for the demand_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Run configuration that cannot work with the data at hand
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Keys that fail to line up between or within stages
    #[error("Alignment error: {0}")]
    AlignmentError(String),

    /// A model adapter failed to fit or to forecast
    #[error("Model fit error: {0}")]
    ModelFitError(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from numeric helpers
    #[error("Math error: {0}")]
    MathError(#[from] demand_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from JSON reading or writing
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl ForecastError {
    /// A region does not have enough usable rows for the held-out window
    pub fn insufficient_history(region: &str, needed: usize, available: usize) -> Self {
        ForecastError::ConfigurationError(format!(
            "region '{}' has {} usable rows, needs at least {}",
            region, available, needed
        ))
    }
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::JsonError(err.to_string())
    }
}
