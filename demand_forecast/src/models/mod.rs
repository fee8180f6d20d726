//! Model adapters
//!
//! Every model family implements the same pair of traits: a
//! [`ForecastModel`] is fitted on the train rows of its windowing strategy
//! and yields a [`TrainedForecastModel`] that forecasts the test rows.
//! [`forecast_split`] runs that cycle and turns the forecasts into
//! [`PredictionRow`]s, so the evaluator never needs to know which model
//! produced them.

use crate::error::{ForecastError, Result};
use crate::predictions::PredictionRow;
use crate::windows::{Split, WindowRow};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use tracing::info;

pub mod gbm;
pub mod lstm;
pub mod sarimax;

pub use gbm::{GbmAdapter, GbmParams};
pub use lstm::{LstmAdapter, LstmParams};
pub use sarimax::{SarimaxAdapter, SarimaxParams};

/// The three model families compared by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Per-region ARIMAX with the SNAP and event regressors
    Sarimax,
    /// Global Poisson gradient-boosted trees on lag features
    Lgbm,
    /// Global LSTM on scaled lookback windows
    Lstm,
}

impl ModelKind {
    /// All models, in reporting order
    pub const ALL: [ModelKind; 3] = [ModelKind::Sarimax, ModelKind::Lgbm, ModelKind::Lstm];

    /// Short name used in file and column names
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Sarimax => "sarimax",
            ModelKind::Lgbm => "lgbm",
            ModelKind::Lstm => "lstm",
        }
    }

    /// Name of the forecast column in prediction tables
    pub fn forecast_column(&self) -> String {
        format!("yhat_{}", self.as_str())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point forecasts, aligned positionally with the rows they were made for
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    values: Vec<f64>,
}

impl ForecastResult {
    /// Create a result, checking it covers exactly `horizon` rows
    pub fn new(values: Vec<f64>, horizon: usize) -> Result<Self> {
        if values.len() != horizon {
            return Err(ForecastError::ModelFitError(format!(
                "Values length ({}) doesn't match horizon ({})",
                values.len(),
                horizon
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFitError(format!(
                "forecast contains a non-finite value ({})",
                bad
            )));
        }

        Ok(Self { values })
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of forecasts
    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    /// Forecasts with negative values clipped to zero
    pub fn non_negative(self) -> Vec<f64> {
        self.values.into_iter().map(|v| v.max(0.0)).collect()
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Row type the model forecasts
    type Row;

    /// Forecast every test row, in the order given
    fn predict(&self, test: &[Self::Row]) -> Result<ForecastResult>;
}

/// Forecast model that can be fitted on train rows
pub trait ForecastModel: Debug {
    /// Row type produced by the model's windowing strategy
    type Row: WindowRow;
    /// The type of trained model produced
    type Trained: TrainedForecastModel<Row = Self::Row>;

    /// Which family this model belongs to
    fn kind(&self) -> ModelKind;

    /// Fit on the train rows
    fn fit(&self, train: &[Self::Row]) -> Result<Self::Trained>;
}

/// Fit on the train split, forecast the test split and attach the keys.
///
/// Forecasts are clipped to be non-negative.
pub fn forecast_split<M: ForecastModel>(
    model: &M,
    split: &Split<M::Row>,
) -> Result<Vec<PredictionRow>> {
    if split.train.is_empty() {
        return Err(ForecastError::ModelFitError(format!(
            "{} received an empty train split",
            model.kind()
        )));
    }

    let trained = model.fit(&split.train)?;
    let forecast = trained.predict(&split.test)?;
    if forecast.horizon() != split.test.len() {
        return Err(ForecastError::ModelFitError(format!(
            "{} produced {} forecasts for {} test rows",
            model.kind(),
            forecast.horizon(),
            split.test.len()
        )));
    }

    let rows = split
        .test
        .iter()
        .zip(forecast.non_negative())
        .map(|(row, yhat)| PredictionRow::new(row.key(), row.target(), yhat))
        .collect::<Vec<_>>();

    info!(
        model = %model.kind(),
        train = split.train.len(),
        test = rows.len(),
        "forecast test split"
    );
    Ok(rows)
}

/// Group row indices by region, keeping first-seen region order and row order
pub(crate) fn indices_by_region<R: WindowRow>(rows: &[R]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match groups.iter_mut().find(|(region, _)| region == row.region_id()) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((row.region_id().to_string(), vec![i])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(ModelKind::Sarimax.as_str(), "sarimax");
        assert_eq!(ModelKind::Lgbm.forecast_column(), "yhat_lgbm");
        assert_eq!(ModelKind::Lstm.to_string(), "lstm");
    }

    #[test]
    fn test_forecast_result_checks() {
        assert!(ForecastResult::new(vec![1.0, 2.0], 3).is_err());
        assert!(ForecastResult::new(vec![1.0, f64::NAN], 2).is_err());

        let result = ForecastResult::new(vec![-3.0, 2.5], 2).unwrap();
        assert_eq!(result.horizon(), 2);
        assert_eq!(result.non_negative(), vec![0.0, 2.5]);
    }
}
