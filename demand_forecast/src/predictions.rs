//! Per-model prediction tables
//!
//! Every model writes the same five columns, with the forecast column named
//! after the model: `state_id, wm_yr_wk, week_start, y_true, yhat_<model>`.

use crate::data::SeriesKey;
use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use crate::tables::ensure_parent;
use chrono::NaiveDate;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Key columns shared by every prediction table
pub const KEY_COLUMNS: [&str; 3] = ["state_id", "wm_yr_wk", "week_start"];

/// One forecast for one region-week of a model's test split
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub key: SeriesKey,
    /// Observed value of the week
    pub y_true: f64,
    /// Forecast, never negative
    pub yhat: f64,
}

impl PredictionRow {
    /// Create a row
    pub fn new(key: SeriesKey, y_true: f64, yhat: f64) -> Self {
        Self { key, y_true, yhat }
    }
}

/// Prediction tables of all three models
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPredictions {
    pub sarimax: Vec<PredictionRow>,
    pub lgbm: Vec<PredictionRow>,
    pub lstm: Vec<PredictionRow>,
}

impl ModelPredictions {
    /// Rows of one model
    pub fn get(&self, model: ModelKind) -> &[PredictionRow] {
        match model {
            ModelKind::Sarimax => &self.sarimax,
            ModelKind::Lgbm => &self.lgbm,
            ModelKind::Lstm => &self.lstm,
        }
    }

    /// Replace the rows of one model
    pub fn set(&mut self, model: ModelKind, rows: Vec<PredictionRow>) {
        match model {
            ModelKind::Sarimax => self.sarimax = rows,
            ModelKind::Lgbm => self.lgbm = rows,
            ModelKind::Lstm => self.lstm = rows,
        }
    }
}

fn header(model: ModelKind) -> Vec<String> {
    KEY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(["y_true".to_string(), model.forecast_column()])
        .collect()
}

/// Write the prediction table of `model` to `path`
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    model: ModelKind,
    rows: &[PredictionRow],
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(File::create(path)?);
    writer.write_record(header(model))?;
    for row in rows {
        writer.serialize((
            &row.key.region_id,
            row.key.week_key,
            row.key.week_start,
            row.y_true,
            row.yhat,
        ))?;
    }
    writer.flush()?;

    info!(model = %model, rows = rows.len(), path = %path.display(), "wrote predictions");
    Ok(())
}

/// Read the prediction table of `model` from `path`
pub fn read_predictions<P: AsRef<Path>>(path: P, model: ModelKind) -> Result<Vec<PredictionRow>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;

    let found: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let expected = header(model);
    if found != expected {
        return Err(ForecastError::DataError(format!(
            "{} has columns {:?}, expected {:?}",
            path.display(),
            found,
            expected
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let (region_id, week_key, week_start, y_true, yhat): (String, i64, NaiveDate, f64, f64) =
            record?.deserialize(None)?;
        rows.push(PredictionRow::new(
            SeriesKey {
                region_id,
                week_key,
                week_start,
            },
            y_true,
            yhat,
        ));
    }
    Ok(rows)
}
