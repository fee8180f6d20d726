//! Reconciliation of the three prediction tables and shared metrics
//!
//! Predictions are inner-joined on `(state_id, wm_yr_wk, week_start,
//! y_true)`, so every metric is computed over exactly the same weeks for
//! every model. Rows that not every model produced are reported, never
//! silently discarded.

use crate::data::SeriesKey;
use crate::error::{ForecastError, Result};
use crate::metrics::ForecastMetrics;
use crate::models::ModelKind;
use crate::predictions::{ModelPredictions, PredictionRow};
use crate::tables::TableRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

/// One region-week with the forecasts of every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRow {
    #[serde(rename = "state_id")]
    pub region_id: String,
    #[serde(rename = "wm_yr_wk")]
    pub week_key: i64,
    pub week_start: NaiveDate,
    pub y_true: f64,
    pub yhat_sarimax: f64,
    pub yhat_lgbm: f64,
    pub yhat_lstm: f64,
}

impl TableRow for ReconciledRow {
    const COLUMNS: &'static [&'static str] = &[
        "state_id",
        "wm_yr_wk",
        "week_start",
        "y_true",
        "yhat_sarimax",
        "yhat_lgbm",
        "yhat_lstm",
    ];
}

impl ReconciledRow {
    /// Key of the row
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            region_id: self.region_id.clone(),
            week_key: self.week_key,
            week_start: self.week_start,
        }
    }

    /// Forecast of one model
    pub fn forecast(&self, model: ModelKind) -> f64 {
        match model {
            ModelKind::Sarimax => self.yhat_sarimax,
            ModelKind::Lgbm => self.yhat_lgbm,
            ModelKind::Lstm => self.yhat_lstm,
        }
    }
}

/// A key that did not make it into the reconciled table
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRow {
    pub key: SeriesKey,
    pub y_true: f64,
    /// Models without a prediction for this key
    pub missing: Vec<ModelKind>,
}

/// Inner join of the prediction tables
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Rows every model predicted, in the statistical model's order
    pub rows: Vec<ReconciledRow>,
    pub dropped: Vec<DroppedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JoinKey {
    key: SeriesKey,
    y_true: u64,
}

impl JoinKey {
    fn of(row: &PredictionRow) -> Self {
        // -0.0 and 0.0 join as equal values
        let y_true = if row.y_true == 0.0 { 0.0 } else { row.y_true };
        Self {
            key: row.key.clone(),
            y_true: y_true.to_bits(),
        }
    }
}

fn index_rows(model: ModelKind, rows: &[PredictionRow]) -> Result<HashMap<JoinKey, f64>> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        if index.insert(JoinKey::of(row), row.yhat).is_some() {
            return Err(ForecastError::AlignmentError(format!(
                "{} predictions contain region '{}' week {} more than once",
                model, row.key.region_id, row.key.week_key
            )));
        }
    }
    Ok(index)
}

/// Inner-join the three prediction tables
pub fn reconcile(predictions: &ModelPredictions) -> Result<Reconciliation> {
    let indexes = ModelKind::ALL
        .iter()
        .map(|&model| Ok((model, index_rows(model, predictions.get(model))?)))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    // sarimax first so the output follows its order
    for &model in &ModelKind::ALL {
        for row in predictions.get(model) {
            let join = JoinKey::of(row);
            if !seen.insert(join.clone()) {
                continue;
            }

            let found: Vec<(ModelKind, Option<f64>)> = indexes
                .iter()
                .map(|(m, index)| (*m, index.get(&join).copied()))
                .collect();
            let missing: Vec<ModelKind> = found
                .iter()
                .filter(|(_, yhat)| yhat.is_none())
                .map(|(m, _)| *m)
                .collect();

            match (found[0].1, found[1].1, found[2].1) {
                (Some(yhat_sarimax), Some(yhat_lgbm), Some(yhat_lstm)) => rows.push(ReconciledRow {
                    region_id: row.key.region_id.clone(),
                    week_key: row.key.week_key,
                    week_start: row.key.week_start,
                    y_true: row.y_true,
                    yhat_sarimax,
                    yhat_lgbm,
                    yhat_lstm,
                }),
                _ => dropped.push(DroppedRow {
                    key: row.key.clone(),
                    y_true: row.y_true,
                    missing,
                }),
            }
        }
    }

    for row in &dropped {
        let missing: Vec<&str> = row.missing.iter().map(|m| m.as_str()).collect();
        warn!(
            region = %row.key.region_id,
            week = row.key.week_key,
            missing = ?missing,
            "dropped prediction row missing from some models"
        );
    }

    Ok(Reconciliation { rows, dropped })
}

/// Metrics of every model over one set of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsOverall {
    pub wape: BTreeMap<ModelKind, f64>,
    pub bias: BTreeMap<ModelKind, f64>,
}

impl MetricsOverall {
    fn from_rows(rows: &[ReconciledRow]) -> Result<Self> {
        let y_true: Vec<f64> = rows.iter().map(|r| r.y_true).collect();
        let mut wape = BTreeMap::new();
        let mut bias = BTreeMap::new();
        for model in ModelKind::ALL {
            let y_pred: Vec<f64> = rows.iter().map(|r| r.forecast(model)).collect();
            let metrics = ForecastMetrics::compute(&y_true, &y_pred)?;
            wape.insert(model, metrics.wape);
            bias.insert(model, metrics.bias);
        }
        Ok(Self { wape, bias })
    }

    /// Metrics of one model
    pub fn get(&self, model: ModelKind) -> Option<ForecastMetrics> {
        Some(ForecastMetrics {
            wape: *self.wape.get(&model)?,
            bias: *self.bias.get(&model)?,
        })
    }
}

/// Metrics of every model for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    #[serde(rename = "state_id")]
    pub region_id: String,
    pub wape_sarimax: f64,
    pub wape_lgbm: f64,
    pub wape_lstm: f64,
    pub bias_sarimax: f64,
    pub bias_lgbm: f64,
    pub bias_lstm: f64,
}

impl TableRow for RegionMetrics {
    const COLUMNS: &'static [&'static str] = &[
        "state_id",
        "wape_sarimax",
        "wape_lgbm",
        "wape_lstm",
        "bias_sarimax",
        "bias_lgbm",
        "bias_lstm",
    ];
}

impl RegionMetrics {
    fn new(region_id: String, metrics: &MetricsOverall) -> Self {
        let wape = |m| metrics.wape.get(&m).copied().unwrap_or_default();
        let bias = |m| metrics.bias.get(&m).copied().unwrap_or_default();
        Self {
            region_id,
            wape_sarimax: wape(ModelKind::Sarimax),
            wape_lgbm: wape(ModelKind::Lgbm),
            wape_lstm: wape(ModelKind::Lstm),
            bias_sarimax: bias(ModelKind::Sarimax),
            bias_lgbm: bias(ModelKind::Lgbm),
            bias_lstm: bias(ModelKind::Lstm),
        }
    }
}

/// Everything the evaluate stage produces
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub reconciliation: Reconciliation,
    pub overall: MetricsOverall,
    /// One entry per region, sorted by region
    pub by_region: Vec<RegionMetrics>,
}

/// Reconcile the predictions and score every model overall and per region
pub fn evaluate(predictions: &ModelPredictions) -> Result<Evaluation> {
    let reconciliation = reconcile(predictions)?;
    if reconciliation.rows.is_empty() {
        return Err(ForecastError::AlignmentError(format!(
            "no prediction rows are shared by every model ({} dropped)",
            reconciliation.dropped.len()
        )));
    }

    let overall = MetricsOverall::from_rows(&reconciliation.rows)?;

    let mut regions: BTreeMap<&str, Vec<ReconciledRow>> = BTreeMap::new();
    for row in &reconciliation.rows {
        regions
            .entry(row.region_id.as_str())
            .or_default()
            .push(row.clone());
    }
    let by_region = regions
        .into_iter()
        .map(|(region, rows)| {
            let metrics = MetricsOverall::from_rows(&rows)?;
            Ok(RegionMetrics::new(region.to_string(), &metrics))
        })
        .collect::<Result<Vec<_>>>()?;

    for model in ModelKind::ALL {
        if let Some(metrics) = overall.get(model) {
            info!(model = %model, %metrics, "overall accuracy");
        }
    }

    Ok(Evaluation {
        reconciliation,
        overall,
        by_region,
    })
}
