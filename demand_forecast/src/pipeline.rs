//! Stage runner
//!
//! The pipeline is a fixed sequence of stages. Each stage reads the
//! artifacts of the stages before it, computes its full result in memory
//! and only then writes its own artifacts, so a failing stage leaves no
//! partial output behind.

use crate::builder::SeriesBuilder;
use crate::config::PipelineConfig;
use crate::data::WeeklySeries;
use crate::error::{ForecastError, Result};
use crate::evaluation::{evaluate, Evaluation, MetricsOverall, ReconciledRow, RegionMetrics};
use crate::export::site_payload;
use crate::ingest::RawTableLoader;
use crate::models::{forecast_split, GbmAdapter, LstmAdapter, ModelKind, SarimaxAdapter};
use crate::predictions::{read_predictions, write_predictions, ModelPredictions, PredictionRow};
use crate::tables;
use crate::windows::{ExogenousSplit, LagFeatures, SequenceWindows, WindowingStrategy};
use clap::ValueEnum;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// A unit of work that can be run on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Build the weekly series from the raw tables
    Dataset,
    /// Forecast with the ARIMAX model
    Sarimax,
    /// Forecast with the gradient-boosted trees
    Lgbm,
    /// Forecast with the LSTM
    Lstm,
    /// Reconcile predictions and compute metrics
    Evaluate,
    /// Write the visualization payload
    Export,
    /// Every stage, in order
    All,
}

impl Stage {
    /// Stages run by [`Stage::All`], in order
    pub const SEQUENCE: [Stage; 6] = [
        Stage::Dataset,
        Stage::Sarimax,
        Stage::Lgbm,
        Stage::Lstm,
        Stage::Evaluate,
        Stage::Export,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dataset => "dataset",
            Stage::Sarimax => "sarimax",
            Stage::Lgbm => "lgbm",
            Stage::Lstm => "lstm",
            Stage::Evaluate => "evaluate",
            Stage::Export => "export",
            Stage::All => "all",
        };
        f.write_str(name)
    }
}

/// Runs stages against one validated configuration
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline, rejecting invalid configurations
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one stage, or all of them
    pub fn run(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::All => Stage::SEQUENCE.iter().try_for_each(|&s| self.run(s)),
            Stage::Dataset => {
                info!(stage = %stage, "running stage");
                self.dataset_stage()
            }
            Stage::Sarimax => self.model_stage(ModelKind::Sarimax),
            Stage::Lgbm => self.model_stage(ModelKind::Lgbm),
            Stage::Lstm => self.model_stage(ModelKind::Lstm),
            Stage::Evaluate => {
                info!(stage = %stage, "running stage");
                self.evaluate_stage()
            }
            Stage::Export => {
                info!(stage = %stage, "running stage");
                self.export_stage()
            }
        }
    }

    /// Read the raw tables and aggregate them into the weekly series
    pub fn build_series(&self) -> Result<WeeklySeries> {
        let paths = &self.config.paths;
        let regions = &self.config.regions;
        let sales = RawTableLoader::load_sales(paths.raw_sales(), regions)?;
        let calendar = RawTableLoader::load_calendar(paths.raw_calendar(), regions)?;
        SeriesBuilder::new(regions.clone())?.build(&sales, &calendar)
    }

    /// Fit one model on the series and forecast its test split.
    ///
    /// Every model holds out the same `test_weeks` per region; a model that
    /// returns any other count for a region is an alignment failure.
    pub fn forecast(&self, model: ModelKind, series: &WeeklySeries) -> Result<Vec<PredictionRow>> {
        let test_weeks = self.config.test_weeks;
        let seed = self.config.seed;
        let rows = match model {
            ModelKind::Sarimax => {
                let split = ExogenousSplit.split(series, test_weeks)?;
                forecast_split(&SarimaxAdapter::new(self.config.sarimax.clone()), &split)?
            }
            ModelKind::Lgbm => {
                let split = LagFeatures.split(series, test_weeks)?;
                forecast_split(&GbmAdapter::new(self.config.gbm.clone(), seed), &split)?
            }
            ModelKind::Lstm => {
                let split = SequenceWindows::new(self.config.lookback)?.split(series, test_weeks)?;
                forecast_split(&LstmAdapter::new(self.config.lstm.clone(), seed), &split)?
            }
        };

        check_counts(model, series, &rows, test_weeks)?;
        Ok(rows)
    }

    /// Forecast with every model
    pub fn forecast_all(&self, series: &WeeklySeries) -> Result<ModelPredictions> {
        let mut predictions = ModelPredictions::default();
        for model in ModelKind::ALL {
            predictions.set(model, self.forecast(model, series)?);
        }
        Ok(predictions)
    }

    fn dataset_stage(&self) -> Result<()> {
        let series = self.build_series()?;
        let path = self.config.paths.weekly_series();
        series.to_csv(&path)?;
        info!(rows = series.len(), path = %path.display(), "wrote weekly series");
        Ok(())
    }

    fn model_stage(&self, model: ModelKind) -> Result<()> {
        info!(stage = %model, "running stage");
        let series = WeeklySeries::from_csv(self.config.paths.weekly_series())?;
        let rows = self.forecast(model, &series)?;
        write_predictions(self.config.paths.predictions(model), model, &rows)
    }

    fn evaluate_stage(&self) -> Result<()> {
        let paths = &self.config.paths;
        let mut predictions = ModelPredictions::default();
        for model in ModelKind::ALL {
            predictions.set(model, read_predictions(paths.predictions(model), model)?);
        }

        let evaluation = evaluate(&predictions)?;
        self.write_evaluation(&evaluation)
    }

    /// Persist the reconciled table and both metric tables
    pub fn write_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let paths = &self.config.paths;
        tables::write_csv(paths.reconciled(), &evaluation.reconciliation.rows)?;
        tables::write_csv(paths.metrics_by_region(), &evaluation.by_region)?;
        tables::write_json(paths.metrics_overall(), &evaluation.overall)?;
        info!(
            rows = evaluation.reconciliation.rows.len(),
            dropped = evaluation.reconciliation.dropped.len(),
            path = %paths.reconciled().display(),
            "wrote evaluation"
        );
        Ok(())
    }

    fn export_stage(&self) -> Result<()> {
        let paths = &self.config.paths;
        let reconciled: Vec<ReconciledRow> = tables::read_csv(paths.reconciled())?;
        let series = WeeklySeries::from_csv(paths.weekly_series())?;
        let boundaries: Value = tables::read_json(paths.boundaries())?;
        let overall: MetricsOverall = tables::read_json(paths.metrics_overall())?;
        let by_region: Vec<RegionMetrics> = tables::read_csv(paths.metrics_by_region())?;

        let payload = site_payload(&reconciled, &series, &boundaries)?;

        tables::write_json(paths.site_payload(), &payload)?;
        tables::write_json(paths.site_metrics_overall(), &overall)?;
        tables::write_json(paths.site_metrics_by_region(), &by_region)?;
        info!(
            rows = payload.table.len(),
            path = %paths.site_payload().display(),
            "wrote site payload"
        );
        Ok(())
    }
}

/// Every region of the series gets exactly `test_weeks` predictions
fn check_counts(
    model: ModelKind,
    series: &WeeklySeries,
    rows: &[PredictionRow],
    test_weeks: usize,
) -> Result<()> {
    let mut counts: BTreeMap<&str, usize> = series.regions().into_iter().map(|r| (r, 0)).collect();
    for row in rows {
        match counts.get_mut(row.key.region_id.as_str()) {
            Some(count) => *count += 1,
            None => {
                return Err(ForecastError::AlignmentError(format!(
                    "{} predicted region '{}' which is not in the series",
                    model, row.key.region_id
                )))
            }
        }
    }

    if let Some((region, count)) = counts.iter().find(|(_, count)| **count != test_weeks) {
        return Err(ForecastError::AlignmentError(format!(
            "{} produced {} predictions for region '{}', expected {}",
            model, count, region, test_weeks
        )));
    }
    Ok(())
}
