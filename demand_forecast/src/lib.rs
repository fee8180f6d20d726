//! # Demand Forecast
//!
//! A Rust library for weekly regional demand forecasting with a shared
//! evaluation harness.
//!
//! ## Features
//!
//! - Raw table ingestion (wide daily sales and a calendar)
//! - Weekly per-region series with SNAP and event regressors
//! - Three windowing strategies over one held-out period
//! - Forecasting models (ARIMAX, Poisson gradient-boosted trees, LSTM)
//! - Reconciled WAPE and bias metrics, overall and per region
//! - Export of a map-ready payload with a GeoJSON boundary layer
//!
//! ## Held-out Period
//!
//! Every model is scored on the same weeks. The pipeline passes one
//! `test_weeks` value to all three windowing strategies and rejects a model
//! whose predictions do not cover exactly those weeks for every region:
//!
//! ```rust
//! use demand_forecast::windows::{ExogenousSplit, LagFeatures, WindowingStrategy};
//! # use demand_forecast::{WeeklySeries, WeeklySeriesPoint};
//! # use chrono::{Days, NaiveDate};
//! # let start = NaiveDate::from_ymd_opt(2011, 1, 29).unwrap();
//! # let points = (0..30)
//! #     .map(|w| WeeklySeriesPoint {
//! #         region_id: "CA".to_string(),
//! #         week_key: 11101 + w,
//! #         week_start: start + Days::new(7 * w as u64),
//! #         y: 100.0 + w as f64,
//! #         snap_flag: 0.0,
//! #         event_flag: 0,
//! #     })
//! #     .collect();
//! # let series = WeeklySeries::new(points).unwrap();
//!
//! let exog = ExogenousSplit.split(&series, 8).unwrap();
//! let lags = LagFeatures.split(&series, 8).unwrap();
//! assert_eq!(exog.test.len(), lags.test.len());
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use demand_forecast::{Pipeline, PipelineConfig, Stage};
//!
//! # fn main() -> demand_forecast::Result<()> {
//! // Load settings, falling back to defaults for missing fields
//! let config = PipelineConfig::from_file("pipeline.json")?;
//!
//! // Run every stage: dataset, three models, evaluation and export
//! let pipeline = Pipeline::new(config)?;
//! pipeline.run(Stage::All)?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod predictions;
pub mod tables;
pub mod windows;

// Re-export commonly used types
pub use crate::builder::{CalendarDay, DailySales, SeriesBuilder};
pub use crate::config::{PathsConfig, PipelineConfig};
pub use crate::data::{SeriesKey, WeeklySeries, WeeklySeriesPoint};
pub use crate::error::{ForecastError, Result};
pub use crate::evaluation::{evaluate, reconcile, Evaluation, ReconciledRow};
pub use crate::metrics::{bias, wape, ForecastMetrics};
pub use crate::models::{ForecastModel, ForecastResult, ModelKind, TrainedForecastModel};
pub use crate::pipeline::{Pipeline, Stage};
pub use crate::predictions::{ModelPredictions, PredictionRow};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
