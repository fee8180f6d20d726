//! Train/test windowing strategies
//!
//! Each model family sees the weekly series through its own strategy:
//!
//! - [`ExogenousSplit`]: raw weeks with the `[snap, event_flag]` regressors
//! - [`LagFeatures`]: lag and shifted rolling-mean features per week
//! - [`SequenceWindows`]: scaled lookback windows per week
//!
//! All three share one contract. Every region is processed on its own, its
//! rows are kept in week order, and the last `test_length` rows of each
//! region form the test split. A region with no more usable rows than
//! `test_length` is rejected with its name in the error.

use crate::data::{RegionSeries, SeriesKey, WeeklySeries, WeeklySeriesPoint};
use crate::error::{ForecastError, Result};

pub mod exog;
pub mod lag;
pub mod sequence;

pub use exog::ExogenousSplit;
pub use lag::{FeatureWindow, LagFeatures};
pub use sequence::{SequenceWindow, SequenceWindows};

/// Chronological train/test partition of every region's rows
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    /// Rows before the held-out window, all regions
    pub train: Vec<T>,
    /// The held-out window, all regions
    pub test: Vec<T>,
}

/// A row produced by a windowing strategy
pub trait WindowRow {
    /// Region-week this row describes
    fn key(&self) -> SeriesKey;

    /// Observed target of the row's week
    fn target(&self) -> f64;

    /// Region of the row
    fn region_id(&self) -> &str;
}

/// Turns a weekly series into model-specific train/test rows
pub trait WindowingStrategy {
    /// Row type handed to the model
    type Row: WindowRow + Clone;

    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Rows of one region in week order, incomplete rows already dropped
    fn region_rows(&self, region: RegionSeries<'_>) -> Result<Vec<Self::Row>>;

    /// Split every region, holding out its last `test_length` rows
    fn split(&self, series: &WeeklySeries, test_length: usize) -> Result<Split<Self::Row>> {
        if test_length == 0 {
            return Err(ForecastError::InvalidParameter(
                "test length must be greater than zero".to_string(),
            ));
        }

        let mut split = Split {
            train: Vec::new(),
            test: Vec::new(),
        };

        for region in series.by_region() {
            let mut rows = self.region_rows(region)?;
            if rows.len() <= test_length {
                return Err(ForecastError::insufficient_history(
                    region.region_id,
                    test_length + 1,
                    rows.len(),
                ));
            }

            let test = rows.split_off(rows.len() - test_length);
            split.train.extend(rows);
            split.test.extend(test);
        }

        if split.test.is_empty() {
            return Err(ForecastError::DataError(format!(
                "{} split received an empty series",
                self.name()
            )));
        }

        Ok(split)
    }
}

impl WindowRow for WeeklySeriesPoint {
    fn key(&self) -> SeriesKey {
        WeeklySeriesPoint::key(self)
    }

    fn target(&self) -> f64 {
        self.y
    }

    fn region_id(&self) -> &str {
        &self.region_id
    }
}
