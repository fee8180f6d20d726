//! Sequence-window strategy for the recurrent model

use super::{WindowRow, WindowingStrategy};
use crate::data::{RegionSeries, SeriesKey};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use demand_math::stats::Scaler;

/// Inputs per time step: `(scaled_y, snap_flag, event_flag)`
pub const STEP_FEATURES: usize = 3;

/// The `lookback` weeks before a target week, and the target itself
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    pub region_id: String,
    pub week_key: i64,
    pub week_start: NaiveDate,
    /// One row per preceding week, oldest first
    pub inputs: Vec<[f64; STEP_FEATURES]>,
    /// Unscaled target of the current week
    pub y: f64,
}

impl WindowRow for SequenceWindow {
    fn key(&self) -> SeriesKey {
        SeriesKey {
            region_id: self.region_id.clone(),
            week_key: self.week_key,
            week_start: self.week_start,
        }
    }

    fn target(&self) -> f64 {
        self.y
    }

    fn region_id(&self) -> &str {
        &self.region_id
    }
}

/// Builds sliding lookback windows per region.
///
/// The target is standardized with the mean and sample standard deviation
/// of the region's whole series (train and test weeks together).
#[derive(Debug, Clone, Copy)]
pub struct SequenceWindows {
    lookback: usize,
}

impl SequenceWindows {
    /// Create a strategy with `lookback` weeks of context per window
    pub fn new(lookback: usize) -> Result<Self> {
        if lookback == 0 {
            return Err(ForecastError::InvalidParameter(
                "lookback must be greater than zero".to_string(),
            ));
        }
        Ok(Self { lookback })
    }

    /// Weeks of context per window
    pub fn lookback(&self) -> usize {
        self.lookback
    }
}

impl WindowingStrategy for SequenceWindows {
    type Row = SequenceWindow;

    fn name(&self) -> &str {
        "sequence-windows"
    }

    fn region_rows(&self, region: RegionSeries<'_>) -> Result<Vec<SequenceWindow>> {
        let targets = region.targets();
        if targets.len() <= self.lookback {
            return Ok(Vec::new());
        }

        let scaler = Scaler::fit(&targets)?;
        let steps: Vec<[f64; STEP_FEATURES]> = region
            .points
            .iter()
            .map(|p| [scaler.transform(p.y), p.snap_flag, f64::from(p.event_flag)])
            .collect();

        let windows = (self.lookback..region.points.len())
            .map(|i| {
                let current = &region.points[i];
                SequenceWindow {
                    region_id: current.region_id.clone(),
                    week_key: current.week_key,
                    week_start: current.week_start,
                    inputs: steps[i - self.lookback..i].to_vec(),
                    y: current.y,
                }
            })
            .collect();

        Ok(windows)
    }
}
