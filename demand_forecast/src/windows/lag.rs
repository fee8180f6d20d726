//! Lag-feature strategy for the tree model

use super::{WindowRow, WindowingStrategy};
use crate::data::{RegionSeries, SeriesKey};
use crate::error::Result;
use chrono::NaiveDate;
use demand_math::moving_averages::{lagged, rolling_mean_shifted};

/// Lags, in weeks, used as features
pub const LAGS: [usize; 4] = [1, 2, 4, 8];
/// Rolling-mean windows, in weeks, over the weeks before the current one
pub const ROLLING_WINDOWS: [usize; 2] = [4, 8];

/// Number of numeric features per row, excluding the region
pub const NUM_FEATURES: usize = 2 + LAGS.len() + ROLLING_WINDOWS.len();

/// Names of [`FeatureWindow::features`] in order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "snap",
    "event_flag",
    "lag_1",
    "lag_2",
    "lag_4",
    "lag_8",
    "roll_mean_4",
    "roll_mean_8",
];

/// One week with its lag and rolling-mean features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub region_id: String,
    pub week_key: i64,
    pub week_start: NaiveDate,
    pub y: f64,
    pub snap_flag: f64,
    pub event_flag: u8,
    pub lag_1: f64,
    pub lag_2: f64,
    pub lag_4: f64,
    pub lag_8: f64,
    pub roll_mean_4: f64,
    pub roll_mean_8: f64,
}

impl FeatureWindow {
    /// Numeric features in [`FEATURE_NAMES`] order
    pub fn features(&self) -> [f64; NUM_FEATURES] {
        [
            self.snap_flag,
            f64::from(self.event_flag),
            self.lag_1,
            self.lag_2,
            self.lag_4,
            self.lag_8,
            self.roll_mean_4,
            self.roll_mean_8,
        ]
    }
}

impl WindowRow for FeatureWindow {
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

/// Derives [`FeatureWindow`]s; weeks whose lookback reaches before the
/// region's first week are dropped, not imputed
#[derive(Debug, Clone, Copy, Default)]
pub struct LagFeatures;

impl LagFeatures {
    /// Rows lost at the start of every region
    pub fn max_lookback(&self) -> usize {
        LAGS.iter().chain(ROLLING_WINDOWS.iter()).copied().max().unwrap_or(0)
    }
}

impl WindowingStrategy for LagFeatures {
    type Row = FeatureWindow;

    fn name(&self) -> &str {
        "lag-features"
    }

    fn region_rows(&self, region: RegionSeries<'_>) -> Result<Vec<FeatureWindow>> {
        let y = region.targets();
        let lags = LAGS
            .iter()
            .map(|&k| lagged(&y, k))
            .collect::<demand_math::Result<Vec<_>>>()?;
        let rolls = ROLLING_WINDOWS
            .iter()
            .map(|&w| rolling_mean_shifted(&y, w))
            .collect::<demand_math::Result<Vec<_>>>()?;

        let rows = region
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                Some(FeatureWindow {
                    region_id: p.region_id.clone(),
                    week_key: p.week_key,
                    week_start: p.week_start,
                    y: p.y,
                    snap_flag: p.snap_flag,
                    event_flag: p.event_flag,
                    lag_1: lags[0][i]?,
                    lag_2: lags[1][i]?,
                    lag_4: lags[2][i]?,
                    lag_8: lags[3][i]?,
                    roll_mean_4: rolls[0][i]?,
                    roll_mean_8: rolls[1][i]?,
                })
            })
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::windows::test_support::series;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_incomplete_rows_dropped() {
        let series = series(&["CA"], 20);
        let rows = LagFeatures.region_rows(series.by_region()[0]).unwrap();

        assert_eq!(LagFeatures.max_lookback(), 8);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].week_key, 11101 + 8);
    }

    #[test]
    fn test_feature_values() {
        // CA targets are 100 + week index
        let series = series(&["CA"], 20);
        let rows = LagFeatures.region_rows(series.by_region()[0]).unwrap();
        let first = &rows[0];

        assert_eq!(first.y, 108.0);
        assert_eq!(first.lag_1, 107.0);
        assert_eq!(first.lag_2, 106.0);
        assert_eq!(first.lag_4, 104.0);
        assert_eq!(first.lag_8, 100.0);
        // Mean of weeks 4..8 and 0..8, current week excluded
        assert_abs_diff_eq!(first.roll_mean_4, 105.5, epsilon = 1e-9);
        assert_abs_diff_eq!(first.roll_mean_8, 103.5, epsilon = 1e-9);
        assert_eq!(first.features()[2], first.lag_1);
    }

    #[test]
    fn test_split_per_region() {
        let series = series(&["CA", "TX", "WI"], 30);
        let split = LagFeatures.split(&series, 8).unwrap();

        assert_eq!(split.test.len(), 24);
        assert_eq!(split.train.len(), 3 * (22 - 8));
        for region in ["CA", "TX", "WI"] {
            let last_train = split
                .train
                .iter()
                .filter(|r| r.region_id == region)
                .map(|r| r.week_start)
                .max()
                .unwrap();
            assert!(split
                .test
                .iter()
                .filter(|r| r.region_id == region)
                .all(|r| r.week_start > last_train));
        }
    }

    #[test]
    fn test_insufficient_history() {
        // 16 weeks leave 8 usable rows: not more than the test length
        let series = series(&["TX"], 16);
        let err = LagFeatures.split(&series, 8).unwrap_err();

        assert!(matches!(err, ForecastError::ConfigurationError(_)));
        assert!(err.to_string().contains("'TX'"));
    }
}
