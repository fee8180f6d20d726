//! Weekly per-region series and the keys shared by every derived table

use crate::error::{ForecastError, Result};
use crate::tables::{self, TableRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Identity of one region-week, carried by every derived row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Region the row belongs to
    #[serde(rename = "state_id")]
    pub region_id: String,
    /// Source system week identifier
    #[serde(rename = "wm_yr_wk")]
    pub week_key: i64,
    /// First calendar day of the week
    pub week_start: NaiveDate,
}

/// One aggregated week of sales for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySeriesPoint {
    /// Region the week belongs to
    #[serde(rename = "state_id")]
    pub region_id: String,
    /// Source system week identifier
    #[serde(rename = "wm_yr_wk")]
    pub week_key: i64,
    /// First calendar day of the week
    pub week_start: NaiveDate,
    /// Total units sold in the week
    pub y: f64,
    /// Mean of the region's SNAP flag over the week's sales rows
    #[serde(rename = "snap")]
    pub snap_flag: f64,
    /// 1 when any day of the week carries an event
    pub event_flag: u8,
}

impl TableRow for WeeklySeriesPoint {
    const COLUMNS: &'static [&'static str] =
        &["state_id", "wm_yr_wk", "week_start", "y", "snap", "event_flag"];
}

impl WeeklySeriesPoint {
    /// Key of this point
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            region_id: self.region_id.clone(),
            week_key: self.week_key,
            week_start: self.week_start,
        }
    }

    /// Exogenous regressors `[snap, event_flag]`
    pub fn regressors(&self) -> [f64; 2] {
        [self.snap_flag, f64::from(self.event_flag)]
    }

    fn validate(&self) -> Result<()> {
        if !self.y.is_finite() || self.y < 0.0 {
            return Err(ForecastError::DataError(format!(
                "region '{}' week {} has invalid sales total {}",
                self.region_id, self.week_key, self.y
            )));
        }
        if !(0.0..=1.0).contains(&self.snap_flag) {
            return Err(ForecastError::DataError(format!(
                "region '{}' week {} has snap share {} outside [0, 1]",
                self.region_id, self.week_key, self.snap_flag
            )));
        }
        if self.event_flag > 1 {
            return Err(ForecastError::DataError(format!(
                "region '{}' week {} has event flag {}, expected 0 or 1",
                self.region_id, self.week_key, self.event_flag
            )));
        }
        Ok(())
    }
}

/// Validated weekly series for all regions, ordered by region then week
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySeries {
    points: Vec<WeeklySeriesPoint>,
}

/// Borrowed view of one region's points in chronological order
#[derive(Debug, Clone, Copy)]
pub struct RegionSeries<'a> {
    /// Region identifier
    pub region_id: &'a str,
    /// Points sorted by `week_start`
    pub points: &'a [WeeklySeriesPoint],
}

impl<'a> RegionSeries<'a> {
    /// Target values in week order
    pub fn targets(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Number of weeks
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the region has no weeks
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl WeeklySeries {
    /// Validate and sort a set of weekly points.
    ///
    /// Fails on duplicate `(region, week_key)` pairs, on two weeks of one
    /// region sharing a `week_start`, and on out-of-range values.
    pub fn new(mut points: Vec<WeeklySeriesPoint>) -> Result<Self> {
        Self::check_keys(&points)?;

        points.sort_by(|a, b| {
            a.region_id
                .cmp(&b.region_id)
                .then(a.week_start.cmp(&b.week_start))
        });

        Ok(Self { points })
    }

    fn check_keys(points: &[WeeklySeriesPoint]) -> Result<()> {
        let mut seen_keys = HashSet::with_capacity(points.len());
        let mut seen_starts = HashSet::with_capacity(points.len());

        for point in points {
            point.validate()?;

            if !seen_keys.insert((point.region_id.as_str(), point.week_key)) {
                return Err(ForecastError::AlignmentError(format!(
                    "duplicate week {} for region '{}'",
                    point.week_key, point.region_id
                )));
            }
            if !seen_starts.insert((point.region_id.as_str(), point.week_start)) {
                return Err(ForecastError::AlignmentError(format!(
                    "region '{}' has two weeks starting on {}",
                    point.region_id, point.week_start
                )));
            }
        }

        Ok(())
    }

    /// Load the persisted `state_week` table
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(tables::read_csv(path)?)
    }

    /// Persist as the `state_week` table
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tables::write_csv(path, &self.points)
    }

    /// All points, ordered by region then week
    pub fn points(&self) -> &[WeeklySeriesPoint] {
        &self.points
    }

    /// Number of region-weeks
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series holds no weeks at all
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distinct regions in sorted order
    pub fn regions(&self) -> Vec<&str> {
        self.by_region().into_iter().map(|r| r.region_id).collect()
    }

    /// One chronological view per region, regions in sorted order
    pub fn by_region(&self) -> Vec<RegionSeries<'_>> {
        let mut groups = Vec::new();
        let mut start = 0;

        while start < self.points.len() {
            let region_id = self.points[start].region_id.as_str();
            let len = self.points[start..]
                .iter()
                .take_while(|p| p.region_id == region_id)
                .count();
            groups.push(RegionSeries {
                region_id,
                points: &self.points[start..start + len],
            });
            start += len;
        }

        groups
    }
}
