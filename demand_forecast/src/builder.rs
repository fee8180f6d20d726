//! Series Builder: daily store sales to weekly per-region series

use crate::data::{WeeklySeries, WeeklySeriesPoint};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Units sold on one day, in long form
#[derive(Debug, Clone, PartialEq)]
pub struct DailySales {
    /// Region of the selling store
    pub region_id: String,
    /// Calendar day identifier (e.g. `d_1`)
    pub date_id: String,
    /// Units sold
    pub sales: f64,
}

/// Calendar attributes of one day
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDay {
    /// Calendar day identifier (e.g. `d_1`)
    pub date_id: String,
    /// Calendar date
    pub date: NaiveDate,
    /// Week the day belongs to
    pub week_key: i64,
    /// Name of the event on this day, if any
    pub event_name: Option<String>,
    /// SNAP flag per region
    pub snap: HashMap<String, f64>,
}

/// Running totals for one region-week
#[derive(Debug, Default)]
struct WeekAccumulator {
    sales: f64,
    rows: usize,
    snap_sum: f64,
    event_flag: u8,
}

/// Aggregates daily sales of the configured regions into weekly series
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    regions: Vec<String>,
}

impl SeriesBuilder {
    /// Create a builder for the given regions
    pub fn new(regions: Vec<String>) -> Result<Self> {
        if regions.is_empty() {
            return Err(ForecastError::ConfigurationError(
                "at least one region must be configured".to_string(),
            ));
        }
        Ok(Self { regions })
    }

    /// Regions this builder keeps
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Build the weekly series.
    ///
    /// `y` is the weekly sum of sales, `snap` the mean of the region's daily
    /// flag over every kept sales row, `event_flag` the maximum daily event
    /// indicator. `week_start` is the earliest calendar date of the week
    /// across the whole calendar.
    pub fn build(&self, sales: &[DailySales], calendar: &[CalendarDay]) -> Result<WeeklySeries> {
        let days = index_calendar(calendar)?;
        let week_starts = week_starts(calendar);
        let wanted: HashSet<&str> = self.regions.iter().map(String::as_str).collect();

        let mut weeks: BTreeMap<(String, i64), WeekAccumulator> = BTreeMap::new();
        let mut kept_rows = 0usize;

        for row in sales.iter().filter(|r| wanted.contains(r.region_id.as_str())) {
            if !row.sales.is_finite() || row.sales < 0.0 {
                return Err(ForecastError::DataError(format!(
                    "region '{}' day {} has invalid sales {}",
                    row.region_id, row.date_id, row.sales
                )));
            }

            let day = days.get(row.date_id.as_str()).ok_or_else(|| {
                ForecastError::AlignmentError(format!(
                    "sales day '{}' is missing from the calendar",
                    row.date_id
                ))
            })?;
            let snap = *day.snap.get(&row.region_id).ok_or_else(|| {
                ForecastError::ConfigurationError(format!(
                    "calendar has no SNAP flag for region '{}'",
                    row.region_id
                ))
            })?;

            let acc = weeks
                .entry((row.region_id.clone(), day.week_key))
                .or_default();
            acc.sales += row.sales;
            acc.snap_sum += snap;
            acc.rows += 1;
            if day.event_name.is_some() {
                acc.event_flag = 1;
            }
            kept_rows += 1;
        }

        for region in &self.regions {
            if !weeks.keys().any(|(r, _)| r == region) {
                return Err(ForecastError::ConfigurationError(format!(
                    "region '{}' has no sales rows",
                    region
                )));
            }
        }

        debug!(rows = kept_rows, weeks = weeks.len(), "aggregated daily sales");

        let points = weeks
            .into_iter()
            .map(|((region_id, week_key), acc)| {
                let week_start = *week_starts.get(&week_key).ok_or_else(|| {
                    ForecastError::AlignmentError(format!("week {} has no calendar dates", week_key))
                })?;
                Ok(WeeklySeriesPoint {
                    region_id,
                    week_key,
                    week_start,
                    y: acc.sales,
                    snap_flag: acc.snap_sum / acc.rows as f64,
                    event_flag: acc.event_flag,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let series = WeeklySeries::new(points)?;
        info!(
            regions = self.regions.len(),
            rows = series.len(),
            "built weekly series"
        );
        Ok(series)
    }
}

fn index_calendar(calendar: &[CalendarDay]) -> Result<HashMap<&str, &CalendarDay>> {
    let mut days = HashMap::with_capacity(calendar.len());
    for day in calendar {
        if days.insert(day.date_id.as_str(), day).is_some() {
            return Err(ForecastError::AlignmentError(format!(
                "calendar lists day '{}' more than once",
                day.date_id
            )));
        }
    }
    Ok(days)
}

/// Earliest date of every week on the calendar
fn week_starts(calendar: &[CalendarDay]) -> HashMap<i64, NaiveDate> {
    let mut starts: HashMap<i64, NaiveDate> = HashMap::new();
    for day in calendar {
        starts
            .entry(day.week_key)
            .and_modify(|d| *d = (*d).min(day.date))
            .or_insert(day.date);
    }
    starts
}
