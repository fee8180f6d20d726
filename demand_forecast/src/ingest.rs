//! Raw table ingestion
//!
//! Reads the wide daily sales table (one `d_<n>` column per day) and the
//! calendar table with polars and turns them into the long-form records
//! consumed by [`SeriesBuilder`](crate::builder::SeriesBuilder).

use crate::builder::{CalendarDay, DailySales};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Region column of the sales table
pub const REGION_COLUMN: &str = "state_id";
/// Prefix of the per-day sales columns
pub const DAY_COLUMN_PREFIX: &str = "d_";

/// Data loader for the raw sales and calendar tables
#[derive(Debug)]
pub struct RawTableLoader;

impl RawTableLoader {
    /// Read a headered CSV file into a DataFrame
    pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Ok(df)
    }

    /// Load the wide sales table and reshape it into daily long-form rows
    /// for the given regions
    pub fn load_sales<P: AsRef<Path>>(path: P, regions: &[String]) -> Result<Vec<DailySales>> {
        let df = Self::read_frame(path)?;
        sales_from_frame(&df, regions)
    }

    /// Load the calendar table with the SNAP flag of every given region
    pub fn load_calendar<P: AsRef<Path>>(path: P, regions: &[String]) -> Result<Vec<CalendarDay>> {
        let df = Self::read_frame(path)?;
        calendar_from_frame(&df, regions)
    }
}

/// Reshape a wide sales frame into long form.
///
/// Missing sales cells count as zero units.
pub fn sales_from_frame(df: &DataFrame, regions: &[String]) -> Result<Vec<DailySales>> {
    let region_values = utf8_column(df, REGION_COLUMN)?;
    let day_columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.starts_with(DAY_COLUMN_PREFIX))
        .map(str::to_string)
        .collect();

    if day_columns.is_empty() {
        return Err(ForecastError::DataError(format!(
            "sales table has no '{}*' day columns",
            DAY_COLUMN_PREFIX
        )));
    }

    let wanted: HashSet<&str> = regions.iter().map(String::as_str).collect();
    let kept_rows: Vec<(usize, String)> = region_values
        .into_iter()
        .enumerate()
        .filter_map(|(i, region)| region.filter(|r| wanted.contains(r.as_str())).map(|r| (i, r)))
        .collect();

    let mut result = Vec::with_capacity(kept_rows.len() * day_columns.len());
    for day in &day_columns {
        let sales = f64_column(df, day)?;
        for (row, region) in &kept_rows {
            result.push(DailySales {
                region_id: region.clone(),
                date_id: day.clone(),
                sales: sales[*row].unwrap_or(0.0),
            });
        }
    }

    info!(
        rows = kept_rows.len(),
        days = day_columns.len(),
        "reshaped sales table"
    );
    Ok(result)
}

/// Extract calendar days from a calendar frame.
///
/// The frame needs `d`, `date`, `wm_yr_wk`, `event_name_1` and a
/// `snap_<REGION>` column per region.
pub fn calendar_from_frame(df: &DataFrame, regions: &[String]) -> Result<Vec<CalendarDay>> {
    let date_ids = utf8_column(df, "d")?;
    let dates = utf8_column(df, "date")?;
    let week_keys = f64_column(df, "wm_yr_wk")?;
    let events = utf8_column(df, "event_name_1")?;

    let mut snap_columns = HashMap::with_capacity(regions.len());
    for region in regions {
        let column = format!("snap_{}", region);
        if df.column(&column).is_err() {
            return Err(ForecastError::ConfigurationError(format!(
                "calendar has no '{}' column for region '{}'",
                column, region
            )));
        }
        snap_columns.insert(region.clone(), f64_column(df, &column)?);
    }

    let mut days = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let date_id = date_ids[i]
            .clone()
            .ok_or_else(|| ForecastError::DataError(format!("calendar row {} has no day id", i)))?;
        let date_text = dates[i]
            .as_deref()
            .ok_or_else(|| ForecastError::DataError(format!("calendar day '{}' has no date", date_id)))?;
        let date = parse_date(date_text)?;
        let week_key = week_keys[i].ok_or_else(|| {
            ForecastError::DataError(format!("calendar day '{}' has no week", date_id))
        })? as i64;
        let event_name = events[i].clone().filter(|e| !e.trim().is_empty());
        let snap = snap_columns
            .iter()
            .map(|(region, values)| (region.clone(), values[i].unwrap_or(0.0)))
            .collect();

        days.push(CalendarDay {
            date_id,
            date,
            week_key,
            event_name,
            snap,
        });
    }

    Ok(days)
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    // Date-typed columns cast to text may carry a time suffix
    let day_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|e| ForecastError::DataError(format!("invalid date '{}': {}", text, e)))
}

/// Column values as optional strings
fn utf8_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df
        .column(name)
        .map_err(|e| ForecastError::DataError(format!("Column '{}' not found: {}", name, e)))?;
    let text = col.cast(&DataType::Utf8)?;
    let values = text
        .utf8()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

/// Column values as optional floats
fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(name)
        .map_err(|e| ForecastError::DataError(format!("Column '{}' not found: {}", name, e)))?;
    let numbers = col.cast(&DataType::Float64)?;
    let values = numbers.f64()?.into_iter().collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_frame() -> DataFrame {
        df!(
            "store_id" => &["CA_1", "TX_1", "WI_1"],
            "state_id" => &["CA", "TX", "WI"],
            "d_1" => &[1i64, 2, 3],
            "d_2" => &[4i64, 5, 6]
        )
        .unwrap()
    }

    #[test]
    fn test_sales_reshape_filters_regions() {
        let regions = vec!["CA".to_string(), "WI".to_string()];
        let rows = sales_from_frame(&sales_frame(), &regions).unwrap();

        assert_eq!(rows.len(), 4);
        let ca: f64 = rows.iter().filter(|r| r.region_id == "CA").map(|r| r.sales).sum();
        assert_eq!(ca, 5.0);
        assert!(rows.iter().all(|r| r.region_id != "TX"));
    }

    #[test]
    fn test_calendar_requires_snap_column() {
        let df = df!(
            "d" => &["d_1"],
            "date" => &["2011-01-29"],
            "wm_yr_wk" => &[11101i64],
            "event_name_1" => &[None::<&str>],
            "snap_CA" => &[1i64]
        )
        .unwrap();

        let ok = calendar_from_frame(&df, &["CA".to_string()]).unwrap();
        assert_eq!(ok[0].week_key, 11101);
        assert_eq!(ok[0].event_name, None);
        assert_eq!(ok[0].snap["CA"], 1.0);

        let err = calendar_from_frame(&df, &["TX".to_string()]).unwrap_err();
        assert!(matches!(err, ForecastError::ConfigurationError(_)));
        assert!(err.to_string().contains("snap_TX"));
    }
}
