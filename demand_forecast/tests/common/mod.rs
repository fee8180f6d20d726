//! Synthetic inputs shared by the integration tests
#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use demand_forecast::models::{GbmParams, LstmParams};
use demand_forecast::{PipelineConfig, WeeklySeries, WeeklySeriesPoint};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const REGIONS: [&str; 3] = ["CA", "TX", "WI"];

/// First day of the first week, a Saturday
pub fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2011, 1, 29).unwrap()
}

/// Deterministic daily units of one store
pub fn daily_units(region: usize, store: usize, day: usize) -> i64 {
    let weekly = [3, 1, 0, 2, 4, 6, 5][day % 7];
    (10 * (region + 1) + 3 * store + weekly + (day / 7) % 5) as i64
}

/// `weeks` weeks per region with trend, a four-week cycle, SNAP and events
pub fn weekly_series(regions: &[&str], weeks: usize) -> WeeklySeries {
    let mut points = Vec::new();
    for (r, region) in regions.iter().enumerate() {
        for w in 0..weeks {
            let cycle = [0.0, 40.0, 15.0, -20.0][w % 4];
            points.push(WeeklySeriesPoint {
                region_id: region.to_string(),
                week_key: 11101 + w as i64,
                week_start: first_day() + Days::new(7 * w as u64),
                y: 500.0 * (r + 1) as f64 + 6.0 * w as f64 + cycle,
                snap_flag: if w % 4 == 1 { 10.0 / 14.0 } else { 3.0 / 7.0 },
                event_flag: (w % 6 == 0) as u8,
            });
        }
    }
    WeeklySeries::new(points).unwrap()
}

/// Defaults with small models so a full run stays fast
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        gbm: GbmParams {
            num_rounds: 25,
            min_data_in_leaf: 5,
            num_leaves: 7,
            ..GbmParams::default()
        },
        lstm: LstmParams {
            hidden_size: 8,
            head_size: 8,
            epochs: 2,
            batch_size: 16,
            ..LstmParams::default()
        },
        ..PipelineConfig::default()
    }
}

/// Write raw sales, calendar and boundary files under `data_root`
pub fn write_raw_inputs(data_root: &Path, weeks: usize) {
    let days = weeks * 7;
    let raw = data_root.join("raw");
    let geo = data_root.join("geo");
    fs::create_dir_all(&raw).unwrap();
    fs::create_dir_all(&geo).unwrap();

    let mut sales = fs::File::create(raw.join("sales_train_validation.csv")).unwrap();
    let day_columns: Vec<String> = (1..=days).map(|d| format!("d_{}", d)).collect();
    writeln!(sales, "id,store_id,state_id,{}", day_columns.join(",")).unwrap();
    for (r, region) in REGIONS.iter().enumerate() {
        for store in 0..2 {
            let units: Vec<String> = (0..days)
                .map(|d| daily_units(r, store, d).to_string())
                .collect();
            writeln!(
                sales,
                "ITEM_{}_{},{}_{},{},{}",
                region,
                store,
                region,
                store + 1,
                region,
                units.join(",")
            )
            .unwrap();
        }
    }

    let mut calendar = fs::File::create(raw.join("calendar.csv")).unwrap();
    writeln!(calendar, "date,wm_yr_wk,d,event_name_1,snap_CA,snap_TX,snap_WI").unwrap();
    for d in 0..days {
        let date = first_day() + Days::new(d as u64);
        let event = if d % 17 == 3 { "SuperBowl" } else { "" };
        writeln!(
            calendar,
            "{},{},d_{},{},{},{},{}",
            date.format("%Y-%m-%d"),
            11101 + d / 7,
            d + 1,
            event,
            (d % 3 == 0) as u8,
            (d % 4 == 0) as u8,
            (d % 5 == 0) as u8
        )
        .unwrap();
    }

    let features: Vec<_> = [("California", "CA"), ("Texas", "TX"), ("Wisconsin", "WI"), ("Nevada", "NV")]
        .iter()
        .map(|(name, code)| {
            json!({
                "type": "Feature",
                "properties": {"NAME": name, "STUSPS": code},
                "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}
            })
        })
        .collect();
    let layer = json!({"type": "FeatureCollection", "features": features});
    fs::write(geo.join("us_states.geojson"), layer.to_string()).unwrap();
}
