//! Visualization payload: the reconciled table plus a boundary layer
//!
//! The boundary layer is a GeoJSON `FeatureCollection`. Its region codes can
//! sit under several property names depending on where the file came from,
//! so the code property is resolved from a list of known names first and a
//! shape heuristic second.

use crate::data::{SeriesKey, WeeklySeries};
use crate::error::{ForecastError, Result};
use crate::evaluation::ReconciledRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Property names that usually hold two-letter region codes
pub const CODE_CANDIDATES: [&str; 7] = [
    "STUSPS",
    "state_id",
    "STATE_ABBR",
    "abbr",
    "postal",
    "CODE",
    "code",
];

/// Share of values that must look like codes for the heuristic to pick a property
const CODE_SHARE: f64 = 0.6;

/// One row of the site table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRow {
    pub state_id: String,
    pub wm_yr_wk: i64,
    pub week_start: NaiveDate,
    pub y_true: f64,
    pub yhat_sarimax: f64,
    pub yhat_lgbm: f64,
    pub yhat_lstm: f64,
    /// Weekly total from the series, absent if the week is not in it
    pub y_actual: Option<f64>,
    pub abs_err_yhat_sarimax: f64,
    pub abs_err_yhat_lgbm: f64,
    pub abs_err_yhat_lstm: f64,
}

/// Everything the map viewer loads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePayload {
    pub table: Vec<SiteRow>,
    pub geojson: Value,
}

/// Attach the observed weekly totals and absolute errors to reconciled rows
pub fn site_table(rows: &[ReconciledRow], series: &WeeklySeries) -> Vec<SiteRow> {
    let actuals: HashMap<SeriesKey, f64> = series.points().iter().map(|p| (p.key(), p.y)).collect();

    rows.iter()
        .map(|row| SiteRow {
            state_id: row.region_id.clone(),
            wm_yr_wk: row.week_key,
            week_start: row.week_start,
            y_true: row.y_true,
            yhat_sarimax: row.yhat_sarimax,
            yhat_lgbm: row.yhat_lgbm,
            yhat_lstm: row.yhat_lstm,
            y_actual: actuals.get(&row.key()).copied(),
            abs_err_yhat_sarimax: (row.yhat_sarimax - row.y_true).abs(),
            abs_err_yhat_lgbm: (row.yhat_lgbm - row.y_true).abs(),
            abs_err_yhat_lstm: (row.yhat_lstm - row.y_true).abs(),
        })
        .collect()
}

fn features(collection: &Value) -> Result<&Vec<Value>> {
    collection
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ForecastError::DataError("boundary layer is not a GeoJSON FeatureCollection".to_string())
        })
}

fn properties(feature: &Value) -> Option<&Map<String, Value>> {
    feature.get("properties").and_then(Value::as_object)
}

/// Property names across all features, in first-seen order
fn property_names(features: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for props in features.iter().filter_map(properties) {
        for name in props.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

/// Whether most non-null values of `name` are two-character upper-case strings
fn looks_like_codes(features: &[Value], name: &str) -> bool {
    let values: Vec<&Value> = features
        .iter()
        .filter_map(|f| properties(f)?.get(name))
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() || values.iter().any(|v| !v.is_string()) {
        return false;
    }

    let trimmed: Vec<&str> = values.iter().filter_map(|v| v.as_str()).map(str::trim).collect();
    let total = trimmed.len() as f64;
    let two_chars = trimmed.iter().filter(|v| v.chars().count() == 2).count() as f64;
    let upper = trimmed
        .iter()
        .filter(|v| v.to_uppercase() == **v)
        .count() as f64;
    two_chars / total > CODE_SHARE && upper / total > CODE_SHARE
}

/// Name of the property holding region codes
pub fn resolve_code_property(collection: &Value) -> Result<String> {
    let features = features(collection)?;
    let names = property_names(features);

    if let Some(candidate) = CODE_CANDIDATES.iter().find(|c| names.iter().any(|n| n == *c)) {
        return Ok(candidate.to_string());
    }
    if let Some(name) = names.iter().find(|n| looks_like_codes(features, n)) {
        return Ok(name.clone());
    }

    Err(ForecastError::ConfigurationError(format!(
        "Could not find a region code property. Available properties: {:?}",
        names
    )))
}

/// Keep the features of `regions`, each reduced to `{state_id}` and its geometry
pub fn boundary_layer(collection: &Value, regions: &BTreeSet<String>) -> Result<Value> {
    let code_property = resolve_code_property(collection)?;
    info!(property = %code_property, "resolved region code property");

    let kept: Vec<Value> = features(collection)?
        .iter()
        .filter_map(|feature| {
            let code = match properties(feature)?.get(&code_property)? {
                Value::String(s) => s.trim().to_string(),
                Value::Null => return None,
                other => other.to_string(),
            };
            regions.contains(&code).then(|| {
                json!({
                    "type": "Feature",
                    "properties": { "state_id": code },
                    "geometry": feature.get("geometry").cloned().unwrap_or(Value::Null),
                })
            })
        })
        .collect();

    Ok(json!({
        "type": "FeatureCollection",
        "features": kept,
    }))
}

/// Build the site payload from reconciled rows, the weekly series and a boundary layer
pub fn site_payload(
    rows: &[ReconciledRow],
    series: &WeeklySeries,
    boundaries: &Value,
) -> Result<SitePayload> {
    let table = site_table(rows, series);
    let regions: BTreeSet<String> = table.iter().map(|r| r.state_id.clone()).collect();
    let geojson = boundary_layer(boundaries, &regions)?;
    Ok(SitePayload { table, geojson })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn collection(props: Vec<Value>) -> Value {
        let features: Vec<Value> = props
            .into_iter()
            .map(|p| json!({"type": "Feature", "properties": p, "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}))
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }

    #[rstest]
    #[case(json!({"NAME": "California", "STUSPS": "CA"}), "STUSPS")]
    #[case(json!({"name": "Texas", "postal": "TX", "code": "48"}), "postal")]
    #[case(json!({"name": "Wisconsin", "iso": "WI"}), "iso")]
    fn test_code_property(#[case] props: Value, #[case] expected: &str) {
        assert_eq!(resolve_code_property(&collection(vec![props])).unwrap(), expected);
    }

    #[test]
    fn test_heuristic_needs_most_values() {
        let layer = collection(vec![
            json!({"name": "California", "label": "ca-west"}),
            json!({"name": "Texas", "label": "TX"}),
            json!({"name": "Wisconsin", "label": "wisc"}),
        ]);
        let err = resolve_code_property(&layer).unwrap_err();
        assert!(matches!(err, ForecastError::ConfigurationError(_)));
        assert!(err.to_string().contains("label"));
    }

    #[test]
    fn test_boundary_layer_filters_regions() {
        let layer = collection(vec![
            json!({"NAME": "California", "STUSPS": " CA "}),
            json!({"NAME": "Nevada", "STUSPS": "NV"}),
        ]);
        let regions: BTreeSet<String> = ["CA".to_string(), "TX".to_string()].into_iter().collect();

        let filtered = boundary_layer(&layer, &regions).unwrap();
        let features = filtered["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"], json!({"state_id": "CA"}));
        assert_eq!(features[0]["geometry"]["type"], "Point");
    }
}
