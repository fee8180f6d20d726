//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration file and the pipeline runs without one.

use crate::error::{ForecastError, Result};
use crate::models::{GbmParams, LstmParams, ModelKind, SarimaxParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where inputs are read and artifacts are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `raw/`, `processed/` and `geo/`
    pub data_root: PathBuf,
    /// Holds `tables/` and `site/`
    pub output_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            output_root: PathBuf::from("outputs"),
        }
    }
}

impl PathsConfig {
    pub fn raw_sales(&self) -> PathBuf {
        self.data_root.join("raw").join("sales_train_validation.csv")
    }

    pub fn raw_calendar(&self) -> PathBuf {
        self.data_root.join("raw").join("calendar.csv")
    }

    pub fn boundaries(&self) -> PathBuf {
        self.data_root.join("geo").join("us_states.geojson")
    }

    /// Weekly series written by the dataset stage
    pub fn weekly_series(&self) -> PathBuf {
        self.data_root.join("processed").join("state_week.csv")
    }

    fn tables(&self) -> PathBuf {
        self.output_root.join("tables")
    }

    fn site(&self) -> PathBuf {
        self.output_root.join("site")
    }

    pub fn predictions(&self, model: ModelKind) -> PathBuf {
        self.tables().join(format!("pred_{}.csv", model))
    }

    pub fn reconciled(&self) -> PathBuf {
        self.tables().join("pred_all_models.csv")
    }

    pub fn metrics_by_region(&self) -> PathBuf {
        self.tables().join("metrics_by_state.csv")
    }

    pub fn metrics_overall(&self) -> PathBuf {
        self.tables().join("metrics_overall.json")
    }

    pub fn site_payload(&self) -> PathBuf {
        self.site().join("kepler_data.json")
    }

    pub fn site_metrics_overall(&self) -> PathBuf {
        self.site().join("metrics_overall.json")
    }

    pub fn site_metrics_by_region(&self) -> PathBuf {
        self.site().join("metrics_by_state.json")
    }
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Held-out weeks per region, shared by every model
    pub test_weeks: usize,
    /// Weeks of context per sequence window
    pub lookback: usize,
    /// Seed for every random draw
    pub seed: u64,
    /// Regions to forecast
    pub regions: Vec<String>,
    pub paths: PathsConfig,
    pub sarimax: SarimaxParams,
    pub gbm: GbmParams,
    pub lstm: LstmParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_weeks: 8,
            lookback: 12,
            seed: 42,
            regions: vec!["CA".to_string(), "TX".to_string(), "WI".to_string()],
            paths: PathsConfig::default(),
            sarimax: SarimaxParams::default(),
            gbm: GbmParams::default(),
            lstm: LstmParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can succeed with
    pub fn validate(&self) -> Result<()> {
        if self.test_weeks == 0 {
            return Err(ForecastError::ConfigurationError(
                "test_weeks must be greater than zero".to_string(),
            ));
        }
        if self.lookback == 0 {
            return Err(ForecastError::ConfigurationError(
                "lookback must be greater than zero".to_string(),
            ));
        }
        if self.regions.is_empty() {
            return Err(ForecastError::ConfigurationError(
                "at least one region is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.trim().is_empty() {
                return Err(ForecastError::ConfigurationError(
                    "region names cannot be empty".to_string(),
                ));
            }
            if !seen.insert(region.as_str()) {
                return Err(ForecastError::ConfigurationError(format!(
                    "region '{}' is listed more than once",
                    region
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_weeks, 8);
        assert_eq!(config.lookback, 12);
        assert_eq!(config.seed, 42);
        assert_eq!(config.regions, vec!["CA", "TX", "WI"]);
        assert_eq!(config.gbm.num_rounds, 600);
        assert_eq!(config.lstm.epochs, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"test_weeks": 4, "regions": ["TX"], "gbm": {{"num_rounds": 10}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.test_weeks, 4);
        assert_eq!(config.regions, vec!["TX"]);
        assert_eq!(config.gbm.num_rounds, 10);
        assert_eq!(config.gbm.num_leaves, 31);
        assert_eq!(config.lookback, 12);
    }

    #[test]
    fn test_invalid_values() {
        let zero_weeks = PipelineConfig {
            test_weeks: 0,
            ..PipelineConfig::default()
        };
        assert!(zero_weeks.validate().is_err());

        let duplicate = PipelineConfig {
            regions: vec!["CA".to_string(), "CA".to_string()],
            ..PipelineConfig::default()
        };
        let err = duplicate.validate().unwrap_err();
        assert!(err.to_string().contains("'CA'"));

        let empty = PipelineConfig {
            regions: Vec::new(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(ForecastError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_artifact_paths() {
        let paths = PathsConfig::default();
        assert_eq!(
            paths.predictions(ModelKind::Lstm),
            PathBuf::from("outputs/tables/pred_lstm.csv")
        );
        assert_eq!(
            paths.weekly_series(),
            PathBuf::from("data/processed/state_week.csv")
        );
    }
}
