//! Exogenous-split strategy: plain prefix/suffix of each region's weeks

use super::WindowingStrategy;
use crate::data::{RegionSeries, WeeklySeriesPoint};
use crate::error::Result;

/// Keeps every week as-is; the model reads `[snap, event_flag]` as
/// regressors through [`WeeklySeriesPoint::regressors`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExogenousSplit;

impl WindowingStrategy for ExogenousSplit {
    type Row = WeeklySeriesPoint;

    fn name(&self) -> &str {
        "exogenous-split"
    }

    fn region_rows(&self, region: RegionSeries<'_>) -> Result<Vec<WeeklySeriesPoint>> {
        Ok(region.points.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::windows::test_support::series;

    #[test]
    fn test_trailing_weeks_are_test() {
        let series = series(&["CA", "TX"], 10);
        let split = ExogenousSplit.split(&series, 3).unwrap();

        assert_eq!(split.train.len(), 14);
        assert_eq!(split.test.len(), 6);

        for region in ["CA", "TX"] {
            let last_train = split
                .train
                .iter()
                .filter(|p| p.region_id == region)
                .map(|p| p.week_start)
                .max()
                .unwrap();
            let test: Vec<_> = split.test.iter().filter(|p| p.region_id == region).collect();
            assert_eq!(test.len(), 3);
            assert!(test.iter().all(|p| p.week_start > last_train));
        }
    }

    #[test]
    fn test_too_short_region_is_named() {
        let series = series(&["CA"], 4);
        let err = ExogenousSplit.split(&series, 4).unwrap_err();

        assert!(matches!(err, ForecastError::ConfigurationError(_)));
        assert!(err.to_string().contains("'CA'"));
    }

    #[test]
    fn test_zero_test_length_rejected() {
        let series = series(&["CA"], 4);
        assert!(matches!(
            ExogenousSplit.split(&series, 0),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
