//! # Weekly Demand
//!
//! `weekly_demand` bundles the crates of the weekly regional demand
//! forecasting workspace.
//!
//! - [`forecast`]: series building, windowing, models, evaluation and export
//! - [`math`]: numeric building blocks used by the models and features
//!
//! ## Example
//!
//! ```
//! use weekly_demand::forecast::{wape, ModelKind};
//!
//! let y_true = [120.0, 80.0];
//! let y_pred = [110.0, 90.0];
//! assert!((wape(&y_true, &y_pred).unwrap() - 0.1).abs() < 1e-12);
//! assert_eq!(ModelKind::Lgbm.forecast_column(), "yhat_lgbm");
//! ```

pub use demand_forecast as forecast;
pub use demand_math as math;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        assert_eq!(forecast::PipelineConfig::default().test_weeks, 8);
        let lags = math::moving_averages::lagged(&[1.0, 2.0, 3.0], 1).unwrap();
        assert_eq!(lags, vec![None, Some(1.0), Some(2.0)]);
    }
}
