//! Regression with ARIMA(1,1,1) errors, one model per region
//!
//! The differenced target follows
//!
//! ```text
//! Δy_t = β·ΔX_t + n_t
//! n_t  = φ n_{t-1} + θ e_{t-1} + e_t
//! ```
//!
//! with `X = [snap, event_flag]` and no constant. `β` starts from a ridge
//! least-squares fit of `Δy` on `ΔX`, then `(β, φ, θ)` are refined together
//! by minimizing the conditional sum of squared innovations.

use super::{indices_by_region, ForecastModel, ForecastResult, ModelKind, TrainedForecastModel};
use crate::data::WeeklySeriesPoint;
use crate::error::{ForecastError, Result};
use demand_math::optimization::{nelder_mead, NelderMeadConfig};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of exogenous regressors
const NUM_REGRESSORS: usize = 2;
/// Largest magnitude allowed for φ and θ
const COEFFICIENT_BOUND: f64 = 0.99;
/// Fewest train weeks a region needs
pub const MIN_TRAIN_LENGTH: usize = 4;

/// Estimation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SarimaxParams {
    /// Simplex search used for the sum-of-squares fit
    pub optimizer: NelderMeadConfig,
    /// Ridge term added to the normal equations of the initial `β`
    pub ridge: f64,
    /// Starting value for φ and θ
    pub initial_arma: f64,
}

impl Default for SarimaxParams {
    fn default() -> Self {
        Self {
            optimizer: NelderMeadConfig::default(),
            ridge: 1e-6,
            initial_arma: 0.1,
        }
    }
}

/// ARIMAX adapter over [`ExogenousSplit`](crate::windows::ExogenousSplit) rows
#[derive(Debug, Clone, Default)]
pub struct SarimaxAdapter {
    params: SarimaxParams,
}

impl SarimaxAdapter {
    /// Create an adapter with the given settings
    pub fn new(params: SarimaxParams) -> Self {
        Self { params }
    }

    fn fit_region(&self, region: &str, points: &[&WeeklySeriesPoint]) -> Result<RegionFit> {
        if points.len() < MIN_TRAIN_LENGTH {
            return Err(ForecastError::ModelFitError(format!(
                "sarimax: region '{}' has {} train weeks, needs at least {}",
                region,
                points.len(),
                MIN_TRAIN_LENGTH
            )));
        }

        let dy: Vec<f64> = points.windows(2).map(|w| w[1].y - w[0].y).collect();
        let dx: Vec<[f64; NUM_REGRESSORS]> = points
            .windows(2)
            .map(|w| {
                let (prev, next) = (w[0].regressors(), w[1].regressors());
                [next[0] - prev[0], next[1] - prev[1]]
            })
            .collect();

        let beta = ridge_regression(&dx, &dy, self.params.ridge).ok_or_else(|| {
            ForecastError::ModelFitError(format!(
                "sarimax: region '{}' regression is singular",
                region
            ))
        })?;

        let initial = [beta[0], beta[1], self.params.initial_arma, self.params.initial_arma];
        let bounds = [
            (f64::NEG_INFINITY, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
            (-COEFFICIENT_BOUND, COEFFICIENT_BOUND),
            (-COEFFICIENT_BOUND, COEFFICIENT_BOUND),
        ];
        let objective = |p: &[f64]| innovations(&dx, &dy, p).css;
        let minimum = nelder_mead(objective, &initial, Some(&bounds[..]), &self.params.optimizer)?;

        if minimum.point.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::ModelFitError(format!(
                "sarimax: region '{}' estimated non-finite parameters",
                region
            )));
        }

        let state = innovations(&dx, &dy, &minimum.point);
        let last = points[points.len() - 1];
        let fit = RegionFit {
            beta: [minimum.point[0], minimum.point[1]],
            phi: minimum.point[2],
            theta: minimum.point[3],
            last_y: last.y,
            last_x: last.regressors(),
            last_noise: state.last_noise,
            last_innovation: state.last_innovation,
        };

        debug!(
            region,
            phi = fit.phi,
            theta = fit.theta,
            css = state.css,
            iterations = minimum.iterations,
            converged = minimum.converged,
            "fitted arimax"
        );
        Ok(fit)
    }
}

impl ForecastModel for SarimaxAdapter {
    type Row = WeeklySeriesPoint;
    type Trained = TrainedSarimax;

    fn kind(&self) -> ModelKind {
        ModelKind::Sarimax
    }

    fn fit(&self, train: &[WeeklySeriesPoint]) -> Result<TrainedSarimax> {
        let mut fits = BTreeMap::new();
        for (region, indices) in indices_by_region(train) {
            let points: Vec<&WeeklySeriesPoint> = indices.iter().map(|&i| &train[i]).collect();
            let fit = self.fit_region(&region, &points)?;
            fits.insert(region, fit);
        }
        Ok(TrainedSarimax { fits })
    }
}

/// Fitted state of one region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFit {
    pub beta: [f64; NUM_REGRESSORS],
    pub phi: f64,
    pub theta: f64,
    last_y: f64,
    last_x: [f64; NUM_REGRESSORS],
    last_noise: f64,
    last_innovation: f64,
}

impl RegionFit {
    /// Forecast one step per entry of `future_x`, starting after the last train week
    pub fn forecast(&self, future_x: &[[f64; NUM_REGRESSORS]]) -> Vec<f64> {
        let mut forecasts = Vec::with_capacity(future_x.len());
        let mut prev_y = self.last_y;
        let mut prev_x = self.last_x;
        let mut noise = self.last_noise;
        let mut innovation = self.last_innovation;

        for x in future_x {
            noise = self.phi * noise + self.theta * innovation;
            // future innovations have zero expectation
            innovation = 0.0;
            let y = prev_y
                + self.beta[0] * (x[0] - prev_x[0])
                + self.beta[1] * (x[1] - prev_x[1])
                + noise;
            forecasts.push(y);
            prev_y = y;
            prev_x = *x;
        }
        forecasts
    }
}

/// Per-region ARIMAX fits
#[derive(Debug, Clone)]
pub struct TrainedSarimax {
    fits: BTreeMap<String, RegionFit>,
}

impl TrainedSarimax {
    /// Fit of one region, if it was trained
    pub fn region(&self, region: &str) -> Option<&RegionFit> {
        self.fits.get(region)
    }
}

impl TrainedForecastModel for TrainedSarimax {
    type Row = WeeklySeriesPoint;

    fn predict(&self, test: &[WeeklySeriesPoint]) -> Result<ForecastResult> {
        let mut values = vec![0.0; test.len()];
        for (region, indices) in indices_by_region(test) {
            let fit = self.fits.get(&region).ok_or_else(|| {
                ForecastError::AlignmentError(format!(
                    "sarimax: no fitted model for region '{}'",
                    region
                ))
            })?;
            let future_x: Vec<_> = indices.iter().map(|&i| test[i].regressors()).collect();
            for (&i, yhat) in indices.iter().zip(fit.forecast(&future_x)) {
                if !yhat.is_finite() {
                    return Err(ForecastError::ModelFitError(format!(
                        "sarimax: region '{}' produced a non-finite forecast",
                        region
                    )));
                }
                values[i] = yhat;
            }
        }
        ForecastResult::new(values, test.len())
    }
}

struct Innovations {
    css: f64,
    last_noise: f64,
    last_innovation: f64,
}

/// Run the ARMA(1,1) recursion over the regression noise of `dy`
fn innovations(dx: &[[f64; NUM_REGRESSORS]], dy: &[f64], params: &[f64]) -> Innovations {
    let (beta, phi, theta) = ([params[0], params[1]], params[2], params[3]);
    let mut css = 0.0;
    let mut prev_noise = 0.0;
    let mut prev_innovation = 0.0;

    for (t, (x, y)) in dx.iter().zip(dy).enumerate() {
        let noise = y - beta[0] * x[0] - beta[1] * x[1];
        let innovation = if t == 0 {
            0.0
        } else {
            noise - phi * prev_noise - theta * prev_innovation
        };
        css += innovation * innovation;
        prev_noise = noise;
        prev_innovation = innovation;
    }

    Innovations {
        css,
        last_noise: prev_noise,
        last_innovation: prev_innovation,
    }
}

fn ridge_regression(
    dx: &[[f64; NUM_REGRESSORS]],
    dy: &[f64],
    ridge: f64,
) -> Option<[f64; NUM_REGRESSORS]> {
    let design = DMatrix::from_fn(dx.len(), NUM_REGRESSORS, |r, c| dx[r][c]);
    let target = DVector::from_column_slice(dy);
    let gram = design.transpose() * &design + DMatrix::identity(NUM_REGRESSORS, NUM_REGRESSORS) * ridge;
    let rhs = design.transpose() * target;
    gram.lu()
        .solve(&rhs)
        .filter(|b| b.iter().all(|v| v.is_finite()))
        .map(|b| [b[0], b[1]])
}
