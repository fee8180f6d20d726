//! Gradient-boosted regression trees with a Poisson objective
//!
//! One global model over every region's lag features. Trees grow leaf-wise:
//! each step splits the leaf with the largest gain until the leaf budget is
//! spent or no leaf can be split. Raw scores live on the log scale and
//! predictions are `exp(score)`.

use super::{ForecastModel, ForecastResult, ModelKind, TrainedForecastModel};
use crate::error::{ForecastError, Result};
use crate::windows::{FeatureWindow, WindowRow};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Boosting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Number of boosting rounds
    pub num_rounds: usize,
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Minimum rows in a leaf
    pub min_data_in_leaf: usize,
    /// L2 penalty on leaf values
    pub lambda_l2: f64,
    /// Minimum hessian sum in a leaf
    pub min_sum_hessian_in_leaf: f64,
    /// Added to the raw score when computing the Poisson hessian
    pub max_delta_step: f64,
    /// Fraction of rows sampled per round
    pub bagging_fraction: f64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            num_rounds: 600,
            num_leaves: 31,
            min_data_in_leaf: 20,
            lambda_l2: 0.0,
            min_sum_hessian_in_leaf: 1e-3,
            max_delta_step: 0.7,
            bagging_fraction: 1.0,
        }
    }
}

impl GbmParams {
    fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.num_leaves < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "a tree needs at least 2 leaves, got {}",
                self.num_leaves
            )));
        }
        if self.min_data_in_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_data_in_leaf must be greater than zero".to_string(),
            ));
        }
        if self.bagging_fraction.is_nan()
            || self.bagging_fraction <= 0.0
            || self.bagging_fraction > 1.0
        {
            return Err(ForecastError::InvalidParameter(format!(
                "bagging fraction must be in (0, 1], got {}",
                self.bagging_fraction
            )));
        }
        Ok(())
    }
}

/// Poisson GBM adapter over [`LagFeatures`](crate::windows::LagFeatures) rows
#[derive(Debug, Clone)]
pub struct GbmAdapter {
    params: GbmParams,
    seed: u64,
}

impl GbmAdapter {
    /// Create an adapter; `seed` drives row subsampling
    pub fn new(params: GbmParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Default for GbmAdapter {
    fn default() -> Self {
        Self::new(GbmParams::default(), 42)
    }
}

impl ForecastModel for GbmAdapter {
    type Row = FeatureWindow;
    type Trained = TrainedGbm;

    fn kind(&self) -> ModelKind {
        ModelKind::Lgbm
    }

    fn fit(&self, train: &[FeatureWindow]) -> Result<TrainedGbm> {
        self.params.validate()?;
        if let Some(bad) = train.iter().find(|r| !r.y.is_finite() || r.y < 0.0) {
            return Err(ForecastError::ModelFitError(format!(
                "lgbm: region '{}' week {} has target {}, poisson needs y >= 0",
                bad.region_id, bad.week_key, bad.y
            )));
        }

        let mut regions: Vec<String> = train.iter().map(|r| r.region_id.clone()).collect();
        regions.sort();
        regions.dedup();

        let x: Vec<Vec<f64>> = train
            .iter()
            .map(|r| design_row(&regions, r))
            .collect::<Result<_>>()?;
        let y: Vec<f64> = train.iter().map(|r| r.y).collect();

        let mean_y = y.iter().sum::<f64>() / y.len() as f64;
        if mean_y <= 0.0 {
            return Err(ForecastError::ModelFitError(
                "lgbm: every training target is zero".to_string(),
            ));
        }
        let init_score = mean_y.ln();

        let builder = TreeBuilder {
            params: &self.params,
            x: &x,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut scores = vec![init_score; y.len()];
        let mut trees = Vec::with_capacity(self.params.num_rounds);

        for round in 0..self.params.num_rounds {
            let grad: Vec<f64> = scores.iter().zip(&y).map(|(s, y)| s.exp() - y).collect();
            let hess: Vec<f64> = scores
                .iter()
                .map(|s| (s + self.params.max_delta_step).exp())
                .collect();

            let rows = if self.params.bagging_fraction < 1.0 {
                let amount = ((y.len() as f64 * self.params.bagging_fraction).ceil() as usize).max(1);
                let mut sampled = index::sample(&mut rng, y.len(), amount).into_vec();
                sampled.sort_unstable();
                sampled
            } else {
                (0..y.len()).collect()
            };

            let tree = builder.build(&grad, &hess, rows);
            for (score, features) in scores.iter_mut().zip(&x) {
                *score += tree.predict(features);
            }
            if round % 100 == 0 {
                debug!(round, leaves = tree.num_leaves(), "boosting round");
            }
            trees.push(tree);
        }

        Ok(TrainedGbm {
            regions,
            init_score,
            trees,
        })
    }
}

/// Fitted tree ensemble
#[derive(Debug, Clone)]
pub struct TrainedGbm {
    regions: Vec<String>,
    init_score: f64,
    trees: Vec<RegressionTree>,
}

impl TrainedGbm {
    /// Raw log-scale score of one design row
    fn raw_score(&self, features: &[f64]) -> f64 {
        self.init_score + self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl TrainedForecastModel for TrainedGbm {
    type Row = FeatureWindow;

    fn predict(&self, test: &[FeatureWindow]) -> Result<ForecastResult> {
        let values = test
            .iter()
            .map(|row| Ok(self.raw_score(&design_row(&self.regions, row)?).exp()))
            .collect::<Result<Vec<f64>>>()?;
        ForecastResult::new(values, test.len())
    }
}

/// `[region one-hot.., features..]`
fn design_row(regions: &[String], row: &FeatureWindow) -> Result<Vec<f64>> {
    let position = regions
        .binary_search_by(|r| r.as_str().cmp(row.region_id()))
        .map_err(|_| {
            ForecastError::AlignmentError(format!(
                "lgbm: region '{}' was not seen in training",
                row.region_id
            ))
        })?;

    let mut design = vec![0.0; regions.len()];
    design[position] = 1.0;
    design.extend_from_slice(&row.features());
    Ok(design)
}

/// Tree stored as parallel arrays. A negative child `c` points at leaf `-c - 1`.
#[derive(Debug, Clone)]
struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
}

impl RegressionTree {
    fn num_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    fn predict(&self, features: &[f64]) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default();
        }

        let mut node = 0usize;
        loop {
            let child = if features[self.split_features[node]] <= self.thresholds[node] {
                self.left_child[node]
            } else {
                self.right_child[node]
            };
            if child < 0 {
                return self.leaf_values[(-child - 1) as usize];
            }
            node = child as usize;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Leaf {
    rows: Vec<usize>,
    /// Internal node pointing at this leaf, and whether it is the left child
    parent: Option<(usize, bool)>,
    best: Option<SplitCandidate>,
}

struct TreeBuilder<'a> {
    params: &'a GbmParams,
    x: &'a [Vec<f64>],
}

impl TreeBuilder<'_> {
    fn build(&self, grad: &[f64], hess: &[f64], rows: Vec<usize>) -> RegressionTree {
        let mut tree = RegressionTree {
            split_features: Vec::new(),
            thresholds: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_values: Vec::new(),
        };

        let best = self.best_split(grad, hess, &rows);
        let mut leaves = vec![Leaf {
            rows,
            parent: None,
            best,
        }];

        while leaves.len() < self.params.num_leaves {
            let chosen = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|b| (i, b)))
                .fold(None, |acc: Option<(usize, SplitCandidate)>, (i, b)| match acc {
                    Some((_, a)) if a.gain >= b.gain => acc,
                    _ => Some((i, b)),
                });
            let Some((leaf_idx, split)) = chosen else {
                break;
            };

            let node = tree.split_features.len();
            tree.split_features.push(split.feature);
            tree.thresholds.push(split.threshold);
            tree.left_child.push(-1);
            tree.right_child.push(-1);
            link(&mut tree, leaves[leaf_idx].parent, node as i32);

            let rows = std::mem::take(&mut leaves[leaf_idx].rows);
            let (left, right): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&r| self.x[r][split.feature] <= split.threshold);

            let left_best = self.best_split(grad, hess, &left);
            let right_best = self.best_split(grad, hess, &right);
            leaves[leaf_idx] = Leaf {
                rows: left,
                parent: Some((node, true)),
                best: left_best,
            };
            leaves.push(Leaf {
                rows: right,
                parent: Some((node, false)),
                best: right_best,
            });
        }

        for (i, leaf) in leaves.iter().enumerate() {
            let (g, h) = sums(grad, hess, &leaf.rows);
            tree.leaf_values
                .push(-g / (h + self.params.lambda_l2) * self.params.learning_rate);
            link(&mut tree, leaf.parent, -(i as i32) - 1);
        }
        tree
    }

    fn best_split(&self, grad: &[f64], hess: &[f64], rows: &[usize]) -> Option<SplitCandidate> {
        let min_data = self.params.min_data_in_leaf;
        if rows.len() < 2 * min_data {
            return None;
        }

        let lambda = self.params.lambda_l2;
        let (g_total, h_total) = sums(grad, hess, rows);
        let parent_score = g_total * g_total / (h_total + lambda);
        let num_features = self.x[rows[0]].len();
        let mut best: Option<SplitCandidate> = None;
        let mut order = rows.to_vec();

        for feature in 0..num_features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                g_left += grad[order[k]];
                h_left += hess[order[k]];

                let (value, next) = (self.x[order[k]][feature], self.x[order[k + 1]][feature]);
                let (n_left, n_right) = (k + 1, order.len() - k - 1);
                if value == next || n_left < min_data || n_right < min_data {
                    continue;
                }
                let (g_right, h_right) = (g_total - g_left, h_total - h_left);
                if h_left < self.params.min_sum_hessian_in_leaf
                    || h_right < self.params.min_sum_hessian_in_leaf
                {
                    continue;
                }

                let gain = g_left * g_left / (h_left + lambda)
                    + g_right * g_right / (h_right + lambda)
                    - parent_score;
                if gain > best.map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn sums(grad: &[f64], hess: &[f64], rows: &[usize]) -> (f64, f64) {
    rows.iter()
        .fold((0.0, 0.0), |(g, h), &r| (g + grad[r], h + hess[r]))
}

fn link(tree: &mut RegressionTree, parent: Option<(usize, bool)>, child: i32) {
    match parent {
        Some((node, true)) => tree.left_child[node] = child,
        Some((node, false)) => tree.right_child[node] = child,
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forecast_split;
    use crate::windows::test_support::series;
    use crate::windows::{LagFeatures, WindowingStrategy};
    use approx::assert_relative_eq;

    fn small_params() -> GbmParams {
        GbmParams {
            num_rounds: 50,
            min_data_in_leaf: 3,
            num_leaves: 4,
            ..GbmParams::default()
        }
    }

    #[test]
    fn test_tree_navigation() {
        let tree = RegressionTree {
            split_features: vec![0, 1],
            thresholds: vec![0.5, 2.0],
            left_child: vec![-1, -2],
            right_child: vec![1, -3],
            leaf_values: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(tree.predict(&[0.0, 10.0]), 1.0);
        assert_eq!(tree.predict(&[1.0, 1.0]), 2.0);
        assert_eq!(tree.predict(&[1.0, 3.0]), 3.0);
    }

    #[test]
    fn test_no_split_predicts_mean() {
        // too few rows for any split: the model is exp(ln(mean y))
        let series = series(&["CA"], 20);
        let split = LagFeatures.split(&series, 4).unwrap();
        let trained = GbmAdapter::default().fit(&split.train).unwrap();
        let mean = split.train.iter().map(|r| r.y).sum::<f64>() / split.train.len() as f64;

        let forecast = trained.predict(&split.test).unwrap();
        for value in forecast.values() {
            assert_relative_eq!(*value, mean, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_boosting_reduces_training_error() {
        let series = series(&["CA", "TX"], 40);
        let split = LagFeatures.split(&series, 4).unwrap();
        let trained = GbmAdapter::new(small_params(), 42).fit(&split.train).unwrap();
        assert_eq!(trained.num_trees(), 50);

        let mean = split.train.iter().map(|r| r.y).sum::<f64>() / split.train.len() as f64;
        let baseline: f64 = split.train.iter().map(|r| (r.y - mean).abs()).sum();
        let fitted = trained.predict(&split.train).unwrap();
        let boosted: f64 = split
            .train
            .iter()
            .zip(fitted.values())
            .map(|(r, yhat)| (r.y - yhat).abs())
            .sum();
        assert!(boosted < baseline);
    }

    #[test]
    fn test_bagging_is_seeded() {
        let series = series(&["CA", "TX"], 40);
        let split = LagFeatures.split(&series, 4).unwrap();
        let params = GbmParams {
            bagging_fraction: 0.7,
            ..small_params()
        };

        let first = forecast_split(&GbmAdapter::new(params.clone(), 7), &split).unwrap();
        let second = forecast_split(&GbmAdapter::new(params, 7), &split).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unseen_region_is_alignment_error() {
        let train = LagFeatures.split(&series(&["CA"], 20), 4).unwrap();
        let test = LagFeatures.split(&series(&["WI"], 20), 4).unwrap();
        let trained = GbmAdapter::new(small_params(), 42).fit(&train.train).unwrap();
        assert!(matches!(
            trained.predict(&test.test),
            Err(ForecastError::AlignmentError(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let params = GbmParams {
            bagging_fraction: 0.0,
            ..GbmParams::default()
        };
        let split = LagFeatures.split(&series(&["CA"], 20), 4).unwrap();
        assert!(GbmAdapter::new(params, 42).fit(&split.train).is_err());
    }
}
