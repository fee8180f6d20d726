//! Global LSTM over scaled lookback windows
//!
//! A region embedding is concatenated with the last hidden state of a
//! single-layer LSTM and fed through a two-layer head:
//!
//! ```text
//! h_L = LSTM(x_1..x_L)
//! yhat = W2 · relu(W1 · [h_L, emb(region)] + b1) + b2
//! ```
//!
//! Training minimizes the mean absolute error with Adam. Gradients are
//! computed by hand with backpropagation through time, and every random
//! draw (initial weights and the per-epoch shuffle) comes from one
//! generator seeded at the start of fitting.

use super::{ForecastModel, ForecastResult, ModelKind, TrainedForecastModel};
use crate::error::{ForecastError, Result};
use crate::windows::sequence::STEP_FEATURES;
use crate::windows::SequenceWindow;
use nalgebra::DMatrix;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Network and optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmParams {
    pub embedding_dim: usize,
    pub hidden_size: usize,
    pub head_size: usize,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for LstmParams {
    fn default() -> Self {
        Self {
            embedding_dim: 4,
            hidden_size: 32,
            head_size: 32,
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            epochs: 8,
            batch_size: 64,
        }
    }
}

impl LstmParams {
    fn validate(&self) -> Result<()> {
        let sizes = [
            ("embedding_dim", self.embedding_dim),
            ("hidden_size", self.hidden_size),
            ("head_size", self.head_size),
            ("batch_size", self.batch_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(ForecastError::InvalidParameter(format!(
                "{} must be greater than zero",
                name
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// LSTM adapter over [`SequenceWindows`](crate::windows::SequenceWindows) rows
#[derive(Debug, Clone)]
pub struct LstmAdapter {
    params: LstmParams,
    seed: u64,
}

impl LstmAdapter {
    /// Create an adapter; `seed` drives initialization and shuffling
    pub fn new(params: LstmParams, seed: u64) -> Self {
        Self { params, seed }
    }
}

impl Default for LstmAdapter {
    fn default() -> Self {
        Self::new(LstmParams::default(), 42)
    }
}

impl ForecastModel for LstmAdapter {
    type Row = SequenceWindow;
    type Trained = TrainedLstm;

    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn fit(&self, train: &[SequenceWindow]) -> Result<TrainedLstm> {
        self.params.validate()?;

        let mut regions: Vec<String> = train.iter().map(|w| w.region_id.clone()).collect();
        regions.sort();
        regions.dedup();

        let samples = train
            .iter()
            .map(|w| Ok((region_index(&regions, &w.region_id)?, w)))
            .collect::<Result<Vec<_>>>()?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut network = Network::init(regions.len(), &self.params, &mut rng)?;
        let mut adam = AdamState::new(&network);
        let mut order: Vec<usize> = (0..samples.len()).collect();

        for epoch in 0..self.params.epochs {
            order.shuffle(&mut rng);
            let mut total_loss = 0.0;

            for batch in order.chunks(self.params.batch_size) {
                let mut grads = network.zeros_like();
                let scale = 1.0 / batch.len() as f64;
                for &i in batch {
                    let (region, window) = samples[i];
                    let pass = network.forward(region, &window.inputs);
                    let error = pass.output - window.y;
                    total_loss += error.abs();
                    network.backward(&pass, region, sign(error) * scale, &mut grads);
                }
                adam.step(&mut network, &grads, &self.params);
            }

            let mean_loss = total_loss / samples.len() as f64;
            if !mean_loss.is_finite() {
                return Err(ForecastError::ModelFitError(format!(
                    "lstm: training loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            debug!(epoch = epoch + 1, loss = mean_loss, "lstm epoch");
        }

        Ok(TrainedLstm { regions, network })
    }
}

/// Trained network with its region vocabulary
#[derive(Debug, Clone)]
pub struct TrainedLstm {
    regions: Vec<String>,
    network: Network,
}

impl TrainedForecastModel for TrainedLstm {
    type Row = SequenceWindow;

    fn predict(&self, test: &[SequenceWindow]) -> Result<ForecastResult> {
        let values = test
            .iter()
            .map(|w| {
                let region = region_index(&self.regions, &w.region_id)?;
                Ok(self.network.forward(region, &w.inputs).output)
            })
            .collect::<Result<Vec<f64>>>()?;
        ForecastResult::new(values, test.len())
    }
}

fn region_index(regions: &[String], region: &str) -> Result<usize> {
    regions
        .binary_search_by(|r| r.as_str().cmp(region))
        .map_err(|_| {
            ForecastError::AlignmentError(format!(
                "lstm: region '{}' was not seen in training",
                region
            ))
        })
}

/// Derivative of `|x|`, zero at zero
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn column(values: Vec<f64>) -> DMatrix<f64> {
    DMatrix::from_vec(values.len(), 1, values)
}

fn segment(m: &DMatrix<f64>, start: usize, len: usize) -> DMatrix<f64> {
    m.rows(start, len).into_owned()
}

const NUM_TENSORS: usize = 8;

/// All trainable tensors. Biases are column matrices.
#[derive(Debug, Clone)]
struct Network {
    embedding: DMatrix<f64>,
    /// Gate weights stacked as `[input, forget, cell, output]`
    w_ih: DMatrix<f64>,
    w_hh: DMatrix<f64>,
    b: DMatrix<f64>,
    w1: DMatrix<f64>,
    b1: DMatrix<f64>,
    w2: DMatrix<f64>,
    b2: DMatrix<f64>,
}

struct StepCache {
    x: DMatrix<f64>,
    h_prev: DMatrix<f64>,
    c_prev: DMatrix<f64>,
    input: DMatrix<f64>,
    forget: DMatrix<f64>,
    cell: DMatrix<f64>,
    output: DMatrix<f64>,
    c: DMatrix<f64>,
}

struct ForwardPass {
    steps: Vec<StepCache>,
    features: DMatrix<f64>,
    pre_activation: DMatrix<f64>,
    activation: DMatrix<f64>,
    output: f64,
}

impl Network {
    fn init(num_regions: usize, params: &LstmParams, rng: &mut StdRng) -> Result<Self> {
        let (e, h, k) = (params.embedding_dim, params.hidden_size, params.head_size);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|err| ForecastError::ModelFitError(format!("lstm: {}", err)))?;
        let recurrent = Uniform::new_inclusive(-1.0 / (h as f64).sqrt(), 1.0 / (h as f64).sqrt());
        let hidden = Uniform::new_inclusive(-1.0 / ((h + e) as f64).sqrt(), 1.0 / ((h + e) as f64).sqrt());
        let head = Uniform::new_inclusive(-1.0 / (k as f64).sqrt(), 1.0 / (k as f64).sqrt());

        let mut draw = |rows: usize, cols: usize, dist: &dyn Fn(&mut StdRng) -> f64| {
            DMatrix::from_fn(rows, cols, |_, _| dist(&mut *rng))
        };
        Ok(Self {
            embedding: draw(num_regions, e, &|r| normal.sample(r)),
            w_ih: draw(4 * h, STEP_FEATURES, &|r| recurrent.sample(r)),
            w_hh: draw(4 * h, h, &|r| recurrent.sample(r)),
            b: draw(4 * h, 1, &|r| recurrent.sample(r)),
            w1: draw(k, h + e, &|r| hidden.sample(r)),
            b1: draw(k, 1, &|r| hidden.sample(r)),
            w2: draw(1, k, &|r| head.sample(r)),
            b2: draw(1, 1, &|r| head.sample(r)),
        })
    }

    fn hidden_size(&self) -> usize {
        self.w_hh.ncols()
    }

    fn zeros_like(&self) -> Self {
        let zeros = |m: &DMatrix<f64>| DMatrix::zeros(m.nrows(), m.ncols());
        Self {
            embedding: zeros(&self.embedding),
            w_ih: zeros(&self.w_ih),
            w_hh: zeros(&self.w_hh),
            b: zeros(&self.b),
            w1: zeros(&self.w1),
            b1: zeros(&self.b1),
            w2: zeros(&self.w2),
            b2: zeros(&self.b2),
        }
    }

    fn tensors(&self) -> [&DMatrix<f64>; NUM_TENSORS] {
        [
            &self.embedding,
            &self.w_ih,
            &self.w_hh,
            &self.b,
            &self.w1,
            &self.b1,
            &self.w2,
            &self.b2,
        ]
    }

    fn tensors_mut(&mut self) -> [&mut DMatrix<f64>; NUM_TENSORS] {
        [
            &mut self.embedding,
            &mut self.w_ih,
            &mut self.w_hh,
            &mut self.b,
            &mut self.w1,
            &mut self.b1,
            &mut self.w2,
            &mut self.b2,
        ]
    }

    fn forward(&self, region: usize, inputs: &[[f64; STEP_FEATURES]]) -> ForwardPass {
        let h_size = self.hidden_size();
        let mut h: DMatrix<f64> = DMatrix::zeros(h_size, 1);
        let mut c: DMatrix<f64> = DMatrix::zeros(h_size, 1);
        let mut steps = Vec::with_capacity(inputs.len());

        for step in inputs {
            let x = column(step.to_vec());
            let z = &self.w_ih * &x + &self.w_hh * &h + &self.b;
            let input = segment(&z, 0, h_size).map(sigmoid);
            let forget = segment(&z, h_size, h_size).map(sigmoid);
            let cell = segment(&z, 2 * h_size, h_size).map(f64::tanh);
            let output = segment(&z, 3 * h_size, h_size).map(sigmoid);

            let c_next = forget.component_mul(&c) + input.component_mul(&cell);
            let h_next = output.component_mul(&c_next.map(f64::tanh));
            steps.push(StepCache {
                x,
                h_prev: std::mem::replace(&mut h, h_next),
                c_prev: std::mem::replace(&mut c, c_next.clone()),
                input,
                forget,
                cell,
                output,
                c: c_next,
            });
        }

        let features = column(
            h.iter()
                .copied()
                .chain(self.embedding.row(region).iter().copied())
                .collect(),
        );
        let pre_activation = &self.w1 * &features + &self.b1;
        let activation = pre_activation.map(|v| v.max(0.0));
        let output = (&self.w2 * &activation)[(0, 0)] + self.b2[(0, 0)];

        ForwardPass {
            steps,
            features,
            pre_activation,
            activation,
            output,
        }
    }

    /// Accumulate the gradient of `d_output * yhat` into `grads`
    fn backward(&self, pass: &ForwardPass, region: usize, d_output: f64, grads: &mut Network) {
        if d_output == 0.0 {
            return;
        }
        let h_size = self.hidden_size();

        grads.w2 += pass.activation.transpose() * d_output;
        grads.b2[(0, 0)] += d_output;
        let d_activation = self.w2.transpose() * d_output;
        let d_pre = d_activation.zip_map(&pass.pre_activation, |d, a| if a > 0.0 { d } else { 0.0 });
        grads.w1 += &d_pre * pass.features.transpose();
        grads.b1 += &d_pre;

        let d_features = self.w1.transpose() * &d_pre;
        for j in 0..self.embedding.ncols() {
            grads.embedding[(region, j)] += d_features[(h_size + j, 0)];
        }

        let mut d_h = segment(&d_features, 0, h_size);
        let mut d_c_next: DMatrix<f64> = DMatrix::zeros(h_size, 1);
        for step in pass.steps.iter().rev() {
            let tanh_c = step.c.map(f64::tanh);
            let d_output_gate = d_h.component_mul(&tanh_c);
            let d_c = &d_c_next
                + d_h
                    .component_mul(&step.output)
                    .component_mul(&tanh_c.map(|t| 1.0 - t * t));

            let d_input = d_c.component_mul(&step.cell);
            let d_cell = d_c.component_mul(&step.input);
            let d_forget = d_c.component_mul(&step.c_prev);
            d_c_next = d_c.component_mul(&step.forget);

            let mut d_z: DMatrix<f64> = DMatrix::zeros(4 * h_size, 1);
            for j in 0..h_size {
                let (i, f, g, o) = (
                    step.input[(j, 0)],
                    step.forget[(j, 0)],
                    step.cell[(j, 0)],
                    step.output[(j, 0)],
                );
                d_z[(j, 0)] = d_input[(j, 0)] * i * (1.0 - i);
                d_z[(h_size + j, 0)] = d_forget[(j, 0)] * f * (1.0 - f);
                d_z[(2 * h_size + j, 0)] = d_cell[(j, 0)] * (1.0 - g * g);
                d_z[(3 * h_size + j, 0)] = d_output_gate[(j, 0)] * o * (1.0 - o);
            }

            grads.w_ih += &d_z * step.x.transpose();
            grads.w_hh += &d_z * step.h_prev.transpose();
            grads.b += &d_z;
            d_h = self.w_hh.transpose() * &d_z;
        }
    }
}

/// First and second moment estimates for every tensor of a [`Network`]
#[derive(Debug, Clone)]
struct AdamState {
    first: Network,
    second: Network,
    step: i32,
}

impl AdamState {
    fn new(network: &Network) -> Self {
        Self {
            first: network.zeros_like(),
            second: network.zeros_like(),
            step: 0,
        }
    }

    fn step(&mut self, network: &mut Network, grads: &Network, params: &LstmParams) {
        self.step += 1;
        let correction1 = 1.0 - params.beta1.powi(self.step);
        let correction2 = 1.0 - params.beta2.powi(self.step);

        let moments = self.first.tensors_mut().into_iter().zip(self.second.tensors_mut());
        for ((weights, grad), (m, v)) in network
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(moments)
        {
            for k in 0..weights.len() {
                m[k] = params.beta1 * m[k] + (1.0 - params.beta1) * grad[k];
                v[k] = params.beta2 * v[k] + (1.0 - params.beta2) * grad[k] * grad[k];
                let m_hat = m[k] / correction1;
                let v_hat = v[k] / correction2;
                weights[k] -= params.learning_rate * m_hat / (v_hat.sqrt() + params.epsilon);
            }
        }
    }
}
