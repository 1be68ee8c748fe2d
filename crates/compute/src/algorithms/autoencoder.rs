//! Dense autoencoder scored by reconstruction error.
//!
//! `in -> hidden -> encoding -> hidden -> in`, tanh on every hidden layer and
//! a linear output, trained with mini-batch Adam for a fixed number of epochs.

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use powerguard_core::config::AutoencoderConfig;
use powerguard_core::{FeatureVector, FEATURE_COUNT};

use super::{quantile, DetectorModel};
use crate::error::{DetectionError, DetectionResult};
use crate::pipeline::population::PopulationBaseline;

/// Percentile of training errors used as the decision offset.
const THRESHOLD_PERCENTILE: f64 = 95.0;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Fully connected layer, weights shaped `(n_in, n_out)`.
#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activate: bool,
}

impl Dense {
    /// Xavier/Glorot uniform initialisation.
    fn new(n_in: usize, n_out: usize, activate: bool, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit)),
            biases: Array1::zeros(n_out),
            activate,
        }
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let z = x.dot(&self.weights) + &self.biases;
        if self.activate {
            z.mapv(f64::tanh)
        } else {
            z
        }
    }
}

/// Per-layer gradients, and Adam moments, shaped like a layer.
#[derive(Debug, Clone)]
struct LayerState {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl LayerState {
    fn zeros(layer: &Dense) -> Self {
        Self {
            weights: Array2::zeros(layer.weights.raw_dim()),
            biases: Array1::zeros(layer.biases.len()),
        }
    }
}

/// Fitted network plus the scaler it was trained with.
#[derive(Debug, Clone)]
pub struct TrainedAutoencoder {
    layers: Vec<Dense>,
    scaler: PopulationBaseline,
    offset: f64,
    final_loss: f64,
}

impl TrainedAutoencoder {
    /// Mean training reconstruction error after the last epoch.
    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    fn reconstruct(&self, x: &Array2<f64>) -> Array2<f64> {
        self.layers
            .iter()
            .fold(x.clone(), |acc, layer| layer.forward(&acc))
    }

    fn errors(&self, x: &Array2<f64>) -> Array1<f64> {
        reconstruction_errors(x, &self.reconstruct(x))
    }
}

/// Mean squared error of each row.
fn reconstruction_errors(input: &Array2<f64>, output: &Array2<f64>) -> Array1<f64> {
    let cols = input.ncols().max(1) as f64;
    (output - input).mapv(|d| d * d).sum_axis(Axis(1)) / cols
}

fn to_matrix(rows: &[[f64; FEATURE_COUNT]]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| rows[i][j])
}

#[derive(Debug, Clone)]
pub struct AutoencoderDetector {
    config: AutoencoderConfig,
}

impl AutoencoderDetector {
    pub fn new(config: AutoencoderConfig) -> Self {
        Self { config }
    }

    fn init_layers(&self, rng: &mut StdRng) -> Vec<Dense> {
        let hidden = self.config.hidden_dim.max(1);
        let encoding = self.config.encoding_dim.max(1);
        vec![
            Dense::new(FEATURE_COUNT, hidden, true, rng),
            Dense::new(hidden, encoding, true, rng),
            Dense::new(encoding, hidden, true, rng),
            Dense::new(hidden, FEATURE_COUNT, false, rng),
        ]
    }
}

/// Gradients of the mini-batch mean reconstruction error, one per layer.
fn backprop(layers: &[Dense], x: &Array2<f64>) -> Vec<LayerState> {
    // acts[l] is the input to layer l; acts[last] is the reconstruction.
    let mut acts = Vec::with_capacity(layers.len() + 1);
    acts.push(x.clone());
    for (l, layer) in layers.iter().enumerate() {
        let next = layer.forward(&acts[l]);
        acts.push(next);
    }

    let scale = 2.0 / x.len().max(1) as f64;
    let mut delta = (&acts[layers.len()] - x) * scale;
    let mut grads = Vec::with_capacity(layers.len());

    for l in (0..layers.len()).rev() {
        let a_prev = &acts[l];
        grads.push(LayerState {
            weights: a_prev.t().dot(&delta),
            biases: delta.sum_axis(Axis(0)),
        });

        if l > 0 {
            // Layer l-1 is a tanh layer: d tanh = 1 - a^2.
            delta = delta.dot(&layers[l].weights.t()) * a_prev.mapv(|a| 1.0 - a * a);
        }
    }

    grads.reverse();
    grads
}

struct Adam {
    lr: f64,
    step: i32,
    first: Vec<LayerState>,
    second: Vec<LayerState>,
}

impl Adam {
    fn new(layers: &[Dense], lr: f64) -> Self {
        Self {
            lr,
            step: 0,
            first: layers.iter().map(LayerState::zeros).collect(),
            second: layers.iter().map(LayerState::zeros).collect(),
        }
    }

    fn update(&mut self, layers: &mut [Dense], grads: &[LayerState]) {
        self.step += 1;
        let bias_fix = (1.0 - ADAM_BETA1.powi(self.step), 1.0 - ADAM_BETA2.powi(self.step));
        let lr = self.lr;

        let moments = self.first.iter_mut().zip(self.second.iter_mut());
        for ((layer, grad), (m, v)) in layers.iter_mut().zip(grads).zip(moments) {
            adam_step(&mut layer.weights, &grad.weights, &mut m.weights, &mut v.weights, lr, bias_fix);
            adam_step(&mut layer.biases, &grad.biases, &mut m.biases, &mut v.biases, lr, bias_fix);
        }
    }
}

/// One Adam step over a parameter array; `bias_fix` holds the two moment corrections.
fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
    bias_fix: (f64, f64),
) {
    let (c1, c2) = bias_fix;
    m.mapv_inplace(|x| x * ADAM_BETA1);
    m.scaled_add(1.0 - ADAM_BETA1, grad);
    v.mapv_inplace(|x| x * ADAM_BETA2);
    v.scaled_add(1.0 - ADAM_BETA2, &grad.mapv(|g| g * g));

    Zip::from(param).and(&*m).and(&*v).for_each(|p, &mk, &vk| {
        *p -= lr * (mk / c1) / ((vk / c2).sqrt() + ADAM_EPS);
    });
}

impl DetectorModel for AutoencoderDetector {
    type Trained = TrainedAutoencoder;

    fn fit(&self, batch: &[FeatureVector]) -> DetectionResult<TrainedAutoencoder> {
        if batch.is_empty() {
            return Err(DetectionError::Training("autoencoder needs at least one sample".into()));
        }

        let scaler = PopulationBaseline::from_vectors(batch);
        let x = to_matrix(&scaler.standardize_all(batch));

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut layers = self.init_layers(&mut rng);
        let mut adam = Adam::new(&layers, self.config.learning_rate);

        let batch_size = self.config.batch_size.max(1);
        let mut order: Vec<usize> = (0..x.nrows()).collect();

        for _epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            for chunk in order.chunks(batch_size) {
                let grads = backprop(&layers, &x.select(Axis(0), chunk));
                adam.update(&mut layers, &grads);
            }
        }

        let mut trained = TrainedAutoencoder {
            layers,
            scaler,
            offset: 0.0,
            final_loss: 0.0,
        };

        let errors = trained.errors(&x).to_vec();
        if errors.iter().any(|e| !e.is_finite()) {
            return Err(DetectionError::Training(
                "autoencoder diverged (non-finite reconstruction error)".into(),
            ));
        }
        trained.final_loss = errors.iter().sum::<f64>() / errors.len() as f64;
        trained.offset = quantile(&errors, THRESHOLD_PERCENTILE / 100.0);

        Ok(trained)
    }

    fn score(&self, trained: &TrainedAutoencoder, batch: &[FeatureVector]) -> Vec<f64> {
        let x = to_matrix(&trained.scaler.standardize_all(batch));
        trained.errors(&x).to_vec()
    }

    fn decision_offset(&self, trained: &TrainedAutoencoder) -> f64 {
        trained.offset
    }
}
