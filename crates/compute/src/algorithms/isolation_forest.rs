//! Isolation forest over standardised feature vectors.
//!
//! Anomalies are isolated by fewer random axis-aligned splits, so a shorter
//! expected path length means a higher score.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use powerguard_core::config::IsolationForestConfig;
use powerguard_core::{FeatureVector, FEATURE_COUNT};

use super::{quantile, DetectorModel};
use crate::error::{DetectionError, DetectionResult};
use crate::pipeline::population::PopulationBaseline;

const EULER_GAMMA: f64 = 0.5772156649;

type Row = [f64; FEATURE_COUNT];

/// Isolation tree node.
#[derive(Debug, Clone)]
enum IsolationTree {
    Internal {
        feature: usize,
        threshold: f64,
        /// Values below the threshold.
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
    External {
        size: usize,
    },
}

impl IsolationTree {
    fn build(rows: &[Row], indices: &[usize], height: usize, max_height: usize, rng: &mut StdRng) -> Self {
        let n = indices.len();
        if height >= max_height || n <= 1 {
            return IsolationTree::External { size: n };
        }

        // Only features with spread in this node can split it.
        let mut candidates: Vec<(usize, f64, f64)> = Vec::with_capacity(FEATURE_COUNT);
        for feature in 0..FEATURE_COUNT {
            let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(rows[i][feature]), hi.max(rows[i][feature]))
            });
            if max > min {
                candidates.push((feature, min, max));
            }
        }
        if candidates.is_empty() {
            return IsolationTree::External { size: n };
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min..max);

        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| rows[i][feature] < threshold);
        if left.is_empty() || right.is_empty() {
            return IsolationTree::External { size: n };
        }

        IsolationTree::Internal {
            feature,
            threshold,
            left: Box::new(Self::build(rows, &left, height + 1, max_height, rng)),
            right: Box::new(Self::build(rows, &right, height + 1, max_height, rng)),
        }
    }

    fn path_length(&self, sample: &Row, depth: usize) -> f64 {
        match self {
            IsolationTree::External { size } => depth as f64 + average_path_length(*size),
            IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted forest plus the scaler it was trained with.
#[derive(Debug, Clone)]
pub struct TrainedForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    scaler: PopulationBaseline,
    offset: f64,
}

impl TrainedForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    fn score_row(&self, row: &Row) -> f64 {
        let c = average_path_length(self.sample_size);
        if c <= 0.0 || self.trees.is_empty() {
            return 0.5;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(row, 0)).sum::<f64>() / self.trees.len() as f64;
        2.0_f64.powf(-mean_path / c)
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForestDetector {
    config: IsolationForestConfig,
}

impl IsolationForestDetector {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self { config }
    }
}

impl DetectorModel for IsolationForestDetector {
    type Trained = TrainedForest;

    fn fit(&self, batch: &[FeatureVector]) -> DetectionResult<TrainedForest> {
        if batch.is_empty() {
            return Err(DetectionError::Training("isolation forest needs at least one sample".into()));
        }

        let scaler = PopulationBaseline::from_vectors(batch);
        let rows = scaler.standardize_all(batch);
        let n = rows.len();
        let sample_size = self.config.max_samples.max(1).min(n);
        let max_height = (sample_size as f64).log2().ceil() as usize;
        let seed = self.config.seed;

        // Per-tree RNG keeps the forest identical for any thread count.
        let trees: Vec<IsolationTree> = (0..self.config.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::build(&rows, &sample, 0, max_height, &mut rng)
            })
            .collect();

        let mut trained = TrainedForest {
            trees,
            sample_size,
            scaler,
            offset: 0.0,
        };

        let training_scores: Vec<f64> = rows.par_iter().map(|r| trained.score_row(r)).collect();
        let contamination = self.config.contamination.clamp(f64::EPSILON, 0.5);
        trained.offset = quantile(&training_scores, 1.0 - contamination);

        Ok(trained)
    }

    fn score(&self, trained: &TrainedForest, batch: &[FeatureVector]) -> Vec<f64> {
        let rows = trained.scaler.standardize_all(batch);
        rows.par_iter().map(|r| trained.score_row(r)).collect()
    }

    fn decision_offset(&self, trained: &TrainedForest) -> f64 {
        trained.offset
    }
}
