//! Unsupervised detector variants.
//!
//! Both are trained fresh on every run and share one raw-score polarity:
//! higher means more anomalous.

pub mod autoencoder;
pub mod isolation_forest;

use powerguard_core::{Config, FeatureVector, ModelKind};

use crate::error::DetectionResult;

pub use autoencoder::{AutoencoderDetector, TrainedAutoencoder};
pub use isolation_forest::{IsolationForestDetector, TrainedForest};

/// Fit/score capability shared by every detector variant.
pub trait DetectorModel {
    /// Run-scoped trained state. Never shared between runs.
    type Trained;

    fn fit(&self, batch: &[FeatureVector]) -> DetectionResult<Self::Trained>;

    /// Raw scores, one per input vector, in input order.
    fn score(&self, trained: &Self::Trained, batch: &[FeatureVector]) -> Vec<f64>;

    /// Raw score above which the fitted model itself calls a sample an outlier.
    fn decision_offset(&self, trained: &Self::Trained) -> f64;
}

/// Raw scores of one run plus the fitted decision offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub raw: Vec<f64>,
    pub offset: f64,
}

impl ScoredBatch {
    /// Scores strictly above the fitted offset.
    pub fn outliers(&self) -> usize {
        self.raw.iter().filter(|s| **s > self.offset).count()
    }
}

/// Detector selected for a run, resolved from the model identifier.
#[derive(Debug, Clone)]
pub enum Detector {
    IsolationForest(IsolationForestDetector),
    Autoencoder(AutoencoderDetector),
}

impl Detector {
    pub fn for_model(kind: ModelKind, config: &Config) -> Self {
        match kind {
            ModelKind::IsolationForest => {
                Detector::IsolationForest(IsolationForestDetector::new(config.isolation_forest.clone()))
            }
            ModelKind::Autoencoder => {
                Detector::Autoencoder(AutoencoderDetector::new(config.autoencoder.clone()))
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Detector::IsolationForest(_) => ModelKind::IsolationForest,
            Detector::Autoencoder(_) => ModelKind::Autoencoder,
        }
    }

    /// Fit on `training`, then score `targets`.
    pub fn fit_score(
        &self,
        training: &[FeatureVector],
        targets: &[FeatureVector],
    ) -> DetectionResult<ScoredBatch> {
        match self {
            Detector::IsolationForest(d) => run(d, training, targets),
            Detector::Autoencoder(d) => run(d, training, targets),
        }
    }
}

fn run<D: DetectorModel>(
    detector: &D,
    training: &[FeatureVector],
    targets: &[FeatureVector],
) -> DetectionResult<ScoredBatch> {
    let trained = detector.fit(training)?;
    Ok(ScoredBatch {
        raw: detector.score(&trained, targets),
        offset: detector.decision_offset(&trained),
    })
}

/// Linear-interpolated quantile, `q` in [0, 1]. NaN values are ignored.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
