//! Population-level statistics over a batch of feature vectors.
//!
//! The same baseline feeds detector standardisation and explanation z-scores.

use powerguard_core::config::FeatureConfig;
use powerguard_core::{FeatureVector, FEATURE_COUNT};

/// Standard deviations at or below this are treated as "no spread".
pub const EPS: f64 = 1e-9;

/// Per-feature mean and standard deviation of one run's batch.
///
/// Stddevs are the population form (divide by n) and are not floored;
/// a feature at or below `EPS` standardizes to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationBaseline {
    means: [f64; FEATURE_COUNT],
    stddevs: [f64; FEATURE_COUNT],
    size: usize,
}

impl PopulationBaseline {
    pub fn from_vectors(batch: &[FeatureVector]) -> Self {
        let mut means = [0.0; FEATURE_COUNT];
        let mut stddevs = [0.0; FEATURE_COUNT];
        if batch.is_empty() {
            return Self { means, stddevs, size: 0 };
        }

        let n = batch.len() as f64;
        let rows: Vec<[f64; FEATURE_COUNT]> = batch.iter().map(|fv| fv.to_array()).collect();

        for row in &rows {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        for row in &rows {
            for ((s, x), m) in stddevs.iter_mut().zip(row).zip(&means) {
                *s += (x - m) * (x - m);
            }
        }
        stddevs.iter_mut().for_each(|s| *s = (*s / n).sqrt());

        Self {
            means,
            stddevs,
            size: batch.len(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Signed z-score per feature. A feature without spread scores 0.
    pub fn z_scores(&self, fv: &FeatureVector) -> [f64; FEATURE_COUNT] {
        self.standardize(&fv.to_array())
    }

    pub fn standardize(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            if self.stddevs[i] > EPS {
                out[i] = (row[i] - self.means[i]) / self.stddevs[i];
            }
        }
        out
    }

    pub fn standardize_all(&self, batch: &[FeatureVector]) -> Vec<[f64; FEATURE_COUNT]> {
        batch.iter().map(|fv| self.standardize(&fv.to_array())).collect()
    }
}

/// Profile of a meter that draws the batch-average load evenly across every
/// hour of every day.
///
/// Anchors the training population so that even a two-meter batch has an
/// asymmetric reference point.
pub fn reference_profile(batch: &[FeatureVector], windows: &FeatureConfig) -> FeatureVector {
    let hourly_avg = if batch.is_empty() {
        0.0
    } else {
        batch.iter().map(|fv| fv.hourly_avg).sum::<f64>() / batch.len() as f64
    };

    FeatureVector {
        hourly_avg,
        daily_variance: 0.0,
        night_ratio: windows.night_hour_count() as f64 / 24.0,
        peak_ratio: windows.peak_hour_count() as f64 / 24.0,
        weekend_ratio: 2.0 / 7.0,
    }
}
