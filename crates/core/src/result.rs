use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{MeterId, ModelKind, RiskLevel};
use crate::reading::FeatureVector;

/// Current scoring outcome for one meter. A newer run replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub meter_id: MeterId,
    /// Batch-relative score in [0, 1].
    pub anomaly_score: f64,
    pub risk_level: RiskLevel,
    pub is_suspicious: bool,
    pub explanation: String,
    pub model_used: ModelKind,
    pub computed_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub features: FeatureVector,
}

/// Per-tier result counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl TierCounts {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

/// Which meters a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterSelection {
    All,
    Subset(BTreeSet<MeterId>),
}

impl MeterSelection {
    /// `None` or an empty list both mean every known meter.
    pub fn from_ids(ids: Option<Vec<MeterId>>) -> Self {
        match ids {
            Some(ids) if !ids.is_empty() => MeterSelection::Subset(ids.into_iter().collect()),
            _ => MeterSelection::All,
        }
    }
}

/// Why a meter did not produce a result in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    InsufficientData { found: usize, required: usize },
    SourceError { message: String },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedMeter {
    pub meter_id: MeterId,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// A meter whose result was computed but could not be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub meter_id: MeterId,
    pub reason: String,
}

/// One invocation of the orchestrator. Mutated only while the run is in
/// flight; immutable once `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRun {
    pub run_id: Uuid,
    pub model: ModelKind,
    pub threshold: f64,
    pub requested: MeterSelection,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Meters whose result was written.
    pub meters_analyzed: usize,
    pub suspicious_count: usize,
    pub tier_counts: TierCounts,
    pub skipped: Vec<SkippedMeter>,
    pub write_failures: Vec<WriteFailure>,
    /// Meters above the detector's own fitted decision offset.
    pub model_outliers: usize,
    /// Set when a stop request cut the run short.
    pub interrupted: bool,
}

impl DetectionRun {
    pub fn start(model: ModelKind, threshold: f64, requested: MeterSelection) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            model,
            threshold,
            requested,
            started_at: Utc::now(),
            completed_at: None,
            meters_analyzed: 0,
            suspicious_count: 0,
            tier_counts: TierCounts::default(),
            skipped: Vec::new(),
            write_failures: Vec::new(),
            model_outliers: 0,
            interrupted: false,
        }
    }

    /// Count one persisted result.
    pub fn record_written(&mut self, result: &AnomalyResult) {
        self.meters_analyzed += 1;
        if result.is_suspicious {
            self.suspicious_count += 1;
        }
        self.tier_counts.record(result.risk_level);
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Dashboard aggregates, derived on demand from the current result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_meters: usize,
    pub total_readings: usize,
    pub suspicious_meters: usize,
    pub suspicious_percentage: f64,
    /// High and critical combined.
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub last_detection: Option<DateTime<Utc>>,
}

impl DashboardStats {
    pub fn from_results(results: &[AnomalyResult], total_meters: usize, total_readings: usize) -> Self {
        let mut tiers = TierCounts::default();
        let mut suspicious_meters = 0;
        let mut last_detection: Option<DateTime<Utc>> = None;

        for r in results {
            tiers.record(r.risk_level);
            if r.is_suspicious {
                suspicious_meters += 1;
            }
            last_detection = Some(match last_detection {
                Some(prev) => prev.max(r.computed_at),
                None => r.computed_at,
            });
        }

        let suspicious_percentage = if total_meters > 0 {
            suspicious_meters as f64 / total_meters as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_meters,
            total_readings,
            suspicious_meters,
            suspicious_percentage,
            high_risk_count: tiers.high + tiers.critical,
            medium_risk_count: tiers.medium,
            low_risk_count: tiers.low,
            last_detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(meter: &str, score: f64, suspicious: bool) -> AnomalyResult {
        AnomalyResult {
            meter_id: meter.to_string(),
            anomaly_score: score,
            risk_level: RiskLevel::from_score(score),
            is_suspicious: suspicious,
            explanation: String::new(),
            model_used: ModelKind::IsolationForest,
            computed_at: Utc::now(),
            run_id: Uuid::new_v4(),
            features: FeatureVector::default(),
        }
    }

    #[test]
    fn run_counts_written_results() {
        let mut run = DetectionRun::start(ModelKind::Autoencoder, 0.5, MeterSelection::All);
        run.record_written(&result("A", 0.1, false));
        run.record_written(&result("B", 0.9, true));
        run.record_written(&result("C", 0.6, true));
        run.finish();

        assert!(run.is_complete());
        assert_eq!(run.meters_analyzed, 3);
        assert_eq!(run.suspicious_count, 2);
        assert_eq!(run.tier_counts.low, 1);
        assert_eq!(run.tier_counts.high, 1);
        assert_eq!(run.tier_counts.critical, 1);
        assert_eq!(run.tier_counts.total(), 3);
    }

    #[test]
    fn selection_empty_list_means_all() {
        assert_eq!(MeterSelection::from_ids(None), MeterSelection::All);
        assert_eq!(MeterSelection::from_ids(Some(vec![])), MeterSelection::All);
        match MeterSelection::from_ids(Some(vec!["B".into(), "A".into(), "B".into()])) {
            MeterSelection::Subset(ids) => assert_eq!(ids.len(), 2),
            MeterSelection::All => panic!("expected subset"),
        }
    }

    #[test]
    fn stats_merge_high_and_critical() {
        let results = vec![
            result("A", 0.1, false),
            result("B", 0.3, false),
            result("C", 0.6, true),
            result("D", 0.9, true),
        ];
        let stats = DashboardStats::from_results(&results, 8, 1000);

        assert_eq!(stats.total_meters, 8);
        assert_eq!(stats.suspicious_meters, 2);
        assert!((stats.suspicious_percentage - 25.0).abs() < 1e-10);
        assert_eq!(stats.high_risk_count, 2);
        assert_eq!(stats.medium_risk_count, 1);
        assert_eq!(stats.low_risk_count, 1);
        assert!(stats.last_detection.is_some());
    }

    #[test]
    fn stats_with_no_meters() {
        let stats = DashboardStats::from_results(&[], 0, 0);
        assert_eq!(stats.suspicious_percentage, 0.0);
        assert!(stats.last_detection.is_none());
    }

    #[test]
    fn skipped_meter_serializes_flat() {
        let skipped = SkippedMeter {
            meter_id: "M9".into(),
            reason: SkipReason::InsufficientData { found: 5, required: 24 },
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "insufficient_data");
        assert_eq!(json["found"], 5);
    }
}
