use powerguard_core::RiskLevel;

use crate::error::DetectionError;

/// Tier and suspicion flag for a normalized score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub risk_level: RiskLevel,
    pub is_suspicious: bool,
}

/// Applies the fixed tier bands and a run-specific suspicion threshold.
///
/// The two are independent: a `high` meter is not flagged when the threshold
/// sits above 0.75.
#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier {
    threshold: f64,
}

impl RiskClassifier {
    pub fn new(threshold: f64) -> Result<Self, DetectionError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectionError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn classify(&self, score: f64) -> Classification {
        Classification {
            risk_level: RiskLevel::from_score(score),
            is_suspicious: score >= self.threshold,
        }
    }
}
