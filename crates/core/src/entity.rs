use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type MeterId = String;

/// Detector variant selected for a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    IsolationForest,
    Autoencoder,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::IsolationForest, ModelKind::Autoencoder];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::IsolationForest => "isolation_forest",
            ModelKind::Autoencoder => "autoencoder",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`ModelKind::from_str`]; carries the rejected identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model identifier '{0}'")]
pub struct UnknownModel(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "isolation_forest" => Ok(ModelKind::IsolationForest),
            "autoencoder" => Ok(ModelKind::Autoencoder),
            other => Err(UnknownModel(other.to_string())),
        }
    }
}

/// Display taxonomy for a normalized anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Lower bound (inclusive) of the medium, high and critical tiers.
    pub const MEDIUM_FLOOR: f64 = 0.25;
    pub const HIGH_FLOOR: f64 = 0.50;
    pub const CRITICAL_FLOOR: f64 = 0.75;

    /// Map a normalized score in [0, 1] onto its tier. Boundaries belong to
    /// the higher tier. NaN maps to `Low`.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::CRITICAL_FLOOR {
            RiskLevel::Critical
        } else if score >= Self::HIGH_FLOOR {
            RiskLevel::High
        } else if score >= Self::MEDIUM_FLOOR {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_parses_known_identifiers() {
        assert_eq!("isolation_forest".parse::<ModelKind>(), Ok(ModelKind::IsolationForest));
        assert_eq!("autoencoder".parse::<ModelKind>(), Ok(ModelKind::Autoencoder));
        assert_eq!(
            "random_forest".parse::<ModelKind>(),
            Err(UnknownModel("random_forest".to_string()))
        );
    }

    #[test]
    fn unknown_model_is_an_error_naming_the_identifier() {
        let err: Box<dyn std::error::Error> = Box::new(UnknownModel("random_forest".into()));
        assert_eq!(err.to_string(), "unknown model identifier 'random_forest'");
    }

    #[test]
    fn model_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ModelKind::IsolationForest).unwrap();
        assert_eq!(json, "\"isolation_forest\"");
    }

    #[test]
    fn risk_level_boundaries_go_to_higher_tier() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.2499), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.4999), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.7499), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn risk_level_nan_is_low() {
        assert_eq!(RiskLevel::from_score(f64::NAN), RiskLevel::Low);
    }

    #[test]
    fn risk_level_orders_by_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::Critical.to_string(), "critical");
    }
}
