//! Per-run scoring stages.
//!
//! - [`features`]: reading history to feature vector (per meter, parallel)
//! - [`population`]: batch baseline and the reference profile
//! - [`normalize`]: raw detector score to [0, 1]
//! - [`classify`]: risk tier and suspicion flag
//! - [`explain`]: justification text
//! - [`metrics`]: engine-level counters

pub mod classify;
pub mod explain;
pub mod features;
pub mod metrics;
pub mod normalize;
pub mod population;

pub use classify::{Classification, RiskClassifier};
pub use explain::ExplanationGenerator;
pub use features::FeatureExtractor;
pub use metrics::EngineMetrics;
pub use normalize::normalize_scores;
pub use population::{reference_profile, PopulationBaseline};
