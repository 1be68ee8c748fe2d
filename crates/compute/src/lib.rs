pub mod algorithms;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod simulate;

pub use algorithms::{Detector, DetectorModel, ScoredBatch};
pub use engine::{DetectionEngine, DetectionRequest, MeterAnalysis};
pub use error::{DetectionError, DetectionResult};
pub use pipeline::EngineMetrics;
pub use simulate::{AnomalyKind, Fleet, FleetSimulator, MeterLabel};
