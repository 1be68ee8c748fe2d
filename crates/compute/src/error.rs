use powerguard_core::{StoreError, UnknownModel};

/// Failures of the scoring engine.
///
/// Only `InsufficientData` is per-meter; the orchestrator absorbs it into the
/// run summary. Everything else aborts the call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("meter {meter_id} has {found} usable readings, {required} required")]
    InsufficientData {
        meter_id: String,
        found: usize,
        required: usize,
    },

    #[error("unknown model '{0}' (expected isolation_forest or autoencoder)")]
    UnknownModel(String),

    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("no meter with sufficient data among {requested} requested ({skipped} skipped)")]
    EmptyBatch { requested: usize, skipped: usize },

    #[error("failed to store result for meter {meter_id}: {reason}")]
    StoreWrite { meter_id: String, reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("meter not found: {0}")]
    MeterNotFound(String),

    #[error("model training failed: {0}")]
    Training(String),

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl From<StoreError> for DetectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WriteRejected { meter_id, reason } => {
                DetectionError::StoreWrite { meter_id, reason }
            }
            other => DetectionError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<UnknownModel> for DetectionError {
    fn from(err: UnknownModel) -> Self {
        DetectionError::UnknownModel(err.0)
    }
}

pub type DetectionResult<T> = Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_rejection_maps_to_store_write() {
        let err: DetectionError = StoreError::WriteRejected {
            meter_id: "M1".into(),
            reason: "disk full".into(),
        }
        .into();
        assert!(matches!(err, DetectionError::StoreWrite { ref meter_id, .. } if meter_id == "M1"));
    }

    #[test]
    fn outage_maps_to_unavailable() {
        let err: DetectionError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, DetectionError::StoreUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn unknown_model_keeps_identifier() {
        let err: DetectionError = UnknownModel("random_forest".into()).into();
        assert!(err.to_string().contains("random_forest"));
    }
}
