use thiserror::Error;

/// Failures reported by the reading source or the result store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The collaborator cannot be reached at all. Fatal to a detection run.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single meter's result could not be written. The run continues.
    #[error("write rejected for meter {meter_id}: {reason}")]
    WriteRejected { meter_id: String, reason: String },

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Whether the failure affects only one meter rather than the whole store.
    pub fn is_per_meter(&self) -> bool {
        matches!(self, StoreError::WriteRejected { .. })
    }
}
