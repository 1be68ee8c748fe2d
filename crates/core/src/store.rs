//! Collaborator contracts the scoring engine depends on.
//!
//! Ingestion and persistence live outside the engine. Both traits take
//! `&self` so a single instance can be shared between concurrent runs.

use crate::entity::MeterId;
use crate::error::StoreError;
use crate::reading::Reading;
use crate::result::AnomalyResult;

/// Upstream ingestion side: per-meter reading sequences and counts.
pub trait ReadingSource: Send + Sync {
    /// Every meter known to ingestion.
    fn meter_ids(&self) -> Result<Vec<MeterId>, StoreError>;

    /// Readings of one meter ordered by timestamp. Unknown meters yield an
    /// empty sequence.
    fn readings(&self, meter_id: &str) -> Result<Vec<Reading>, StoreError>;

    fn total_readings(&self) -> Result<usize, StoreError>;

    fn total_meters(&self) -> Result<usize, StoreError> {
        Ok(self.meter_ids()?.len())
    }
}

/// Downstream result store: one current result per meter.
pub trait ResultStore: Send + Sync {
    /// Replace the meter's result as a whole, or leave it untouched on error.
    fn upsert(&self, result: AnomalyResult) -> Result<(), StoreError>;

    fn get(&self, meter_id: &str) -> Result<Option<AnomalyResult>, StoreError>;

    /// All current results, highest score first.
    fn all(&self) -> Result<Vec<AnomalyResult>, StoreError>;
}
