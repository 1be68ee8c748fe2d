//! In-process implementations of the collaborator contracts.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::entity::MeterId;
use crate::error::StoreError;
use crate::reading::Reading;
use crate::result::AnomalyResult;
use crate::store::{ReadingSource, ResultStore};

/// Readings grouped by meter, each group kept in timestamp order.
#[derive(Debug, Default)]
pub struct MemoryReadingSource {
    meters: RwLock<BTreeMap<MeterId, Vec<Reading>>>,
}

impl MemoryReadingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from an arbitrary, unordered collection of readings.
    pub fn from_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let mut meters = BTreeMap::new();
        insert_sorted(&mut meters, readings);
        Self {
            meters: RwLock::new(meters),
        }
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = Reading>) -> Result<(), StoreError> {
        let mut meters = self
            .meters
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("reading source write lock: {}", e)))?;
        insert_sorted(&mut meters, readings);
        Ok(())
    }
}

/// Append readings to their meters' series and restore timestamp order.
fn insert_sorted(meters: &mut BTreeMap<MeterId, Vec<Reading>>, readings: impl IntoIterator<Item = Reading>) {
    let mut touched = Vec::new();
    for reading in readings {
        touched.push(reading.meter_id.clone());
        meters.entry(reading.meter_id.clone()).or_default().push(reading);
    }

    touched.sort();
    touched.dedup();
    for meter_id in touched {
        if let Some(series) = meters.get_mut(&meter_id) {
            series.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        }
    }
}

impl ReadingSource for MemoryReadingSource {
    fn meter_ids(&self) -> Result<Vec<MeterId>, StoreError> {
        let meters = self
            .meters
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("reading source read lock: {}", e)))?;
        Ok(meters.keys().cloned().collect())
    }

    fn readings(&self, meter_id: &str) -> Result<Vec<Reading>, StoreError> {
        let meters = self
            .meters
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("reading source read lock: {}", e)))?;
        Ok(meters.get(meter_id).cloned().unwrap_or_default())
    }

    fn total_readings(&self) -> Result<usize, StoreError> {
        let meters = self
            .meters
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("reading source read lock: {}", e)))?;
        Ok(meters.values().map(Vec::len).sum())
    }

    fn total_meters(&self) -> Result<usize, StoreError> {
        let meters = self
            .meters
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("reading source read lock: {}", e)))?;
        Ok(meters.len())
    }
}

/// Latest-wins result map keyed by meter id.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: RwLock<HashMap<MeterId, AnomalyResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn upsert(&self, result: AnomalyResult) -> Result<(), StoreError> {
        let mut results = self
            .results
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("result store write lock: {}", e)))?;
        results.insert(result.meter_id.clone(), result);
        Ok(())
    }

    fn get(&self, meter_id: &str) -> Result<Option<AnomalyResult>, StoreError> {
        let results = self
            .results
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("result store read lock: {}", e)))?;
        Ok(results.get(meter_id).cloned())
    }

    fn all(&self) -> Result<Vec<AnomalyResult>, StoreError> {
        let results = self
            .results
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("result store read lock: {}", e)))?;
        let mut all: Vec<AnomalyResult> = results.values().cloned().collect();
        all.sort_by(|a, b| {
            b.anomaly_score
                .total_cmp(&a.anomaly_score)
                .then_with(|| a.meter_id.cmp(&b.meter_id))
        });
        Ok(all)
    }
}
