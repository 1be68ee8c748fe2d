//! Detection run orchestration and read-side queries.
//!
//! A run resolves its meters, extracts features in parallel on the engine's
//! worker pool, fits and scores the selected detector over the whole batch,
//! then writes one result per meter. Runs share no trained state; two
//! overlapping runs resolve to last-write-wins per meter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use powerguard_core::{
    AnomalyResult, Config, DashboardStats, DetectionRun, FeatureVector, MeterId, MeterSelection,
    ModelKind, ReadingSource, ResultStore, SkipReason, SkippedMeter, WriteFailure,
};

use crate::algorithms::Detector;
use crate::error::{DetectionError, DetectionResult};
use crate::pipeline::{
    normalize_scores, reference_profile, EngineMetrics, ExplanationGenerator, FeatureExtractor,
    PopulationBaseline, RiskClassifier,
};

/// Parameters of one `run_detection` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    /// Model identifier, e.g. `isolation_forest`.
    pub model: String,
    /// Suspicion threshold; the configured default when absent.
    pub threshold: Option<f64>,
    /// Explicit meter subset; every known meter when absent or empty.
    pub meter_ids: Option<Vec<MeterId>>,
}

impl DetectionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            threshold: None,
            meter_ids: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_meters<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MeterId>,
    {
        self.meter_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }
}

/// Reading count, current features and current result of one meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterAnalysis {
    pub meter_id: MeterId,
    pub readings_count: usize,
    /// Absent when the meter has too little data to score.
    pub features: Option<FeatureVector>,
    pub result: Option<AnomalyResult>,
}

/// Per-meter outcome of the extraction stage.
enum MeterOutcome {
    Ready(MeterId, FeatureVector),
    Skipped(SkippedMeter),
}

pub struct DetectionEngine {
    config: Config,
    source: Arc<dyn ReadingSource>,
    store: Arc<dyn ResultStore>,
    extractor: FeatureExtractor,
    pool: rayon::ThreadPool,
    last_run: RwLock<Option<DetectionRun>>,
    metrics: RwLock<EngineMetrics>,
    stop: AtomicBool,
}

impl DetectionEngine {
    pub fn new(
        config: Config,
        source: Arc<dyn ReadingSource>,
        store: Arc<dyn ResultStore>,
    ) -> DetectionResult<Self> {
        let threads = config.detection.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("powerguard-detect-{}", i))
            .build()
            .map_err(|e| DetectionError::WorkerPool(e.to_string()))?;

        let extractor = FeatureExtractor::new(config.features.clone(), config.detection.min_readings);
        debug!(threads, min_readings = extractor.min_readings(), "detection engine ready");

        Ok(Self {
            config,
            source,
            store,
            extractor,
            pool,
            last_run: RwLock::new(None),
            metrics: RwLock::new(EngineMetrics::default()),
            stop: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A request for the configured default model and threshold.
    pub fn default_request(&self) -> DetectionRequest {
        DetectionRequest::new(self.config.detection.default_model.clone())
    }

    // ── Detection ──────────────────────────────────────────────

    /// Run detection and return the finalized run summary.
    ///
    /// Unknown model and invalid threshold are rejected before any meter is
    /// touched. Per-meter problems end up in the summary, never as errors.
    pub fn run_detection(&self, request: &DetectionRequest) -> DetectionResult<DetectionRun> {
        let timer = read_guard(&self.metrics).run_timer();

        match self.execute(request) {
            Ok(run) => {
                timer.finish(&mut write_guard(&self.metrics), run.meters_analyzed as u64);
                *write_guard(&self.last_run) = Some(run.clone());
                Ok(run)
            }
            Err(e) => {
                write_guard(&self.metrics).record_failure();
                warn!(model = %request.model, error = %e, "detection run failed");
                Err(e)
            }
        }
    }

    fn execute(&self, request: &DetectionRequest) -> DetectionResult<DetectionRun> {
        let model: ModelKind = request.model.parse()?;
        let threshold = request
            .threshold
            .unwrap_or(self.config.detection.anomaly_threshold);
        let classifier = RiskClassifier::new(threshold)?;

        let selection = MeterSelection::from_ids(request.meter_ids.clone());
        let meter_ids = self.resolve_meters(&selection)?;
        let mut run = DetectionRun::start(model, threshold, selection);

        info!(
            run_id = %run.run_id,
            model = %model,
            threshold,
            meters = meter_ids.len(),
            "detection run started"
        );

        // Stage 1: per-meter feature extraction.
        let outcomes: Vec<MeterOutcome> = self
            .pool
            .install(|| meter_ids.par_iter().map(|id| self.extract_meter(id)).collect());

        let mut ready: Vec<(MeterId, FeatureVector)> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                MeterOutcome::Ready(id, fv) => ready.push((id, fv)),
                MeterOutcome::Skipped(skipped) => {
                    if skipped.reason == SkipReason::Stopped {
                        run.interrupted = true;
                    } else {
                        warn!(meter_id = %skipped.meter_id, reason = ?skipped.reason, "meter skipped");
                    }
                    run.skipped.push(skipped);
                }
            }
        }
        debug!(ready = ready.len(), skipped = run.skipped.len(), "features extracted");

        if ready.is_empty() {
            if run.interrupted {
                run.finish();
                info!(run_id = %run.run_id, "detection run stopped before scoring");
                return Ok(run);
            }
            return Err(DetectionError::EmptyBatch {
                requested: meter_ids.len(),
                skipped: run.skipped.len(),
            });
        }

        // Stage 2: fit and score over the whole batch.
        let vectors: Vec<FeatureVector> = ready.iter().map(|(_, fv)| *fv).collect();
        let mut training = vectors.clone();
        if self.config.detection.reference_profile {
            training.push(reference_profile(&vectors, &self.config.features));
        }

        let detector = Detector::for_model(model, &self.config);
        let scored = self.pool.install(|| detector.fit_score(&training, &vectors))?;
        run.model_outliers = scored.outliers();
        let scores = normalize_scores(&scored.raw);
        debug!(
            meters = vectors.len(),
            offset = scored.offset,
            outliers = run.model_outliers,
            "batch scored"
        );

        let baseline = PopulationBaseline::from_vectors(&training);
        let explainer = ExplanationGenerator::new(&baseline);
        let computed_at = Utc::now();

        // Stage 3: write results one meter at a time.
        for ((meter_id, features), score) in ready.into_iter().zip(scores) {
            if self.stop.load(Ordering::SeqCst) {
                run.interrupted = true;
                break;
            }

            let classification = classifier.classify(score);
            let result = AnomalyResult {
                explanation: explainer.explain(&features, classification),
                meter_id,
                anomaly_score: score,
                risk_level: classification.risk_level,
                is_suspicious: classification.is_suspicious,
                model_used: model,
                computed_at,
                run_id: run.run_id,
                features,
            };

            match self.store.upsert(result.clone()) {
                Ok(()) => run.record_written(&result),
                Err(e) if e.is_per_meter() => {
                    warn!(meter_id = %result.meter_id, error = %e, "result write rejected");
                    run.write_failures.push(WriteFailure {
                        meter_id: result.meter_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        run.finish();
        info!(
            run_id = %run.run_id,
            analyzed = run.meters_analyzed,
            suspicious = run.suspicious_count,
            skipped = run.skipped.len(),
            write_failures = run.write_failures.len(),
            model_outliers = run.model_outliers,
            interrupted = run.interrupted,
            "detection run complete"
        );
        Ok(run)
    }

    fn resolve_meters(&self, selection: &MeterSelection) -> DetectionResult<Vec<MeterId>> {
        match selection {
            MeterSelection::All => Ok(self.source.meter_ids()?),
            MeterSelection::Subset(ids) => Ok(ids.iter().cloned().collect()),
        }
    }

    fn extract_meter(&self, meter_id: &str) -> MeterOutcome {
        let skip = |reason| {
            MeterOutcome::Skipped(SkippedMeter {
                meter_id: meter_id.to_string(),
                reason,
            })
        };

        if self.stop.load(Ordering::SeqCst) {
            return skip(SkipReason::Stopped);
        }

        let readings = match self.source.readings(meter_id) {
            Ok(readings) => readings,
            Err(e) => return skip(SkipReason::SourceError { message: e.to_string() }),
        };

        match self.extractor.extract(meter_id, &readings) {
            Ok(fv) => MeterOutcome::Ready(meter_id.to_string(), fv),
            Err(DetectionError::InsufficientData { found, required, .. }) => {
                skip(SkipReason::InsufficientData { found, required })
            }
            Err(e) => skip(SkipReason::SourceError { message: e.to_string() }),
        }
    }

    // ── Cooperative stop ───────────────────────────────────────

    /// Stop scheduling further meters in current and future runs.
    pub fn request_stop(&self) {
        info!("detection stop requested");
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    // ── Queries ────────────────────────────────────────────────

    /// Current results, highest score first.
    pub fn get_results(&self, suspicious_only: bool, limit: usize) -> DetectionResult<Vec<AnomalyResult>> {
        Ok(self
            .store
            .all()?
            .into_iter()
            .filter(|r| !suspicious_only || r.is_suspicious)
            .take(limit)
            .collect())
    }

    pub fn get_stats(&self) -> DetectionResult<DashboardStats> {
        let results = self.store.all()?;
        Ok(DashboardStats::from_results(
            &results,
            self.source.total_meters()?,
            self.source.total_readings()?,
        ))
    }

    pub fn get_meter_result(&self, meter_id: &str) -> DetectionResult<AnomalyResult> {
        self.store
            .get(meter_id)?
            .ok_or_else(|| DetectionError::MeterNotFound(meter_id.to_string()))
    }

    pub fn get_meter_analysis(&self, meter_id: &str) -> DetectionResult<MeterAnalysis> {
        let readings = self.source.readings(meter_id)?;
        if readings.is_empty() {
            return Err(DetectionError::MeterNotFound(meter_id.to_string()));
        }

        Ok(MeterAnalysis {
            meter_id: meter_id.to_string(),
            readings_count: readings.len(),
            features: self.extractor.extract(meter_id, &readings).ok(),
            result: self.store.get(meter_id)?,
        })
    }

    /// The most recent finalized run, if any.
    pub fn last_run(&self) -> Option<DetectionRun> {
        read_guard(&self.last_run).clone()
    }

    pub fn metrics(&self) -> EngineMetrics {
        read_guard(&self.metrics).clone()
    }
}

// Bookkeeping locks hold plain data, so a poisoned guard is still usable.
fn read_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use powerguard_core::{MemoryReadingSource, MemoryResultStore, Reading, StoreError};
    use std::sync::{OnceLock, Weak};

    fn readings(meter: &str, hours: i64, kwh: impl Fn(i64) -> f64) -> Vec<Reading> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..hours)
            .map(|h| Reading::new(meter, start + Duration::hours(h), kwh(h)))
            .collect()
    }

    fn engine_with(data: Vec<Reading>) -> (DetectionEngine, Arc<MemoryResultStore>) {
        let mut config = Config::default();
        config.detection.worker_threads = 2;
        config.isolation_forest.n_trees = 25;
        let store = Arc::new(MemoryResultStore::new());
        let engine = DetectionEngine::new(
            config,
            Arc::new(MemoryReadingSource::from_readings(data)),
            store.clone(),
        )
        .unwrap();
        (engine, store)
    }

    fn small_fleet() -> Vec<Reading> {
        let mut data = Vec::new();
        for m in 0..4 {
            let id = format!("M{}", m);
            data.extend(readings(&id, 72, |h| 1.0 + ((h + m) % 5) as f64 * 0.1));
        }
        data.extend(readings("ODD", 72, |h| if h % 24 < 6 { 6.0 } else { 0.1 }));
        data
    }

    #[test]
    fn request_builder() {
        let req = DetectionRequest::new("autoencoder")
            .with_threshold(0.7)
            .with_meters(["A", "B"]);
        assert_eq!(req.model, "autoencoder");
        assert_eq!(req.threshold, Some(0.7));
        assert_eq!(req.meter_ids, Some(vec!["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn run_writes_one_result_per_meter() {
        let (engine, store) = engine_with(small_fleet());
        let run = engine.run_detection(&engine.default_request()).unwrap();

        assert!(run.is_complete());
        assert_eq!(run.meters_analyzed, 5);
        assert_eq!(store.len(), 5);
        assert_eq!(run.tier_counts.total(), 5);
        assert_eq!(engine.last_run().map(|r| r.run_id), Some(run.run_id));
        assert_eq!(engine.metrics().runs_completed, 1);
    }

    #[test]
    fn invalid_threshold_rejected_before_work() {
        let (engine, store) = engine_with(small_fleet());
        let err = engine
            .run_detection(&DetectionRequest::new("isolation_forest").with_threshold(1.5))
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidThreshold(_)));
        assert!(store.is_empty());
        assert!(engine.last_run().is_none());
        assert_eq!(engine.metrics().runs_failed, 1);
    }

    #[test]
    fn stop_skips_remaining_meters() {
        let (engine, store) = engine_with(small_fleet());
        engine.request_stop();
        let run = engine.run_detection(&engine.default_request()).unwrap();

        assert!(run.interrupted);
        assert_eq!(run.meters_analyzed, 0);
        assert!(run.skipped.iter().all(|s| s.reason == SkipReason::Stopped));
        assert!(store.is_empty());

        engine.resume();
        assert!(!engine.is_stop_requested());
        let run = engine.run_detection(&engine.default_request()).unwrap();
        assert!(!run.interrupted);
        assert_eq!(run.meters_analyzed, 5);
    }

    /// Asks its engine to stop as soon as the first result lands.
    #[derive(Default)]
    struct StopAfterFirstWrite {
        inner: MemoryResultStore,
        engine: OnceLock<Weak<DetectionEngine>>,
    }

    impl ResultStore for StopAfterFirstWrite {
        fn upsert(&self, result: AnomalyResult) -> Result<(), StoreError> {
            self.inner.upsert(result)?;
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                engine.request_stop();
            }
            Ok(())
        }

        fn get(&self, meter_id: &str) -> Result<Option<AnomalyResult>, StoreError> {
            self.inner.get(meter_id)
        }

        fn all(&self) -> Result<Vec<AnomalyResult>, StoreError> {
            self.inner.all()
        }
    }

    #[test]
    fn stop_during_writes_leaves_rest_unwritten() {
        let mut config = Config::default();
        config.detection.worker_threads = 2;
        config.isolation_forest.n_trees = 25;
        let store = Arc::new(StopAfterFirstWrite::default());
        let engine = Arc::new(
            DetectionEngine::new(
                config,
                Arc::new(MemoryReadingSource::from_readings(small_fleet())),
                store.clone(),
            )
            .unwrap(),
        );
        assert!(store.engine.set(Arc::downgrade(&engine)).is_ok());

        let run = engine.run_detection(&engine.default_request()).unwrap();

        assert!(run.interrupted);
        assert!(run.is_complete());
        assert!(run.completed_at.is_some());
        assert_eq!(run.meters_analyzed, 1);
        assert_eq!(run.tier_counts.total(), 1);
        assert!(run.skipped.is_empty());
        assert_eq!(store.inner.len(), 1);
        assert_eq!(engine.last_run().map(|r| r.run_id), Some(run.run_id));
    }

    #[test]
    fn meter_analysis_reports_features_and_result() {
        let mut data = small_fleet();
        data.extend(readings("TINY", 3, |_| 1.0));
        let (engine, _) = engine_with(data);
        engine.run_detection(&engine.default_request()).unwrap();

        let odd = engine.get_meter_analysis("ODD").unwrap();
        assert_eq!(odd.readings_count, 72);
        assert!(odd.features.is_some());
        assert!(odd.result.is_some());

        let tiny = engine.get_meter_analysis("TINY").unwrap();
        assert_eq!(tiny.readings_count, 3);
        assert!(tiny.features.is_none());
        assert!(tiny.result.is_none());

        assert!(matches!(
            engine.get_meter_analysis("GHOST"),
            Err(DetectionError::MeterNotFound(_))
        ));
    }

    #[test]
    fn results_filter_and_limit() {
        let (engine, _) = engine_with(small_fleet());
        engine.run_detection(&engine.default_request()).unwrap();

        let all = engine.get_results(false, 100).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].anomaly_score >= w[1].anomaly_score));

        assert_eq!(engine.get_results(false, 2).unwrap().len(), 2);
        assert!(engine
            .get_results(true, 100)
            .unwrap()
            .iter()
            .all(|r| r.is_suspicious));
    }
}
