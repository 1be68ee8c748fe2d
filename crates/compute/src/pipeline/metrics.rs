use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine performance metrics, updated at the end of every detection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    /// Runs that finished and produced a summary (including interrupted ones).
    pub runs_completed: u64,
    /// Runs aborted by a fatal error.
    pub runs_failed: u64,
    /// When the last run completed.
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last completed run in milliseconds.
    pub last_duration_ms: u64,
    /// Meters written per second in the last completed run.
    pub meters_per_second: f64,
    /// Average meters written per completed run.
    pub avg_meters_per_run: f64,

    // Internal counters (not serialized to API consumers).
    #[serde(skip)]
    total_meters: u64,
}

impl EngineMetrics {
    /// Record a completed run that wrote `meters` results.
    pub fn record_run(&mut self, meters: u64, elapsed: Duration) {
        self.runs_completed += 1;
        self.total_meters += meters;
        self.last_run = Some(Utc::now());
        self.last_duration_ms = elapsed.as_millis() as u64;

        let secs = elapsed.as_secs_f64();
        self.meters_per_second = if secs > 0.0 { meters as f64 / secs } else { 0.0 };
        self.avg_meters_per_run = self.total_meters as f64 / self.runs_completed as f64;
    }

    pub fn record_failure(&mut self) {
        self.runs_failed += 1;
    }

    /// Start a timer for one run.
    pub fn run_timer(&self) -> RunTimer {
        RunTimer {
            start: Instant::now(),
        }
    }
}

/// A scoped timer for a detection run.
pub struct RunTimer {
    start: Instant,
}

impl RunTimer {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finalize the timer and record metrics.
    pub fn finish(self, metrics: &mut EngineMetrics, meters: u64) {
        metrics.record_run(meters, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_metrics() {
        let mut m = EngineMetrics::default();
        m.record_run(100, Duration::from_millis(50));

        assert_eq!(m.runs_completed, 1);
        assert!(m.meters_per_second > 0.0);
        assert_eq!(m.last_duration_ms, 50);
        assert!(m.last_run.is_some());
    }

    #[test]
    fn average_over_runs() {
        let mut m = EngineMetrics::default();
        m.record_run(10, Duration::from_millis(5));
        m.record_run(30, Duration::from_millis(5));
        assert!((m.avg_meters_per_run - 20.0).abs() < 1e-12);
    }

    #[test]
    fn failures_counted_separately() {
        let mut m = EngineMetrics::default();
        m.record_failure();
        assert_eq!(m.runs_failed, 1);
        assert_eq!(m.runs_completed, 0);
        assert!(m.last_run.is_none());
    }

    #[test]
    fn timer_records_on_finish() {
        let mut m = EngineMetrics::default();
        let timer = m.run_timer();
        timer.finish(&mut m, 3);
        assert_eq!(m.runs_completed, 1);
    }
}
