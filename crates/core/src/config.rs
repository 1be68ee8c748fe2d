use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Parse a profiled env var, keeping `default` when unset or malformed.
fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref().map(str::trim) {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

/// Parse a comma separated list of hours, dropping anything outside 0..24.
pub fn parse_hour_list(raw: &str) -> Vec<u32> {
    let mut hours: Vec<u32> = raw
        .split(',')
        .filter_map(|h| h.trim().parse::<u32>().ok())
        .filter(|h| *h < 24)
        .collect();
    hours.sort_unstable();
    hours.dedup();
    hours
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub detection: DetectionConfig,
    pub features: FeatureConfig,
    pub isolation_forest: IsolationForestConfig,
    pub autoencoder: AutoencoderConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `POWERGUARD_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("POWERGUARD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            detection: DetectionConfig::from_env_profiled(p),
            features: FeatureConfig::from_env_profiled(p),
            isolation_forest: IsolationForestConfig::from_env_profiled(p),
            autoencoder: AutoencoderConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  detection:        threshold={}, model={}, min_readings={}, workers={}, reference_profile={}",
            self.detection.anomaly_threshold,
            self.detection.default_model,
            self.detection.min_readings,
            self.detection.worker_threads,
            self.detection.reference_profile
        );
        tracing::info!(
            "  features:         night={:02}:00-{:02}:00, peak_hours={:?}",
            self.features.night_start_hour,
            self.features.night_end_hour,
            self.features.peak_hours
        );
        tracing::info!(
            "  isolation_forest: trees={}, max_samples={}, contamination={}, seed={}",
            self.isolation_forest.n_trees,
            self.isolation_forest.max_samples,
            self.isolation_forest.contamination,
            self.isolation_forest.seed
        );
        tracing::info!(
            "  autoencoder:      hidden={}, encoding={}, epochs={}, batch={}, lr={}, seed={}",
            self.autoencoder.hidden_dim,
            self.autoencoder.encoding_dim,
            self.autoencoder.epochs,
            self.autoencoder.batch_size,
            self.autoencoder.learning_rate,
            self.autoencoder.seed
        );
    }
}

// ── Detection run ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Suspicion threshold used when a run does not override it.
    pub anomaly_threshold: f64,
    /// Model identifier used when a caller does not pick one.
    pub default_model: String,
    /// Meters with fewer valid readings are skipped.
    pub min_readings: usize,
    /// Feature extraction workers. 0 = available parallelism.
    pub worker_threads: usize,
    /// Anchor training with a time-uniform reference profile.
    pub reference_profile: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.5,
            default_model: "isolation_forest".to_string(),
            min_readings: 24,
            worker_threads: 0,
            reference_profile: true,
        }
    }
}

impl DetectionConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            anomaly_threshold: profiled_env_parse(p, "ANOMALY_THRESHOLD", d.anomaly_threshold),
            default_model: profiled_env_or(p, "DEFAULT_MODEL", &d.default_model),
            min_readings: profiled_env_parse(p, "MIN_READINGS", d.min_readings),
            worker_threads: profiled_env_parse(p, "DETECTION_WORKER_THREADS", d.worker_threads),
            reference_profile: profiled_env_bool(p, "REFERENCE_PROFILE", d.reference_profile),
        }
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}

// ── Feature windows ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// First hour of the night window (inclusive).
    pub night_start_hour: u32,
    /// Hour the night window ends (exclusive). May be below the start hour
    /// for windows that wrap past midnight.
    pub night_end_hour: u32,
    pub peak_hours: Vec<u32>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            night_start_hour: 0,
            night_end_hour: 6,
            peak_hours: vec![18, 19, 20, 21],
        }
    }
}

impl FeatureConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        let peak_hours = profiled_env_opt(p, "PEAK_HOURS")
            .map(|raw| parse_hour_list(&raw))
            .filter(|hours| !hours.is_empty())
            .unwrap_or(d.peak_hours);
        Self {
            night_start_hour: profiled_env_parse(p, "NIGHT_START_HOUR", d.night_start_hour) % 24,
            night_end_hour: profiled_env_parse(p, "NIGHT_END_HOUR", d.night_end_hour) % 24,
            peak_hours,
        }
    }

    pub fn is_night(&self, hour: u32) -> bool {
        let (start, end) = (self.night_start_hour, self.night_end_hour);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    pub fn is_peak(&self, hour: u32) -> bool {
        self.peak_hours.contains(&hour)
    }

    pub fn night_hour_count(&self) -> usize {
        (0..24).filter(|h| self.is_night(*h)).count()
    }

    pub fn peak_hour_count(&self) -> usize {
        (0..24).filter(|h| self.is_peak(*h)).count()
    }
}

// ── Isolation forest ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestConfig {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected anomaly fraction, in (0, 0.5].
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

impl IsolationForestConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            n_trees: profiled_env_parse(p, "ISOLATION_FOREST_TREES", d.n_trees).max(1),
            max_samples: profiled_env_parse(p, "ISOLATION_FOREST_MAX_SAMPLES", d.max_samples).max(2),
            contamination: profiled_env_parse(p, "ISOLATION_FOREST_CONTAMINATION", d.contamination)
                .clamp(f64::EPSILON, 0.5),
            seed: profiled_env_parse(p, "ISOLATION_FOREST_SEED", d.seed),
        }
    }
}

// ── Autoencoder ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    pub hidden_dim: usize,
    /// Bottleneck width.
    pub encoding_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 8,
            encoding_dim: 3,
            epochs: 200,
            batch_size: 32,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

impl AutoencoderConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            hidden_dim: profiled_env_parse(p, "AUTOENCODER_HIDDEN_DIM", d.hidden_dim).max(1),
            encoding_dim: profiled_env_parse(p, "AUTOENCODER_ENCODING_DIM", d.encoding_dim).max(1),
            epochs: profiled_env_parse(p, "AUTOENCODER_EPOCHS", d.epochs),
            batch_size: profiled_env_parse(p, "AUTOENCODER_BATCH_SIZE", d.batch_size).max(1),
            learning_rate: profiled_env_parse(p, "AUTOENCODER_LEARNING_RATE", d.learning_rate),
            seed: profiled_env_parse(p, "AUTOENCODER_SEED", d.seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_list_parsing() {
        assert_eq!(parse_hour_list("18, 19,20,21"), vec![18, 19, 20, 21]);
        assert_eq!(parse_hour_list("7,x,25,7,3"), vec![3, 7]);
        assert!(parse_hour_list("").is_empty());
    }

    #[test]
    fn default_night_window() {
        let cfg = FeatureConfig::default();
        assert!(cfg.is_night(0));
        assert!(cfg.is_night(5));
        assert!(!cfg.is_night(6));
        assert!(!cfg.is_night(23));
        assert_eq!(cfg.night_hour_count(), 6);
        assert_eq!(cfg.peak_hour_count(), 4);
    }

    #[test]
    fn wrapping_night_window() {
        let cfg = FeatureConfig {
            night_start_hour: 22,
            night_end_hour: 6,
            ..FeatureConfig::default()
        };
        assert!(cfg.is_night(22));
        assert!(cfg.is_night(3));
        assert!(!cfg.is_night(6));
        assert!(!cfg.is_night(12));
        assert_eq!(cfg.night_hour_count(), 8);
    }

    #[test]
    fn detection_defaults() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.anomaly_threshold, 0.5);
        assert_eq!(cfg.min_readings, 24);
        assert!(cfg.reference_profile);
        assert!(cfg.resolved_worker_threads() > 0);
    }

    #[test]
    fn profile_label_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.profile_label(), "default");
    }
}
