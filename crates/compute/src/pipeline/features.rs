use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Timelike, Weekday};

use powerguard_core::config::FeatureConfig;
use powerguard_core::{FeatureVector, Reading};

use crate::error::DetectionError;

/// Turns one meter's reading history into its [`FeatureVector`].
///
/// Negative and non-finite readings are ignored; the minimum count applies
/// to the readings that remain.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    windows: FeatureConfig,
    min_readings: usize,
}

impl FeatureExtractor {
    pub fn new(windows: FeatureConfig, min_readings: usize) -> Self {
        Self {
            windows,
            min_readings: min_readings.max(1),
        }
    }

    pub fn min_readings(&self) -> usize {
        self.min_readings
    }

    /// Extract features from readings in any order.
    pub fn extract(&self, meter_id: &str, readings: &[Reading]) -> Result<FeatureVector, DetectionError> {
        let mut valid: Vec<&Reading> = readings.iter().filter(|r| r.is_valid()).collect();
        if valid.len() < self.min_readings {
            return Err(DetectionError::InsufficientData {
                meter_id: meter_id.to_string(),
                found: valid.len(),
                required: self.min_readings,
            });
        }

        // Fixed summation order keeps the output independent of input order.
        valid.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.consumption_kwh.total_cmp(&b.consumption_kwh))
        });

        let mut total = 0.0;
        let mut night = 0.0;
        let mut peak = 0.0;
        let mut weekend = 0.0;
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        for r in &valid {
            let kwh = r.consumption_kwh;
            let hour = r.timestamp.hour();
            total += kwh;
            if self.windows.is_night(hour) {
                night += kwh;
            }
            if self.windows.is_peak(hour) {
                peak += kwh;
            }
            if is_weekend(r.timestamp.weekday()) {
                weekend += kwh;
            }
            *daily.entry(r.timestamp.date()).or_insert(0.0) += kwh;
        }

        let ratio = |part: f64| if total > 0.0 { (part / total).clamp(0.0, 1.0) } else { 0.0 };

        Ok(FeatureVector {
            hourly_avg: total / valid.len() as f64,
            daily_variance: population_variance(daily.values().copied()),
            night_ratio: ratio(night),
            peak_ratio: ratio(peak),
            weekend_ratio: ratio(weekend),
        })
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Population variance; 0 for fewer than two values.
fn population_variance(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    // 2024-01-01 is a Monday.
    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn hourly(meter: &str, hours: i64, kwh: impl Fn(i64) -> f64) -> Vec<Reading> {
        (0..hours)
            .map(|h| Reading::new(meter, start() + Duration::hours(h), kwh(h)))
            .collect()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default(), 24)
    }

    #[test]
    fn flat_week_features() {
        let readings = hourly("M1", 24 * 7, |_| 1.0);
        let fv = extractor().extract("M1", &readings).unwrap();

        assert!((fv.hourly_avg - 1.0).abs() < 1e-12);
        assert!(fv.daily_variance.abs() < 1e-12);
        assert!((fv.night_ratio - 6.0 / 24.0).abs() < 1e-12);
        assert!((fv.peak_ratio - 4.0 / 24.0).abs() < 1e-12);
        assert!((fv.weekend_ratio - 2.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn daily_variance_uses_day_totals() {
        // Day one totals 24, day two totals 48.
        let readings = hourly("M1", 48, |h| if h < 24 { 1.0 } else { 2.0 });
        let fv = extractor().extract("M1", &readings).unwrap();
        assert!((fv.daily_variance - 144.0).abs() < 1e-9);
    }

    #[test]
    fn zero_consumption_gives_zero_ratios() {
        let readings = hourly("M0", 48, |_| 0.0);
        let fv = extractor().extract("M0", &readings).unwrap();
        assert_eq!(fv.night_ratio, 0.0);
        assert_eq!(fv.peak_ratio, 0.0);
        assert_eq!(fv.weekend_ratio, 0.0);
        assert_eq!(fv.hourly_avg, 0.0);
    }

    #[test]
    fn too_few_readings_rejected() {
        let readings = hourly("M5", 5, |_| 1.0);
        match extractor().extract("M5", &readings) {
            Err(DetectionError::InsufficientData { found, required, .. }) => {
                assert_eq!(found, 5);
                assert_eq!(required, 24);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
    }

    #[test]
    fn invalid_readings_do_not_count() {
        let mut readings = hourly("M1", 23, |_| 1.0);
        readings.push(Reading::new("M1", start() + Duration::hours(23), -3.0));
        readings.push(Reading::new("M1", start() + Duration::hours(24), f64::NAN));
        assert!(extractor().extract("M1", &readings).is_err());
    }

    #[test]
    fn order_does_not_matter() {
        let readings = hourly("M1", 72, |h| ((h * 7) % 11) as f64 * 0.3);
        let mut shuffled = readings.clone();
        shuffled.reverse();
        shuffled.swap(3, 40);

        let a = extractor().extract("M1", &readings).unwrap();
        let b = extractor().extract("M1", &shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrapping_night_window_counts_late_hours() {
        let windows = FeatureConfig {
            night_start_hour: 22,
            night_end_hour: 2,
            ..FeatureConfig::default()
        };
        let readings = hourly("M1", 24, |h| if h == 23 { 5.0 } else { 0.0 });
        let fv = FeatureExtractor::new(windows, 24).extract("M1", &readings).unwrap();
        assert!((fv.night_ratio - 1.0).abs() < 1e-12);
    }
}
