use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::entity::MeterId;

/// One hourly consumption measurement.
///
/// Timestamps are naive local time in the meter's recorded convention; day,
/// night and weekend bucketing uses them as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub meter_id: MeterId,
    pub timestamp: NaiveDateTime,
    pub consumption_kwh: f64,
}

impl Reading {
    pub fn new(meter_id: impl Into<MeterId>, timestamp: NaiveDateTime, consumption_kwh: f64) -> Self {
        Self {
            meter_id: meter_id.into(),
            timestamp,
            consumption_kwh,
        }
    }

    /// Finite and non-negative consumption.
    pub fn is_valid(&self) -> bool {
        self.consumption_kwh.is_finite() && self.consumption_kwh >= 0.0
    }
}

/// Number of features in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 5;

/// Named feature slots, in their fixed canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    HourlyAvg,
    DailyVariance,
    NightRatio,
    PeakRatio,
    WeekendRatio,
}

impl Feature {
    /// Canonical order. Also the tie-break order for explanations.
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::HourlyAvg,
        Feature::DailyVariance,
        Feature::NightRatio,
        Feature::PeakRatio,
        Feature::WeekendRatio,
    ];

    pub fn index(&self) -> usize {
        match self {
            Feature::HourlyAvg => 0,
            Feature::DailyVariance => 1,
            Feature::NightRatio => 2,
            Feature::PeakRatio => 3,
            Feature::WeekendRatio => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Feature::HourlyAvg => "hourly_avg",
            Feature::DailyVariance => "daily_variance",
            Feature::NightRatio => "night_ratio",
            Feature::PeakRatio => "peak_ratio",
            Feature::WeekendRatio => "weekend_ratio",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-schema summary of one meter's reading history.
///
/// All values are non-negative; the three ratios lie in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mean consumption per reading (kWh).
    pub hourly_avg: f64,
    /// Population variance of per-day consumption totals (kWh²).
    pub daily_variance: f64,
    /// Share of total consumption inside the night window.
    pub night_ratio: f64,
    /// Share of total consumption inside the peak hours.
    pub peak_ratio: f64,
    /// Share of total consumption on Saturday and Sunday.
    pub weekend_ratio: f64,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::HourlyAvg => self.hourly_avg,
            Feature::DailyVariance => self.daily_variance,
            Feature::NightRatio => self.night_ratio,
            Feature::PeakRatio => self.peak_ratio,
            Feature::WeekendRatio => self.weekend_ratio,
        }
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.hourly_avg,
            self.daily_variance,
            self.night_ratio,
            self.peak_ratio,
            self.weekend_ratio,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            hourly_avg: values[0],
            daily_variance: values[1],
            night_ratio: values[2],
            peak_ratio: values[3],
            weekend_ratio: values[4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn feature_order_matches_array_layout() {
        let fv = FeatureVector::from_array([1.0, 2.0, 0.3, 0.4, 0.5]);
        for feature in Feature::ALL {
            assert_eq!(fv.get(feature), fv.to_array()[feature.index()]);
        }
        assert_eq!(Feature::ALL[2].name(), "night_ratio");
    }

    #[test]
    fn reading_validity() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(Reading::new("M1", ts, 0.0).is_valid());
        assert!(!Reading::new("M1", ts, -0.1).is_valid());
        assert!(!Reading::new("M1", ts, f64::NAN).is_valid());
    }
}
