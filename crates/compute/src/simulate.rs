//! Seeded synthetic smart-meter fleet with labelled anomalies.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use powerguard_core::{MeterId, Reading};

/// Household load multiplier per hour of day.
const HOURLY_PROFILE: [f64; 24] = [
    0.3, 0.2, 0.2, 0.2, 0.2, 0.3, // 00-05
    0.6, 0.8, 0.9, 0.7, // 06-09
    0.5, 0.5, 0.6, 0.5, 0.4, 0.4, 0.5, 0.7, // 10-17
    0.9, 1.0, 0.9, 0.8, // 18-21
    0.6, 0.4, // 22-23
];

/// Injected consumption pattern of an anomalous meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Very low draw, as from a bypassed meter.
    Theft,
    /// Heavy draw between 22:00 and 05:59.
    NightSpike,
    /// Flat draw regardless of the hour.
    Constant,
    /// Random 3-8x spikes.
    Extreme,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 4] = [
        AnomalyKind::Theft,
        AnomalyKind::NightSpike,
        AnomalyKind::Constant,
        AnomalyKind::Extreme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Theft => "theft",
            AnomalyKind::NightSpike => "night_spike",
            AnomalyKind::Constant => "constant",
            AnomalyKind::Extreme => "extreme",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground truth for one simulated meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterLabel {
    pub meter_id: MeterId,
    pub anomaly: Option<AnomalyKind>,
}

#[derive(Debug, Clone, Default)]
pub struct Fleet {
    pub readings: Vec<Reading>,
    pub labels: Vec<MeterLabel>,
}

impl Fleet {
    pub fn anomalous_ids(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(|l| l.anomaly.is_some())
            .map(|l| l.meter_id.as_str())
    }

    /// Anomalous meter count per kind.
    pub fn breakdown(&self) -> BTreeMap<AnomalyKind, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.labels.iter().filter_map(|l| l.anomaly) {
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSimulator {
    pub num_meters: usize,
    pub num_days: usize,
    /// Fraction of meters given an anomaly, in [0, 1].
    pub anomaly_rate: f64,
    pub seed: u64,
    /// First reading; every meter reports hourly from here.
    pub start: NaiveDateTime,
}

impl Default for FleetSimulator {
    fn default() -> Self {
        Self {
            num_meters: 50,
            num_days: 30,
            anomaly_rate: 0.15,
            seed: 42,
            start: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        }
    }
}

impl FleetSimulator {
    pub fn generate(&self) -> Fleet {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let rate = self.anomaly_rate.clamp(0.0, 1.0);
        let num_anomalous = ((self.num_meters as f64 * rate) as usize).min(self.num_meters);
        let mut anomalous = vec![false; self.num_meters];
        for i in index::sample(&mut rng, self.num_meters, num_anomalous) {
            anomalous[i] = true;
        }

        let mut fleet = Fleet {
            readings: Vec::with_capacity(self.num_meters * self.num_days * 24),
            labels: Vec::with_capacity(self.num_meters),
        };

        for (i, is_anomalous) in anomalous.into_iter().enumerate() {
            let meter_id = format!("METER_{:04}", i + 1);
            let anomaly = if is_anomalous {
                AnomalyKind::ALL.choose(&mut rng).copied()
            } else {
                None
            };
            self.generate_meter(&meter_id, anomaly, &mut rng, &mut fleet.readings);
            fleet.labels.push(MeterLabel { meter_id, anomaly });
        }

        fleet
    }

    fn generate_meter(&self, meter_id: &str, anomaly: Option<AnomalyKind>, rng: &mut StdRng, out: &mut Vec<Reading>) {
        let base = rng.gen_range(1.0..5.0);
        let weekend_factor = rng.gen_range(1.1..1.3);

        for day in 0..self.num_days {
            let day_start = self.start + Duration::days(day as i64);
            let day_base = match day_start.weekday() {
                Weekday::Sat | Weekday::Sun => base * weekend_factor,
                _ => base,
            };

            for hour in 0..24u32 {
                let kwh = match anomaly {
                    None => normal_load(hour, day_base, rng),
                    Some(kind) => anomalous_load(kind, hour, day_base, rng),
                };
                let kwh = (kwh.max(0.0) * 1000.0).round() / 1000.0;
                out.push(Reading::new(meter_id, day_start + Duration::hours(hour as i64), kwh));
            }
        }
    }
}

fn normal_load(hour: u32, base: f64, rng: &mut StdRng) -> f64 {
    base * HOURLY_PROFILE[hour as usize % 24] * rng.gen_range(0.8..1.2)
}

fn anomalous_load(kind: AnomalyKind, hour: u32, base: f64, rng: &mut StdRng) -> f64 {
    match kind {
        AnomalyKind::Theft => base * rng.gen_range(0.05..0.15),
        AnomalyKind::NightSpike => {
            if hour >= 22 || hour <= 5 {
                base * rng.gen_range(1.5..3.0)
            } else {
                normal_load(hour, base, rng)
            }
        }
        AnomalyKind::Constant => base * rng.gen_range(0.8..1.2),
        AnomalyKind::Extreme => {
            if rng.gen_bool(0.3) {
                base * rng.gen_range(3.0..8.0)
            } else {
                normal_load(hour, base, rng)
            }
        }
    }
}
