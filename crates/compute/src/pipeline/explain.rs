//! Templated justification text for a scored meter.
//!
//! The text names the one or two features that deviate most from the
//! batch baseline, with direction. Ties go to the earlier feature in
//! canonical order.

use powerguard_core::{Feature, FeatureVector, RiskLevel};

use super::classify::Classification;
use super::population::{PopulationBaseline, EPS};

/// Second feature is named only when its |z| is at least this share of the top one.
const SECONDARY_SHARE: f64 = 0.5;

pub const NORMAL_TEXT: &str = "Consumption pattern is within normal bounds relative to peers.";

/// A feature's signed deviation from the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub feature: Feature,
    pub z: f64,
}

impl Deviation {
    fn clause(&self) -> &'static str {
        let high = self.z > 0.0;
        match (self.feature, high) {
            (Feature::HourlyAvg, true) => "unusually high average hourly consumption relative to peers",
            (Feature::HourlyAvg, false) => "unusually low average hourly consumption relative to peers",
            (Feature::DailyVariance, true) => "unusually erratic day-to-day consumption relative to peers",
            (Feature::DailyVariance, false) => "unusually steady day-to-day consumption relative to peers",
            (Feature::NightRatio, true) => "unusually high night-time usage relative to peers",
            (Feature::NightRatio, false) => "unusually low night-time usage relative to peers",
            (Feature::PeakRatio, true) => "unusually high evening peak usage relative to peers",
            (Feature::PeakRatio, false) => "unusually low evening peak usage relative to peers",
            (Feature::WeekendRatio, true) => "unusually high weekend usage relative to peers",
            (Feature::WeekendRatio, false) => "unusually low weekend usage relative to peers",
        }
    }
}

pub struct ExplanationGenerator<'a> {
    baseline: &'a PopulationBaseline,
}

impl<'a> ExplanationGenerator<'a> {
    pub fn new(baseline: &'a PopulationBaseline) -> Self {
        Self { baseline }
    }

    /// Up to two deviating features, strongest first. Empty when nothing
    /// deviates from the baseline.
    pub fn top_deviations(&self, fv: &FeatureVector) -> Vec<Deviation> {
        let z = self.baseline.z_scores(fv);

        let Some(first) = strongest(&z, None) else {
            return Vec::new();
        };
        let mut out = vec![Deviation { feature: first, z: z[first.index()] }];

        if let Some(second) = strongest(&z, Some(first)) {
            let top = z[first.index()].abs();
            let runner_up = z[second.index()].abs();
            if runner_up >= SECONDARY_SHARE * top {
                out.push(Deviation { feature: second, z: z[second.index()] });
            }
        }
        out
    }

    pub fn explain(&self, fv: &FeatureVector, classification: Classification) -> String {
        if !classification.is_suspicious {
            return NORMAL_TEXT.to_string();
        }

        let tag = tier_tag(classification.risk_level);
        let deviations = self.top_deviations(fv);
        if deviations.is_empty() {
            return format!("{} Unusual combination of consumption features relative to peers.", tag);
        }

        let clauses: Vec<&str> = deviations.iter().map(Deviation::clause).collect();
        format!("{} {}.", tag, capitalize(&clauses.join("; ")))
    }
}

/// First feature in canonical order whose |z| is within EPS of the maximum.
fn strongest(z: &[f64], exclude: Option<Feature>) -> Option<Feature> {
    let candidates = move || Feature::ALL.into_iter().filter(move |f| Some(*f) != exclude);

    let max = candidates().map(|f| z[f.index()].abs()).fold(0.0, f64::max);
    if max < EPS {
        return None;
    }
    candidates().find(|f| z[f.index()].abs() >= max - EPS)
}

fn tier_tag(level: RiskLevel) -> String {
    format!("[{} RISK]", level.as_str().to_uppercase())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: [f64; 5]) -> FeatureVector {
        FeatureVector::from_array(values)
    }

    fn flagged(level: RiskLevel) -> Classification {
        Classification { risk_level: level, is_suspicious: true }
    }

    fn baseline() -> PopulationBaseline {
        PopulationBaseline::from_vectors(&[
            fv([1.0, 2.0, 0.25, 0.17, 0.28]),
            fv([1.1, 2.2, 0.24, 0.18, 0.29]),
            fv([0.9, 1.8, 0.26, 0.16, 0.27]),
            fv([1.0, 2.0, 0.90, 0.02, 0.28]),
        ])
    }

    #[test]
    fn names_night_usage_for_night_heavy_meter() {
        let baseline = baseline();
        let generator = ExplanationGenerator::new(&baseline);
        let text = generator.explain(&fv([1.0, 2.0, 0.90, 0.02, 0.28]), flagged(RiskLevel::Critical));

        assert!(text.starts_with("[CRITICAL RISK] "));
        assert!(text.contains("night-time usage"));
        assert!(text.ends_with('.'));
    }

    #[test]
    fn normal_meter_gets_normal_text() {
        let baseline = baseline();
        let generator = ExplanationGenerator::new(&baseline);
        let calm = Classification { risk_level: RiskLevel::High, is_suspicious: false };
        assert_eq!(generator.explain(&fv([1.0, 2.0, 0.90, 0.02, 0.28]), calm), NORMAL_TEXT);
    }

    #[test]
    fn no_deviation_falls_back() {
        let same = fv([1.0, 1.0, 0.2, 0.2, 0.2]);
        let baseline = PopulationBaseline::from_vectors(&[same, same]);
        let generator = ExplanationGenerator::new(&baseline);
        assert_eq!(
            generator.explain(&same, flagged(RiskLevel::High)),
            "[HIGH RISK] Unusual combination of consumption features relative to peers."
        );
    }

    #[test]
    fn ties_follow_feature_order() {
        // Daily variance and night ratio deviate identically; peak ratio likewise.
        let baseline = PopulationBaseline::from_vectors(&[
            fv([1.0, 0.0, 0.25, 0.2, 0.3]),
            fv([1.0, 4.0, 0.75, 0.0, 0.3]),
        ]);
        let generator = ExplanationGenerator::new(&baseline);
        let top = generator.top_deviations(&fv([1.0, 4.0, 0.75, 0.0, 0.3]));

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].feature, Feature::DailyVariance);
        assert_eq!(top[1].feature, Feature::NightRatio);
    }

    #[test]
    fn weak_second_feature_is_dropped() {
        let baseline = PopulationBaseline::from_vectors(&[
            fv([1.0, 0.0, 0.0, 0.0, 0.0]),
            fv([1.0, 0.0, 0.0, 0.0, 0.0]),
            fv([1.0, 0.0, 0.0, 0.0, 0.0]),
            fv([5.0, 0.0, 0.0, 0.0, 0.1]),
            fv([1.0, 0.0, 0.0, 0.0, 0.1]),
        ]);
        let generator = ExplanationGenerator::new(&baseline);
        // hourly_avg z = 2.0, weekend_ratio z ~ 1.22: both named.
        let top = generator.top_deviations(&fv([5.0, 0.0, 0.0, 0.0, 0.1]));
        assert_eq!(top.len(), 2);

        // weekend_ratio z ~ -0.82 falls under half of the top.
        let text = generator.explain(&fv([5.0, 0.0, 0.0, 0.0, 0.0]), flagged(RiskLevel::Critical));
        assert!(text.contains("high average hourly consumption"));
        assert!(!text.contains(';'));
    }

    #[test]
    fn direction_follows_sign() {
        let baseline = baseline();
        let generator = ExplanationGenerator::new(&baseline);
        let top = generator.top_deviations(&fv([1.0, 2.0, 0.90, 0.02, 0.28]));
        let peak = top.iter().find(|d| d.feature == Feature::PeakRatio);
        if let Some(peak) = peak {
            assert!(peak.z < 0.0);
            assert!(peak.clause().contains("low"));
        }
        assert!(top[0].z > 0.0);
    }
}
