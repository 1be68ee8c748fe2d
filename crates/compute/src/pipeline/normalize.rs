/// Min-max scale raw detector scores into [0, 1] within one batch.
///
/// A single score, or a batch where every score is equal, maps to 0.0.
/// NaN is treated as the least anomalous value.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    let cleaned: Vec<f64> = raw.iter().map(|s| if s.is_nan() { f64::NEG_INFINITY } else { *s }).collect();

    let finite = cleaned.iter().copied().filter(|s| s.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });

    if raw.len() < 2 || !(max > min) {
        return cleaned
            .iter()
            .map(|s| if *s == f64::INFINITY && raw.len() > 1 { 1.0 } else { 0.0 })
            .collect();
    }

    let span = max - min;
    cleaned
        .iter()
        .map(|s| {
            if *s == f64::INFINITY {
                1.0
            } else if *s == f64::NEG_INFINITY {
                0.0
            } else {
                ((s - min) / span).clamp(0.0, 1.0)
            }
        })
        .collect()
}
