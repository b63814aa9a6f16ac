//! Summary statistics for cohort aggregation.
//!
//! Small free functions over `f64` slices. Callers drop nulls before
//! calling in; empty input yields `None` rather than NaN.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1 denominator). A single observation
/// has no spread and yields 0.
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Quantile with linear interpolation between order statistics.
/// `p` is clamped to [0, 1].
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in quantile input"));

    let p = p.clamp(0.0, 1.0);
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Normal-approximation 95% confidence interval for the mean
/// (z = 1.96). Returns (center, low, high).
pub fn mean_ci95(values: &[f64]) -> Option<(f64, f64, f64)> {
    let m = mean(values)?;
    let sd = sample_sd(values)?;
    let half_width = 1.96 * sd / (values.len() as f64).sqrt();
    Some((m, m - half_width, m + half_width))
}
