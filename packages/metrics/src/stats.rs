//! Column statistics used by the index formulas.
//!
//! Every function takes a whole column (or one geography's slice of it) and
//! returns a column of the same length. Missing values are represented as
//! `NaN`.

/// Added to denominators that may be zero.
pub const EPSILON: f64 = 1e-9;

/// Trailing window used for demographic-update variability.
pub const ROLLING_WINDOW: usize = 3;

/// Divides, yielding 0 for a zero denominator or any non-finite result.
#[must_use]
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let out = numerator / denominator;
    if out.is_finite() { out } else { 0.0 }
}

/// Rounds to 2 decimals, ties to even.
#[must_use]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Percentile rank of each value within `values`.
///
/// Ties share the average of their ranks. Ranks are 1-based and divided by
/// the number of non-missing values, so the largest value maps to 1.0.
/// Missing values map to 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pct_rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let count = order.len() as f64;
    let mut ranks = vec![0.0; values.len()];

    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Ranks start+1 ..= end share their mean.
        let avg = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = avg / count;
        }
        start = end;
    }

    ranks
}

/// Arithmetic mean, `NaN` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sample standard deviation (divides by `n - 1`), `NaN` below 2 values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Z-score of each value against the slice, with [`EPSILON`] added to the
/// population standard deviation.
#[must_use]
pub fn zscores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = population_std(values) + EPSILON;
    values.iter().map(|v| (v - m) / sd).collect()
}

/// Coefficient of variation over a trailing window of [`ROLLING_WINDOW`]
/// values (fewer at the start).
///
/// A window with a single value has no sample deviation and yields 0.
#[must_use]
pub fn rolling_cv(values: &[f64]) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let window = &values[(i + 1).saturating_sub(ROLLING_WINDOW)..=i];
            safe_div(sample_std(window), mean(window) + EPSILON)
        })
        .collect()
}
