//! Straight-line trend forecasts.
//!
//! Each geography's history of a metric is fit by ordinary least squares
//! against its position in the series (0, 1, 2, ...), not against calendar
//! time, and the line is extended `horizon` periods past the geography's
//! latest observed period.

use asie_metrics::stats::round2;
use asie_panel_models::{ForecastRecord, ForecastTable, Metric, MetricsTable};

/// Default number of future periods.
pub const DEFAULT_HORIZON: u32 = 6;

/// Default number of rows a geography needs before it is forecast at all.
pub const DEFAULT_MIN_HISTORY: usize = 6;

/// Fewest finite observations a metric needs for a line fit.
pub const MIN_FIT_POINTS: usize = 3;

/// Least-squares line through `(x, y)` points as `(slope, intercept)`.
///
/// Returns `None` with fewer than [`MIN_FIT_POINTS`] points or when every `x`
/// is the same.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < MIN_FIT_POINTS {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Forecasts `metrics` for every geography with at least `min_history`
/// rows.
///
/// Rows are ordered by geography, then by the order of `metrics`, then by
/// period.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn forecast_metrics(
    table: &MetricsTable,
    metrics: &[Metric],
    horizon: u32,
    min_history: usize,
) -> ForecastTable {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (key, rows) in table.groups() {
        if rows.len() < min_history {
            skipped += 1;
            continue;
        }
        let Some(latest) = rows.last().map(|&i| table.records[i].period) else {
            continue;
        };

        for &metric in metrics {
            let points: Vec<(f64, f64)> = rows
                .iter()
                .enumerate()
                .map(|(x, &i)| (x as f64, table.records[i].value(metric)))
                .filter(|(_, y)| y.is_finite())
                .collect();
            let Some((slope, intercept)) = fit_line(&points) else {
                continue;
            };

            let next_x = rows.len() as f64;
            for step in 1..=horizon {
                let Some(period) = latest.advance(table.frequency, step) else {
                    break;
                };
                let x = next_x + f64::from(step - 1);
                records.push(ForecastRecord {
                    key: key.clone(),
                    metric,
                    period,
                    forecast: round2(slope.mul_add(x, intercept)),
                });
            }
        }
    }

    log::info!(
        "[forecast] {} row(s), horizon {horizon}; {skipped} geograph(ies) below {min_history} period(s) skipped",
        records.len()
    );

    ForecastTable {
        geo_level: table.geo_level,
        frequency: table.frequency,
        records,
    }
}
