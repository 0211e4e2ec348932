//! Z-score anomaly detection.
//!
//! For every geography and metric, each observation is compared with the
//! mean of that geography's full history:
//!
//! ```text
//! z = (v - mean) / max(population_std, 1e-9)
//! ```
//!
//! Observations with `|z| >= threshold` are flagged. The score depends only
//! on the shape of the series, not its scale, so a series that is constant
//! apart from one tiny deviation still flags that deviation.

use asie_metrics::stats::{mean, population_std};
use asie_panel_models::{AnomalyRecord, AnomalyTable, Direction, Metric, MetricsTable};

/// Default `|z|` at or above which an observation is flagged.
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 2.0;

/// Lower bound on the standard deviation used as the z-score denominator.
pub const STD_FLOOR: f64 = 1e-9;

/// Flags observations of `metrics` whose per-geography z-score reaches
/// `threshold` in magnitude.
///
/// Output is sorted by period, then metric name, then geography key.
#[must_use]
pub fn detect_anomalies(table: &MetricsTable, metrics: &[Metric], threshold: f64) -> AnomalyTable {
    let mut records = Vec::new();

    for (key, rows) in table.groups() {
        for &metric in metrics {
            let values: Vec<f64> = rows
                .iter()
                .map(|&i| table.records[i].value(metric))
                .collect();
            let m = mean(&values);
            let sd = population_std(&values).max(STD_FLOOR);

            for (&i, v) in rows.iter().zip(&values) {
                let zscore = (v - m) / sd;
                if zscore.abs() >= threshold {
                    records.push(AnomalyRecord {
                        period: table.records[i].period,
                        key: key.clone(),
                        metric,
                        zscore,
                        direction: Direction::from_zscore(zscore),
                    });
                }
            }
        }
    }

    records.sort_by(|a, b| {
        a.period
            .cmp(&b.period)
            .then_with(|| a.metric.as_ref().cmp(b.metric.as_ref()))
            .then_with(|| a.key.cmp(&b.key))
    });

    log::info!(
        "[anomalies] {} flagged across {} metric(s) at |z| >= {threshold}",
        records.len(),
        metrics.len()
    );

    AnomalyTable {
        geo_level: table.geo_level,
        frequency: table.frequency,
        records,
    }
}
