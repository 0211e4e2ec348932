#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end pipeline orchestration.
//!
//! [`run_pipeline`] aggregates the three domains, builds the metrics panel,
//! detects anomalies, and commits every parquet artifact plus the markdown
//! summary in one staged write. [`run_forecasts`] runs later over whichever
//! metrics panels exist. Each recomputes its outputs from scratch, under an
//! exclusive lock on the processed directory.

pub mod config;
pub mod summary;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use asie_analytics::{detect_anomalies, forecast_metrics};
use asie_ingest::domain::DomainDefinition;
use asie_ingest::progress::ProgressCallback;
use asie_ingest::registry::{BIOMETRIC, DEMOGRAPHIC, ENROLMENT, find_domain};
use asie_ingest::{Aggregation, IngestError, aggregate_domain};
use asie_metrics::{MetricsError, compute_indices};
use asie_panel_models::{Frequency, GeoLevel, Period};
use asie_store::paths::{aggregated_file, anomalies_file, forecast_file, metrics_file};
use asie_store::{RunLock, Staging, StoreError, read_metrics, tables};
use serde::Serialize;

pub use config::{ForecastConfig, PipelineConfig};

/// Errors that can occur while running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller supplied an unusable setting.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what went wrong.
        message: String,
    },

    /// Config file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Aggregation failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The aggregated tables did not fit together.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Reading or writing artifacts failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one domain during a run.
#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: String,
    pub files: usize,
    /// `(period, geography)` groups produced.
    pub groups: usize,
    pub dropped_dates: u64,
    pub dropped_keys: u64,
}

impl From<&Aggregation> for DomainReport {
    fn from(agg: &Aggregation) -> Self {
        Self {
            domain: agg.table.domain.clone(),
            files: agg.files.len(),
            groups: agg.table.len(),
            dropped_dates: agg.dropped_dates(),
            dropped_keys: agg.dropped_keys(),
        }
    }
}

/// Outcome of [`run_pipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    pub domains: Vec<DomainReport>,
    pub metrics_rows: usize,
    pub anomalies: usize,
    pub latest_period: Option<Period>,
    /// Every file written, report included.
    pub artifacts: Vec<PathBuf>,
    pub report: PathBuf,
    pub elapsed: Duration,
}

/// Outcome of forecasting one geo level.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub geo_level: GeoLevel,
    pub path: PathBuf,
    pub rows: usize,
}

/// Builds a progress sink for a domain about to be aggregated.
pub type ProgressFactory<'a> = dyn Fn(&DomainDefinition) -> Arc<dyn ProgressCallback> + 'a;

fn domain(id: &str) -> Result<DomainDefinition, PipelineError> {
    find_domain(id).ok_or_else(|| PipelineError::InvalidArgument {
        message: format!("Unknown domain '{id}'"),
    })
}

/// Runs aggregation, index computation, and anomaly detection, then writes
/// every artifact and the summary report.
///
/// Nothing is written unless every stage succeeds.
///
/// # Errors
///
/// * [`PipelineError::InvalidArgument`] for unusable config values.
/// * [`PipelineError::Store`] with [`StoreError::Busy`] if another run holds
///   the processed directory.
/// * [`PipelineError::Ingest`] if a domain has no raw files or a file lacks
///   a required column.
/// * Any read, encode, or write failure.
pub fn run_pipeline(
    config: &PipelineConfig,
    progress: &ProgressFactory<'_>,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let started = Instant::now();
    let geo_level = config.geo_level;
    let frequency = config.frequency;
    let _lock = RunLock::acquire(&config.processed_root)?;

    log::info!(
        "[pipeline] {geo_level}/{frequency} from {} into {}",
        config.raw_root.display(),
        config.processed_root.display()
    );

    let mut aggregations = Vec::with_capacity(3);
    for id in [ENROLMENT, DEMOGRAPHIC, BIOMETRIC] {
        let def = domain(id)?;
        let agg = aggregate_domain(&config.raw_root, &def, frequency, geo_level, &progress(&def))?;
        aggregations.push(agg);
    }
    let [enrol, demo, bio] = [&aggregations[0], &aggregations[1], &aggregations[2]];

    let metrics = compute_indices(&enrol.table, &demo.table, &bio.table)?;
    let anomalies = detect_anomalies(&metrics, &config.anomaly_metrics, config.zscore_threshold);
    let report_path = config.report_path();
    let markdown = summary::render(
        &metrics,
        &anomalies,
        config.top_n,
        config.recent_anomalies,
    );

    let processed = &config.processed_root;
    let mut staging = Staging::new();
    for agg in &aggregations {
        staging.stage_batch(
            &processed.join(aggregated_file(&agg.table.domain, geo_level, frequency)),
            &tables::aggregated_to_batch(&agg.table)?,
        )?;
    }
    staging.stage_batch(
        &processed.join(metrics_file(geo_level, frequency)),
        &tables::metrics_to_batch(&metrics)?,
    )?;
    staging.stage_batch(
        &processed.join(anomalies_file(geo_level, frequency)),
        &tables::anomalies_to_batch(&anomalies)?,
    )?;
    staging.stage_bytes(&report_path, markdown.as_bytes())?;
    let artifacts = staging.commit()?;

    let report = PipelineReport {
        geo_level,
        frequency,
        domains: aggregations.iter().map(DomainReport::from).collect(),
        metrics_rows: metrics.records.len(),
        anomalies: anomalies.records.len(),
        latest_period: metrics.latest_period(),
        artifacts,
        report: report_path,
        elapsed: started.elapsed(),
    };

    log::info!(
        "[pipeline] {} metrics row(s), {} anomal(ies), {} artifact(s) in {:.1?}",
        report.metrics_rows,
        report.anomalies,
        report.artifacts.len(),
        report.elapsed
    );

    Ok(report)
}

/// Forecasts every configured geo level whose metrics panel exists.
///
/// Levels without a metrics artifact are skipped. All forecast files are
/// committed together.
///
/// # Errors
///
/// * [`PipelineError::InvalidArgument`] for unusable config values.
/// * [`PipelineError::Store`] if a metrics panel cannot be decoded, the
///   lock is held, or a write fails.
pub fn run_forecasts(config: &PipelineConfig) -> Result<Vec<ForecastReport>, PipelineError> {
    config.validate()?;
    let processed = &config.processed_root;
    let _lock = RunLock::acquire(processed)?;
    let fc = &config.forecast;

    let mut staging = Staging::new();
    let mut reports = Vec::new();

    for &geo_level in &fc.geo_levels {
        let input = processed.join(metrics_file(geo_level, config.frequency));
        let metrics = match read_metrics(&input) {
            Ok(table) => table,
            Err(StoreError::NotFound { path }) => {
                log::info!(
                    "[forecast] {} not found, skipping {geo_level}",
                    path.display()
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let forecast = forecast_metrics(&metrics, &fc.metrics, fc.horizon, fc.min_history);
        let path = processed.join(forecast_file(geo_level));
        staging.stage_batch(&path, &tables::forecast_to_batch(&forecast)?)?;
        reports.push(ForecastReport {
            geo_level,
            path,
            rows: forecast.records.len(),
        });
    }

    staging.commit()?;
    Ok(reports)
}
