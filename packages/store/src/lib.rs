#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parquet persistence for pipeline artifacts.
//!
//! Every artifact is a whole-file parquet table rewritten on each run:
//! aggregated domain panels, the metrics panel, anomalies, and forecasts.
//! Writes go through [`staging::Staging`] so a run's artifact set appears
//! all at once, and [`staging::RunLock`] keeps two runs from writing the
//! same directory concurrently.

pub mod paths;
pub mod staging;
pub mod tables;

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use asie_panel_models::{AggregatedTable, AnomalyTable, ForecastTable, MetricsTable};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

pub use staging::{RunLock, Staging};

/// Errors that can occur while reading or writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The artifact does not exist.
    #[error("Artifact not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The artifact exists but its columns are not what was expected.
    #[error("{}: {message}", path.display())]
    SchemaMismatch {
        /// Offending artifact.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Another run holds the directory lock.
    #[error("Another run holds {}", path.display())]
    Busy {
        /// Lock file path.
        path: PathBuf,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Parquet error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Table metadata could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads every record batch of a parquet file along with its schema.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if `path` does not exist, or a parquet
/// error if the file cannot be decoded.
pub fn read_parquet(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>), StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Reads an aggregated domain table.
///
/// # Errors
///
/// See [`read_parquet`] and [`tables::aggregated_from_batches`].
pub fn read_aggregated(path: &Path) -> Result<AggregatedTable, StoreError> {
    let (schema, batches) = read_parquet(path)?;
    tables::aggregated_from_batches(&schema, &batches, path)
}

/// Reads a metrics panel.
///
/// # Errors
///
/// See [`read_parquet`] and [`tables::metrics_from_batches`].
pub fn read_metrics(path: &Path) -> Result<MetricsTable, StoreError> {
    let (schema, batches) = read_parquet(path)?;
    tables::metrics_from_batches(&schema, &batches, path)
}

/// Reads an anomaly table.
///
/// # Errors
///
/// See [`read_parquet`] and [`tables::anomalies_from_batches`].
pub fn read_anomalies(path: &Path) -> Result<AnomalyTable, StoreError> {
    let (schema, batches) = read_parquet(path)?;
    tables::anomalies_from_batches(&schema, &batches, path)
}

/// Reads a forecast table.
///
/// # Errors
///
/// See [`read_parquet`] and [`tables::forecast_from_batches`].
pub fn read_forecast(path: &Path) -> Result<ForecastTable, StoreError> {
    let (schema, batches) = read_parquet(path)?;
    tables::forecast_from_batches(&schema, &batches, path)
}
