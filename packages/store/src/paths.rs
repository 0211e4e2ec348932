#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for pipeline inputs and artifacts.
//!
//! Defaults are relative to the project root: raw inputs under `data/raw/`,
//! parquet artifacts under `data/processed/`, markdown under `reports/`.

use std::path::{Path, PathBuf};

use asie_panel_models::{Frequency, GeoLevel};

/// Name of the single-writer lock file inside the processed directory.
pub const LOCK_FILE: &str = ".asie.lock";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the `data/raw/` directory holding one subdirectory per domain.
#[must_use]
pub fn raw_dir() -> PathBuf {
    data_dir().join("raw")
}

/// Returns the `data/processed/` directory for parquet artifacts.
#[must_use]
pub fn processed_dir() -> PathBuf {
    data_dir().join("processed")
}

/// Returns the `reports/` directory for markdown summaries.
#[must_use]
pub fn reports_dir() -> PathBuf {
    project_root().join("reports")
}

/// File name of an aggregated domain panel (`enrolment_state_M.parquet`).
#[must_use]
pub fn aggregated_file(domain: &str, geo_level: GeoLevel, frequency: Frequency) -> String {
    format!("{domain}_{geo_level}_{frequency}.parquet")
}

/// File name of the merged metrics panel (`metrics_state_M.parquet`).
#[must_use]
pub fn metrics_file(geo_level: GeoLevel, frequency: Frequency) -> String {
    aggregated_file("metrics", geo_level, frequency)
}

/// File name of the anomaly table (`anomalies_state_M.parquet`).
#[must_use]
pub fn anomalies_file(geo_level: GeoLevel, frequency: Frequency) -> String {
    aggregated_file("anomalies", geo_level, frequency)
}

/// File name of the forecast table (`forecast_state.parquet`).
#[must_use]
pub fn forecast_file(geo_level: GeoLevel) -> String {
    format!("forecast_{geo_level}.parquet")
}

/// Default markdown report path for a geo level.
///
/// State-level runs write `summary.md`; other levels get their own file so
/// they do not overwrite it.
#[must_use]
pub fn summary_report_path(reports: &Path, geo_level: GeoLevel) -> PathBuf {
    match geo_level {
        GeoLevel::State => reports.join("summary.md"),
        other => reports.join(format!("summary_{other}.md")),
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
