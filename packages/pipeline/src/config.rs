//! Pipeline run configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) runs a
//! state-level monthly pipeline over the project's `data/` directory.
//! Relative paths are taken relative to the working directory.
//!
//! ```toml
//! geo_level = "district"
//! frequency = "M"
//! zscore_threshold = 2.5
//!
//! [forecast]
//! horizon = 3
//! geo_levels = ["district"]
//! ```

use std::path::{Path, PathBuf};

use asie_analytics::{DEFAULT_HORIZON, DEFAULT_MIN_HISTORY, DEFAULT_ZSCORE_THRESHOLD};
use asie_panel_models::{Frequency, GeoLevel, Metric};
use asie_store::paths;
use serde::Deserialize;

use crate::PipelineError;

/// Rows shown per index in the summary report.
pub const DEFAULT_TOP_N: usize = 5;

/// Most recent anomalies listed in the summary report.
pub const DEFAULT_RECENT_ANOMALIES: usize = 20;

/// Settings for [`crate::run_pipeline`] and [`crate::run_forecasts`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Directory holding one subdirectory per domain.
    pub raw_root: PathBuf,
    /// Directory parquet artifacts are written to.
    pub processed_root: PathBuf,
    /// Directory the default summary report is written to.
    pub reports_root: PathBuf,
    /// Explicit report path, overriding the per-level default.
    pub report_path: Option<PathBuf>,
    /// `|z|` at or above which an observation is flagged.
    pub zscore_threshold: f64,
    pub anomaly_metrics: Vec<Metric>,
    /// Rows per index in the report's highlight tables.
    pub top_n: usize,
    /// Anomalies listed in the report.
    pub recent_anomalies: usize,
    pub forecast: ForecastConfig,
}

/// Settings for the forecasting stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Future periods per series.
    pub horizon: u32,
    /// Rows a geography needs before it is forecast.
    pub min_history: usize,
    pub metrics: Vec<Metric>,
    /// Levels to forecast; levels without a metrics artifact are skipped.
    pub geo_levels: Vec<GeoLevel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geo_level: GeoLevel::default(),
            frequency: Frequency::default(),
            raw_root: paths::raw_dir(),
            processed_root: paths::processed_dir(),
            reports_root: paths::reports_dir(),
            report_path: None,
            zscore_threshold: DEFAULT_ZSCORE_THRESHOLD,
            anomaly_metrics: Metric::DEFAULT_ANOMALY.to_vec(),
            top_n: DEFAULT_TOP_N,
            recent_anomalies: DEFAULT_RECENT_ANOMALIES,
            forecast: ForecastConfig::default(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            min_history: DEFAULT_MIN_HISTORY,
            metrics: Metric::DEFAULT_FORECAST.to_vec(),
            geo_levels: vec![GeoLevel::State, GeoLevel::District],
        }
    }
}

impl PipelineConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or names an
    /// unknown field, level, frequency, or metric.
    pub fn from_toml_str(s: &str) -> Result<Self, PipelineError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or see
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        log::debug!("[config] loading {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Summary report destination.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| paths::summary_report_path(&self.reports_root, self.geo_level))
    }

    /// Checks values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] for a non-positive or
    /// non-finite threshold, a zero horizon, or a zero `top_n`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.zscore_threshold.is_finite() || self.zscore_threshold <= 0.0 {
            return Err(PipelineError::InvalidArgument {
                message: format!(
                    "zscore_threshold must be a positive number, got {}",
                    self.zscore_threshold
                ),
            });
        }
        if self.forecast.horizon == 0 {
            return Err(PipelineError::InvalidArgument {
                message: "forecast horizon must be at least 1".to_string(),
            });
        }
        if self.top_n == 0 {
            return Err(PipelineError::InvalidArgument {
                message: "top_n must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
