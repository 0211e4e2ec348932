//! `asie run` and `asie forecast`.
//!
//! Both start from the TOML config (or defaults) and apply command-line
//! overrides on top before handing off to [`asie_pipeline`].

use std::path::PathBuf;

use asie_cli_utils::{IndicatifProgress, MultiProgress};
use asie_ingest::domain::DomainDefinition;
use asie_panel_models::GeoLevel;
use asie_pipeline::{PipelineConfig, PipelineError, run_forecasts, run_pipeline};
use clap::Args;

use crate::print_json;

/// Overrides for `asie run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Geography level to aggregate to (state, district, pincode)
    #[arg(long)]
    pub geo_level: Option<GeoLevel>,
    /// Directory holding one subdirectory per domain
    #[arg(long)]
    pub raw_root: Option<PathBuf>,
    /// Where to write the markdown summary
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// `|z|` at or above which an observation is flagged
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Overrides for `asie forecast`.
#[derive(Debug, Args)]
pub struct ForecastArgs {
    /// Forecast only this geography level
    #[arg(long)]
    pub geo_level: Option<GeoLevel>,
    /// Future periods per series
    #[arg(long)]
    pub horizon: Option<u32>,
    /// Observed periods a geography needs before it is forecast
    #[arg(long)]
    pub min_history: Option<usize>,
}

impl RunArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(level) = self.geo_level {
            config.geo_level = level;
        }
        if let Some(dir) = self.raw_root {
            config.raw_root = dir;
        }
        if let Some(path) = self.report {
            config.report_path = Some(path);
        }
        if let Some(threshold) = self.threshold {
            config.zscore_threshold = threshold;
        }
    }
}

impl ForecastArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(level) = self.geo_level {
            config.forecast.geo_levels = vec![level];
        }
        if let Some(horizon) = self.horizon {
            config.forecast.horizon = horizon;
        }
        if let Some(min_history) = self.min_history {
            config.forecast.min_history = min_history;
        }
    }
}

/// Aggregates, scores, and writes every artifact, then prints the run
/// report.
pub fn run(
    multi: &MultiProgress,
    mut config: PipelineConfig,
    args: RunArgs,
) -> Result<(), PipelineError> {
    args.apply(&mut config);

    let progress = |def: &DomainDefinition| IndicatifProgress::files_bar(multi, &def.id);
    let report = run_pipeline(&config, &progress)?;

    for domain in &report.domains {
        if domain.dropped_dates + domain.dropped_keys > 0 {
            log::warn!(
                "[run] {}: dropped {} row(s) with unparseable dates and {} with missing keys",
                domain.domain,
                domain.dropped_dates,
                domain.dropped_keys
            );
        }
    }
    log::info!("[run] summary written to {}", report.report.display());

    print_json(&report);
    Ok(())
}

/// Forecasts every configured level that has a metrics panel.
pub fn forecast(mut config: PipelineConfig, args: ForecastArgs) -> Result<(), PipelineError> {
    args.apply(&mut config);

    let reports = run_forecasts(&config)?;
    if reports.is_empty() {
        log::warn!(
            "[forecast] no metrics panels found in {}; run `asie run` first",
            config.processed_root.display()
        );
    }

    print_json(&reports);
    Ok(())
}
