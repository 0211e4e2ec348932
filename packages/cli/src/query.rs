//! Read-only query subcommands. Each prints its result as pretty JSON.

use asie_panel_models::{GeoLevel, Metric};
use asie_query::{QueryEngine, QueryError, SeriesQuery};
use clap::Subcommand;

use crate::print_json;

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    /// Available periods, latest period, and whether district data exists
    Meta,
    /// List states present in the state-level panel
    States,
    /// List districts of a state
    Districts {
        #[arg(long)]
        state: String,
    },
    /// Top geographies per index for the latest period, with deltas
    Summary {
        #[arg(long, default_value = "state")]
        level: GeoLevel,
        #[arg(long)]
        state: Option<String>,
        /// Rows per index (at most 50)
        #[arg(long, default_value = "10")]
        top_n: usize,
    },
    /// Top geographies by one metric for the latest period
    Table {
        #[arg(long, default_value = "state")]
        level: GeoLevel,
        /// Metric column, e.g. `service_stress_index`
        #[arg(long)]
        metric: Metric,
        #[arg(long)]
        state: Option<String>,
        /// Rows to return (at most 100)
        #[arg(long, default_value = "20")]
        top_n: usize,
    },
    /// One metric over time for one geography, with any forecast
    Timeseries {
        #[arg(long, default_value = "state")]
        level: GeoLevel,
        #[arg(long)]
        state: String,
        /// Required at district and pincode level
        #[arg(long)]
        district: Option<String>,
        /// Required at pincode level
        #[arg(long)]
        pincode: Option<String>,
        #[arg(long)]
        metric: Metric,
        /// Earliest period to include (YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
    /// Flagged observations, newest first
    Anomalies {
        #[arg(long, default_value = "state")]
        level: GeoLevel,
        #[arg(long)]
        metric: Option<Metric>,
        /// Earliest period to include (YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },
}

pub fn run(engine: &QueryEngine, command: QueryCommand) -> Result<(), QueryError> {
    log::debug!(
        "[query] {command:?} over {}",
        engine.processed_root().display()
    );

    match command {
        QueryCommand::Meta => print_json(&engine.meta()?),
        QueryCommand::States => print_json(&engine.states()?),
        QueryCommand::Districts { state } => print_json(&engine.districts(&state)?),
        QueryCommand::Summary {
            level,
            state,
            top_n,
        } => print_json(&engine.summary(level, state.as_deref(), top_n)?),
        QueryCommand::Table {
            level,
            metric,
            state,
            top_n,
        } => print_json(&engine.table(level, metric, state.as_deref(), top_n)?),
        QueryCommand::Timeseries {
            level,
            state,
            district,
            pincode,
            metric,
            since,
        } => print_json(&engine.timeseries(&SeriesQuery {
            level,
            state: &state,
            district: district.as_deref(),
            pincode: pincode.as_deref(),
            metric,
            since: since.as_deref(),
        })?),
        QueryCommand::Anomalies {
            level,
            metric,
            since,
            state,
        } => print_json(&engine.anomalies(level, metric, since.as_deref(), state.as_deref())?),
    }

    Ok(())
}
