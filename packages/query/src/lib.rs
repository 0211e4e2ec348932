#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reporting queries over the artifacts a pipeline run leaves behind.
//!
//! Nothing here writes. Artifacts are decoded on first use and kept in
//! per-type [`ArtifactCache`]s, which notice when a later run replaces a
//! file. A missing optional artifact (no district panel, no forecasts) is
//! reported as [`QueryError::NotFound`] or simply omitted, never a panic.

pub mod cache;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asie_metrics::stats::round2;
use asie_panel_models::{
    AnomalyTable, Direction, ForecastTable, Frequency, GeoLevel, GeographyKey, Metric,
    MetricsRecord, MetricsTable, Period, Severity,
};
use asie_store::paths::{anomalies_file, forecast_file, metrics_file};
use asie_store::{StoreError, read_anomalies, read_forecast, read_metrics};
use chrono::NaiveDate;
use serde::Serialize;

pub use cache::{ArtifactCache, DEFAULT_CAPACITY};

/// Largest `top_n` accepted by [`QueryEngine::summary`].
pub const MAX_SUMMARY_TOP_N: usize = 50;

/// Largest `top_n` accepted by [`QueryEngine::table`].
pub const MAX_TABLE_TOP_N: usize = 100;

/// Errors returned by queries.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The requested artifact or geography does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// A query parameter was unusable.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what went wrong.
        message: String,
    },

    /// An artifact exists but could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn not_found(message: impl Into<String>) -> QueryError {
    QueryError::NotFound {
        message: message.into(),
    }
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidArgument {
        message: message.into(),
    }
}

/// Maps a missing file to a readable [`QueryError::NotFound`].
fn unavailable(err: StoreError, what: &str) -> QueryError {
    match err {
        StoreError::NotFound { path } => {
            log::debug!("[query] {} does not exist", path.display());
            not_found(format!("{what} not available"))
        }
        other => other.into(),
    }
}

/// Parses a `since` bound given as `YYYY-MM` or `YYYY-MM-DD`.
///
/// # Errors
///
/// Returns [`QueryError::InvalidArgument`] for anything else.
pub fn parse_since(s: &str) -> Result<NaiveDate, QueryError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .map_err(|_| invalid(format!("since must be YYYY-MM or YYYY-MM-DD, got '{s}'")))
}

fn parse_optional_since(since: Option<&str>) -> Result<Option<NaiveDate>, QueryError> {
    since.map(parse_since).transpose()
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

fn in_state(key: &GeographyKey, state: Option<&str>) -> bool {
    state.is_none_or(|s| same_name(key.state(), s))
}

fn capped(top_n: usize, max: usize) -> Result<usize, QueryError> {
    if top_n == 0 {
        return Err(invalid("top_n must be at least 1"));
    }
    if top_n > max {
        log::debug!("[query] top_n {top_n} capped at {max}");
    }
    Ok(top_n.min(max))
}

/// Period labels used in query output: `YYYY-MM` for monthly and coarser
/// panels, the full start date otherwise.
#[must_use]
pub fn period_label(period: Period, frequency: Frequency) -> String {
    match frequency {
        Frequency::Daily | Frequency::Weekly => period.to_string(),
        Frequency::Monthly | Frequency::Quarterly | Frequency::Yearly => period.month_label(),
    }
}

/// Overview of what the processed directory holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    /// Every state-level period, oldest first.
    pub periods: Vec<String>,
    pub latest_period: Option<String>,
    pub has_district: bool,
    pub indices: Vec<Metric>,
    pub frequency: Frequency,
}

/// One ranked row of a top-N listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    /// 1-based.
    pub rank: usize,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    pub metric: Metric,
    pub value: f64,
    /// Change since the geography's previous observed period. Only set by
    /// [`QueryEngine::summary`], and only when such a period exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// Top rows per index for the latest period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub geo_level: GeoLevel,
    pub latest_period: String,
    /// One listing per index, in [`Metric::INDICES`] order.
    pub indices: Vec<IndexRanking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRanking {
    pub metric: Metric,
    pub rows: Vec<RankedRow>,
}

/// Forecast values appended to a [`TimeSeries`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastOverlay {
    pub periods: Vec<String>,
    pub values: Vec<f64>,
}

/// One metric over time for one geography.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub geo_level: GeoLevel,
    pub key: Vec<String>,
    pub metric: Metric,
    pub periods: Vec<String>,
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastOverlay>,
}

/// Parameters of [`QueryEngine::timeseries`].
#[derive(Debug, Clone, Copy)]
pub struct SeriesQuery<'a> {
    pub level: GeoLevel,
    pub state: &'a str,
    /// Required at district and pincode level.
    pub district: Option<&'a str>,
    /// Required at pincode level.
    pub pincode: Option<&'a str>,
    pub metric: Metric,
    /// `YYYY-MM` or `YYYY-MM-DD`; earlier periods are dropped.
    pub since: Option<&'a str>,
}

/// One anomaly as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub period: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    pub metric: Metric,
    pub zscore: f64,
    pub direction: Direction,
    pub severity: Severity,
}

fn key_parts(key: &GeographyKey) -> (String, Option<String>, Option<String>) {
    let fields = key.fields();
    (
        key.state().to_string(),
        fields.get(1).cloned(),
        fields.get(2).cloned(),
    )
}

/// Latest-period rows paired with each geography's preceding row.
type Current<'a> = Vec<(&'a MetricsRecord, Option<&'a MetricsRecord>)>;

fn rank(rows: &Current<'_>, metric: Metric, n: usize, with_delta: bool) -> Vec<RankedRow> {
    let mut order: Vec<_> = rows.iter().collect();
    order.sort_by(|(a, _), (b, _)| {
        b.value(metric)
            .total_cmp(&a.value(metric))
            .then_with(|| a.key.cmp(&b.key))
    });

    order
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (current, previous))| {
            let value = current.value(metric);
            let (state, district, pincode) = key_parts(&current.key);
            RankedRow {
                rank: i + 1,
                state,
                district,
                pincode,
                metric,
                value,
                delta: previous
                    .filter(|_| with_delta)
                    .map(|p| round2(value - p.value(metric))),
            }
        })
        .collect()
}

/// Read-only view over one processed directory at one frequency.
pub struct QueryEngine {
    processed_root: PathBuf,
    frequency: Frequency,
    metrics: ArtifactCache<MetricsTable>,
    anomalies: ArtifactCache<AnomalyTable>,
    forecasts: ArtifactCache<ForecastTable>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(processed_root: impl Into<PathBuf>, frequency: Frequency) -> Self {
        Self::with_capacity(processed_root, frequency, DEFAULT_CAPACITY)
    }

    /// Like [`Self::new`], with `capacity` artifacts cached per type.
    #[must_use]
    pub fn with_capacity(
        processed_root: impl Into<PathBuf>,
        frequency: Frequency,
        capacity: usize,
    ) -> Self {
        Self {
            processed_root: processed_root.into(),
            frequency,
            metrics: ArtifactCache::new(capacity),
            anomalies: ArtifactCache::new(capacity),
            forecasts: ArtifactCache::new(capacity),
        }
    }

    #[must_use]
    pub fn processed_root(&self) -> &Path {
        &self.processed_root
    }

    #[must_use]
    pub const fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Drops every cached artifact.
    pub fn clear_cache(&self) {
        self.metrics.clear();
        self.anomalies.clear();
        self.forecasts.clear();
    }

    fn label(&self, period: Period) -> String {
        period_label(period, self.frequency)
    }

    fn metrics_table(&self, level: GeoLevel) -> Result<Arc<MetricsTable>, QueryError> {
        let path = self.processed_root.join(metrics_file(level, self.frequency));
        self.metrics
            .get_or_load(&path, read_metrics)
            .map_err(|e| unavailable(e, &format!("{level} metrics")))
    }

    fn anomaly_table(&self, level: GeoLevel) -> Result<Arc<AnomalyTable>, QueryError> {
        let path = self.processed_root.join(anomalies_file(level, self.frequency));
        self.anomalies
            .get_or_load(&path, read_anomalies)
            .map_err(|e| unavailable(e, &format!("{level} anomalies")))
    }

    /// Forecasts for `level`, `None` if none have been produced.
    fn forecast_table(&self, level: GeoLevel) -> Result<Option<Arc<ForecastTable>>, QueryError> {
        let path = self.processed_root.join(forecast_file(level));
        match self.forecasts.get_or_load(&path, read_forecast) {
            Ok(table) => Ok(Some(table)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Latest-period rows, optionally restricted to one state.
    fn current<'a>(
        table: &'a MetricsTable,
        state: Option<&str>,
    ) -> Result<(Period, Current<'a>), QueryError> {
        let latest = table
            .latest_period()
            .ok_or_else(|| not_found(format!("{} metrics are empty", table.geo_level)))?;

        let mut rows = Current::new();
        for indices in table.groups().into_values() {
            let Some(pos) = indices
                .iter()
                .position(|&i| table.records[i].period == latest)
            else {
                continue;
            };
            let current = &table.records[indices[pos]];
            if !in_state(&current.key, state) {
                continue;
            }
            let previous = pos.checked_sub(1).map(|p| &table.records[indices[p]]);
            rows.push((current, previous));
        }

        if rows.is_empty() {
            return Err(not_found(format!(
                "no {} rows for state '{}' in {latest}",
                table.geo_level,
                state.unwrap_or_default()
            )));
        }
        Ok((latest, rows))
    }

    /// Periods, latest period, and which levels are available.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if there is no state-level panel.
    pub fn meta(&self) -> Result<Meta, QueryError> {
        let table = self.metrics_table(GeoLevel::State)?;
        let periods: BTreeSet<Period> = table.records.iter().map(|r| r.period).collect();
        let has_district = self
            .processed_root
            .join(metrics_file(GeoLevel::District, self.frequency))
            .is_file();

        Ok(Meta {
            latest_period: periods.last().map(|&p| self.label(p)),
            periods: periods.into_iter().map(|p| self.label(p)).collect(),
            has_district,
            indices: Metric::INDICES.to_vec(),
            frequency: self.frequency,
        })
    }

    /// Every state in the state-level panel, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if there is no state-level panel.
    pub fn states(&self) -> Result<Vec<String>, QueryError> {
        let table = self.metrics_table(GeoLevel::State)?;
        let states: BTreeSet<&str> = table.records.iter().map(|r| r.key.state()).collect();
        Ok(states.into_iter().map(str::to_string).collect())
    }

    /// Districts of `state` (matched case-insensitively), sorted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if there is no district panel or the
    /// state does not appear in it.
    pub fn districts(&self, state: &str) -> Result<Vec<String>, QueryError> {
        let table = self.metrics_table(GeoLevel::District)?;
        let districts: BTreeSet<&str> = table
            .records
            .iter()
            .filter(|r| in_state(&r.key, Some(state)))
            .filter_map(|r| r.key.district())
            .collect();
        if districts.is_empty() {
            return Err(not_found(format!("unknown state '{state}'")));
        }
        Ok(districts.into_iter().map(str::to_string).collect())
    }

    /// Top `top_n` geographies per index for the latest period, each with its
    /// change since its previous observed period. A geography with no
    /// earlier row has no delta.
    ///
    /// `top_n` is capped at [`MAX_SUMMARY_TOP_N`].
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidArgument`] if `top_n` is 0.
    /// * [`QueryError::NotFound`] if the panel is missing or has no rows for
    ///   `state`.
    pub fn summary(
        &self,
        level: GeoLevel,
        state: Option<&str>,
        top_n: usize,
    ) -> Result<Summary, QueryError> {
        let top_n = capped(top_n, MAX_SUMMARY_TOP_N)?;
        let table = self.metrics_table(level)?;
        let (latest, rows) = Self::current(&table, state)?;

        Ok(Summary {
            geo_level: level,
            latest_period: self.label(latest),
            indices: Metric::INDICES
                .into_iter()
                .map(|metric| IndexRanking {
                    metric,
                    rows: rank(&rows, metric, top_n, true),
                })
                .collect(),
        })
    }

    /// Top `top_n` geographies by `metric` for the latest period.
    ///
    /// `top_n` is capped at [`MAX_TABLE_TOP_N`].
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidArgument`] if `top_n` is 0.
    /// * [`QueryError::NotFound`] if the panel is missing or has no rows for
    ///   `state`.
    pub fn table(
        &self,
        level: GeoLevel,
        metric: Metric,
        state: Option<&str>,
        top_n: usize,
    ) -> Result<Vec<RankedRow>, QueryError> {
        let top_n = capped(top_n, MAX_TABLE_TOP_N)?;
        let table = self.metrics_table(level)?;
        let (_, rows) = Self::current(&table, state)?;
        Ok(rank(&rows, metric, top_n, false))
    }

    /// One metric over time for one geography, with forecasts appended when
    /// they exist.
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidArgument`] if a key field the level needs is
    ///   missing, or `since` is malformed.
    /// * [`QueryError::NotFound`] if the panel is missing or no rows match.
    pub fn timeseries(&self, query: &SeriesQuery<'_>) -> Result<TimeSeries, QueryError> {
        let level = query.level;
        let mut wanted = vec![query.state];
        let optional = [query.district, query.pincode];
        for (column, value) in level.columns().iter().skip(1).zip(optional) {
            let value =
                value.ok_or_else(|| invalid(format!("{column} is required at {level} level")))?;
            wanted.push(value);
        }
        let since = parse_optional_since(query.since)?;
        let matches = |key: &GeographyKey| {
            key.fields()
                .iter()
                .zip(&wanted)
                .all(|(field, want)| same_name(field, want))
        };

        let table = self.metrics_table(level)?;
        let mut rows: Vec<&MetricsRecord> = table
            .records
            .iter()
            .filter(|r| matches(&r.key))
            .filter(|r| since.is_none_or(|s| r.period.start() >= s))
            .collect();
        rows.sort_by_key(|r| r.period);

        let Some(first) = rows.first() else {
            return Err(not_found(format!(
                "no {} data for {}",
                query.metric,
                wanted.join(" / ")
            )));
        };
        let key = first.key.clone();

        let forecast = self.forecast_table(level)?.and_then(|fc| {
            let mut points: Vec<_> = fc
                .records
                .iter()
                .filter(|r| r.metric == query.metric && r.key == key)
                .map(|r| (r.period, r.forecast))
                .collect();
            if points.is_empty() {
                return None;
            }
            points.sort_by_key(|&(p, _)| p);
            Some(ForecastOverlay {
                periods: points.iter().map(|&(p, _)| self.label(p)).collect(),
                values: points.iter().map(|&(_, v)| round2(v)).collect(),
            })
        });

        Ok(TimeSeries {
            geo_level: level,
            metric: query.metric,
            periods: rows.iter().map(|r| self.label(r.period)).collect(),
            values: rows.iter().map(|r| round2(r.value(query.metric))).collect(),
            key: key.fields().to_vec(),
            forecast,
        })
    }

    /// Flagged observations, newest first and then by metric name.
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidArgument`] if `since` is malformed.
    /// * [`QueryError::NotFound`] if the anomaly artifact is missing.
    pub fn anomalies(
        &self,
        level: GeoLevel,
        metric: Option<Metric>,
        since: Option<&str>,
        state: Option<&str>,
    ) -> Result<Vec<AnomalyRow>, QueryError> {
        let since = parse_optional_since(since)?;
        let table = self.anomaly_table(level)?;

        let mut records: Vec<_> = table
            .records
            .iter()
            .filter(|a| metric.is_none_or(|m| a.metric == m))
            .filter(|a| since.is_none_or(|s| a.period.start() >= s))
            .filter(|a| in_state(&a.key, state))
            .collect();
        records.sort_by(|a, b| {
            b.period
                .cmp(&a.period)
                .then_with(|| a.metric.as_ref().cmp(b.metric.as_ref()))
                .then_with(|| a.key.cmp(&b.key))
        });

        Ok(records
            .into_iter()
            .map(|a| {
                let (state, district, pincode) = key_parts(&a.key);
                AnomalyRow {
                    period: self.label(a.period),
                    state,
                    district,
                    pincode,
                    metric: a.metric,
                    zscore: round2(a.zscore),
                    direction: a.direction,
                    severity: Severity::from_zscore(a.zscore),
                }
            })
            .collect())
    }
}
