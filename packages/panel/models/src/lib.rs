#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Panel, geography, and metric types shared across the pipeline.
//!
//! Every table carries its [`GeoLevel`] (and therefore the exact list of
//! geography key columns) alongside its rows, so downstream stages never
//! have to guess which columns identify a geography.

pub mod metric;
pub mod period;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use metric::{Direction, Metric, Severity};
pub use period::{Frequency, Period};

/// Geography granularity of a panel.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GeoLevel {
    /// Keyed by `state`.
    #[default]
    State,
    /// Keyed by `state`, `district`.
    District,
    /// Keyed by `state`, `district`, `pincode`.
    Pincode,
}

impl GeoLevel {
    /// Key column names, outermost first.
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::State => &["state"],
            Self::District => &["state", "district"],
            Self::Pincode => &["state", "district", "pincode"],
        }
    }

    /// Number of fields in a key at this level.
    #[must_use]
    pub const fn arity(self) -> usize {
        self.columns().len()
    }
}

/// Error returned when a key has the wrong number of fields for its level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyArityError {
    /// Level the key was built for.
    pub level: GeoLevel,
    /// Number of fields supplied.
    pub found: usize,
}

impl std::fmt::Display for KeyArityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} keys need {} field(s), found {}",
            self.level,
            self.level.arity(),
            self.found
        )
    }
}

impl std::error::Error for KeyArityError {}

/// Ordered geography key (state; state+district; state+district+pincode).
///
/// Values are stored exactly as read; case-insensitive matching is left to
/// readers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeographyKey(Vec<String>);

impl GeographyKey {
    /// Builds a key, checking that the field count matches `level`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyArityError`] if `fields` has the wrong length.
    pub fn new(level: GeoLevel, fields: Vec<String>) -> Result<Self, KeyArityError> {
        if fields.len() == level.arity() {
            Ok(Self(fields))
        } else {
            Err(KeyArityError {
                level,
                found: fields.len(),
            })
        }
    }

    /// Key fields, outermost first.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// The `state` field, present at every level.
    #[must_use]
    pub fn state(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// The `district` field, if this key has one.
    #[must_use]
    pub fn district(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// Human-readable label (`"Karnataka / Bengaluru"`).
    #[must_use]
    pub fn label(&self) -> String {
        self.0.join(" / ")
    }
}

/// One aggregated row of a single domain: summed counters for a (period,
/// geography) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub period: Period,
    pub key: GeographyKey,
    /// Summed counters, aligned with [`AggregatedTable::value_columns`].
    /// `None` when every source value in the group was missing.
    pub counts: Vec<Option<u64>>,
    /// Sum of the non-missing counters over the group.
    pub total: u64,
}

/// Aggregated counters for one domain (enrolment, demographic, or
/// biometric).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTable {
    /// Domain identifier (e.g. `"enrolment"`).
    pub domain: String,
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Counter column names, in storage order.
    pub value_columns: Vec<String>,
    /// Name of the total column (e.g. `"enrol_total"`).
    pub total_column: String,
    /// Rows sorted by `(period, key)`, unique per pair.
    pub records: Vec<AggregatedRecord>,
}

impl AggregatedTable {
    /// Position of a counter column, if the table has it.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One row of the merged metrics panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub period: Period,
    pub key: GeographyKey,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
    pub enrol_total: u64,
    pub demo_age_5_17: u64,
    pub demo_age_17_plus: u64,
    pub demo_total: u64,
    pub bio_age_5_17: u64,
    pub bio_age_17_plus: u64,
    pub bio_total: u64,
    pub demo_to_enrol: f64,
    pub bio_to_enrol: f64,
    pub youth_enrol_share: f64,
    pub adult_enrol_share: f64,
    pub youth_bio_share: f64,
    pub adult_bio_share: f64,
    pub demo_mom: f64,
    pub demo_positive_diff: f64,
    pub tx_load: u64,
    pub digital_inclusion_index: f64,
    pub migration_intensity_score: f64,
    pub service_stress_index: f64,
    pub data_quality_friction_index: f64,
    pub biometric_failure_risk_score: f64,
}

impl MetricsRecord {
    /// Value of `metric` for this row as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Age0To5 => self.age_0_5 as f64,
            Metric::Age5To17 => self.age_5_17 as f64,
            Metric::Age18Greater => self.age_18_greater as f64,
            Metric::DemoAge5To17 => self.demo_age_5_17 as f64,
            Metric::DemoAge17Plus => self.demo_age_17_plus as f64,
            Metric::BioAge5To17 => self.bio_age_5_17 as f64,
            Metric::BioAge17Plus => self.bio_age_17_plus as f64,
            Metric::EnrolTotal => self.enrol_total as f64,
            Metric::DemoTotal => self.demo_total as f64,
            Metric::BioTotal => self.bio_total as f64,
            Metric::TxLoad => self.tx_load as f64,
            Metric::DemoToEnrol => self.demo_to_enrol,
            Metric::BioToEnrol => self.bio_to_enrol,
            Metric::YouthEnrolShare => self.youth_enrol_share,
            Metric::AdultEnrolShare => self.adult_enrol_share,
            Metric::YouthBioShare => self.youth_bio_share,
            Metric::AdultBioShare => self.adult_bio_share,
            Metric::DemoMom => self.demo_mom,
            Metric::DemoPositiveDiff => self.demo_positive_diff,
            Metric::DigitalInclusionIndex => self.digital_inclusion_index,
            Metric::MigrationIntensityScore => self.migration_intensity_score,
            Metric::ServiceStressIndex => self.service_stress_index,
            Metric::DataQualityFrictionIndex => self.data_quality_friction_index,
            Metric::BiometricFailureRiskScore => self.biometric_failure_risk_score,
        }
    }

    /// Integer value of a count metric, `None` for derived metrics.
    #[must_use]
    pub const fn count(&self, metric: Metric) -> Option<u64> {
        Some(match metric {
            Metric::Age0To5 => self.age_0_5,
            Metric::Age5To17 => self.age_5_17,
            Metric::Age18Greater => self.age_18_greater,
            Metric::DemoAge5To17 => self.demo_age_5_17,
            Metric::DemoAge17Plus => self.demo_age_17_plus,
            Metric::BioAge5To17 => self.bio_age_5_17,
            Metric::BioAge17Plus => self.bio_age_17_plus,
            Metric::EnrolTotal => self.enrol_total,
            Metric::DemoTotal => self.demo_total,
            Metric::BioTotal => self.bio_total,
            Metric::TxLoad => self.tx_load,
            _ => return None,
        })
    }
}

/// The merged metrics panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsTable {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Rows sorted by `(period, key)`.
    pub records: Vec<MetricsRecord>,
}

impl MetricsTable {
    /// Latest period present in the panel.
    #[must_use]
    pub fn latest_period(&self) -> Option<Period> {
        self.records.iter().map(|r| r.period).max()
    }

    /// Row indices grouped by geography, each group ordered by period.
    #[must_use]
    pub fn groups(&self) -> BTreeMap<&GeographyKey, Vec<usize>> {
        let mut groups: BTreeMap<&GeographyKey, Vec<usize>> = BTreeMap::new();
        for (i, record) in self.records.iter().enumerate() {
            groups.entry(&record.key).or_default().push(i);
        }
        for rows in groups.values_mut() {
            rows.sort_by_key(|&i| self.records[i].period);
        }
        groups
    }
}

/// A flagged (period, geography, metric) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub period: Period,
    pub key: GeographyKey,
    pub metric: Metric,
    pub zscore: f64,
    pub direction: Direction,
}

/// Anomalies detected over one metrics panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyTable {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Rows sorted by `(period, metric, key)`.
    pub records: Vec<AnomalyRecord>,
}

/// One extrapolated value for a future period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub key: GeographyKey,
    pub metric: Metric,
    pub period: Period,
    pub forecast: f64,
}

/// Forecasts for one metrics panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Rows ordered by key, then metric, then period.
    pub records: Vec<ForecastRecord>,
}
