//! Metric column names, anomaly directions, and severity bands.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Every numeric column of the metrics panel.
///
/// Parsing a name that is not listed here fails, which is how unknown metric
/// names are rejected at the edges of the system.
#[derive(
    Debug,
    Clone,
    Copy,
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
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    /// Enrolments aged 0-5.
    #[serde(rename = "age_0_5")]
    #[strum(serialize = "age_0_5")]
    Age0To5,
    /// Enrolments aged 5-17.
    #[serde(rename = "age_5_17")]
    #[strum(serialize = "age_5_17")]
    Age5To17,
    /// Enrolments aged 18 and over.
    #[serde(rename = "age_18_greater")]
    #[strum(serialize = "age_18_greater")]
    Age18Greater,
    /// Demographic updates aged 5-17.
    #[serde(rename = "demo_age_5_17")]
    #[strum(serialize = "demo_age_5_17")]
    DemoAge5To17,
    /// Demographic updates aged 17 and over.
    #[serde(rename = "demo_age_17_plus")]
    #[strum(serialize = "demo_age_17_plus")]
    DemoAge17Plus,
    /// Biometric updates aged 5-17.
    #[serde(rename = "bio_age_5_17")]
    #[strum(serialize = "bio_age_5_17")]
    BioAge5To17,
    /// Biometric updates aged 17 and over.
    #[serde(rename = "bio_age_17_plus")]
    #[strum(serialize = "bio_age_17_plus")]
    BioAge17Plus,
    EnrolTotal,
    DemoTotal,
    BioTotal,
    DemoToEnrol,
    BioToEnrol,
    YouthEnrolShare,
    AdultEnrolShare,
    YouthBioShare,
    AdultBioShare,
    /// Period-over-period fractional change of `demo_total`.
    DemoMom,
    /// Period-over-period increase of `demo_total`, floored at zero.
    DemoPositiveDiff,
    /// `enrol_total + demo_total + bio_total`.
    TxLoad,
    DigitalInclusionIndex,
    MigrationIntensityScore,
    ServiceStressIndex,
    DataQualityFrictionIndex,
    BiometricFailureRiskScore,
}

impl Metric {
    /// The five composite indices, in report order.
    pub const INDICES: [Self; 5] = [
        Self::DigitalInclusionIndex,
        Self::MigrationIntensityScore,
        Self::ServiceStressIndex,
        Self::DataQualityFrictionIndex,
        Self::BiometricFailureRiskScore,
    ];

    /// Metrics scanned for anomalies when none are requested explicitly.
    pub const DEFAULT_ANOMALY: [Self; 4] =
        [Self::EnrolTotal, Self::DemoTotal, Self::BioTotal, Self::TxLoad];

    /// Metrics forecast when none are requested explicitly.
    pub const DEFAULT_FORECAST: [Self; 9] = [
        Self::EnrolTotal,
        Self::DemoTotal,
        Self::BioTotal,
        Self::TxLoad,
        Self::DigitalInclusionIndex,
        Self::MigrationIntensityScore,
        Self::ServiceStressIndex,
        Self::DataQualityFrictionIndex,
        Self::BiometricFailureRiskScore,
    ];

    /// Whether the column holds integer counts (stored as `int64`) rather
    /// than derived floating-point values.
    #[must_use]
    pub const fn is_count(self) -> bool {
        matches!(
            self,
            Self::Age0To5
                | Self::Age5To17
                | Self::Age18Greater
                | Self::DemoAge5To17
                | Self::DemoAge17Plus
                | Self::BioAge5To17
                | Self::BioAge17Plus
                | Self::EnrolTotal
                | Self::DemoTotal
                | Self::BioTotal
                | Self::TxLoad
        )
    }

    /// Whether the column is one of the five composite indices.
    #[must_use]
    pub fn is_index(self) -> bool {
        Self::INDICES.contains(&self)
    }
}

/// Which side of the group mean an anomalous value falls on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Above the group mean.
    Spike,
    /// At or below the group mean.
    Drop,
}

impl Direction {
    /// `Spike` for strictly positive z-scores, `Drop` otherwise.
    #[must_use]
    pub fn from_zscore(zscore: f64) -> Self {
        if zscore > 0.0 { Self::Spike } else { Self::Drop }
    }
}

/// Reporting band derived from the magnitude of an anomaly's z-score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lower bound of `|z|` for [`Severity::High`].
    pub const HIGH_THRESHOLD: f64 = 3.0;
    /// Lower bound of `|z|` for [`Severity::Medium`].
    pub const MEDIUM_THRESHOLD: f64 = 2.5;

    /// Bands a z-score: `|z| >= 3` is high, `|z| >= 2.5` is medium, anything
    /// smaller is low.
    #[must_use]
    pub fn from_zscore(zscore: f64) -> Self {
        let magnitude = zscore.abs();
        if magnitude >= Self::HIGH_THRESHOLD {
            Self::High
        } else if magnitude >= Self::MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}
