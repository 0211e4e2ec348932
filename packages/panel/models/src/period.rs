//! Calendar bucketing.
//!
//! A [`Period`] is identified by the first day of the bucket it covers. The
//! bucket width is a [`Frequency`]; weeks run Monday through Sunday.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Bucket width used to collapse source dates into periods.
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
#[strum(ascii_case_insensitive)]
pub enum Frequency {
    /// One period per calendar day.
    #[serde(rename = "D")]
    #[strum(serialize = "D")]
    Daily,
    /// Monday-anchored weeks.
    #[serde(rename = "W")]
    #[strum(serialize = "W")]
    Weekly,
    /// Calendar months.
    #[default]
    #[serde(rename = "M")]
    #[strum(serialize = "M")]
    Monthly,
    /// Calendar quarters starting in January, April, July, and October.
    #[serde(rename = "Q")]
    #[strum(serialize = "Q")]
    Quarterly,
    /// Calendar years.
    #[serde(rename = "Y")]
    #[strum(serialize = "Y")]
    Yearly,
}

impl Frequency {
    /// Returns the first day of the bucket containing `date`.
    #[must_use]
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            Self::Monthly => date.with_day(1).unwrap_or(date),
            Self::Quarterly => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
            Self::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Moves an aligned period start forward by `steps` buckets.
    ///
    /// Returns `None` if the result falls outside chrono's date range.
    #[must_use]
    pub fn advance(self, start: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            Self::Daily => start.checked_add_days(Days::new(u64::from(steps))),
            Self::Weekly => start.checked_add_days(Days::new(7 * u64::from(steps))),
            Self::Monthly => start.checked_add_months(Months::new(steps)),
            Self::Quarterly => start.checked_add_months(Months::new(steps.checked_mul(3)?)),
            Self::Yearly => start.checked_add_months(Months::new(steps.checked_mul(12)?)),
        }
    }
}

/// A calendar bucket, identified by its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(NaiveDate);

impl Period {
    /// Returns the period of the given frequency that contains `date`.
    #[must_use]
    pub fn containing(date: NaiveDate, frequency: Frequency) -> Self {
        Self(frequency.truncate(date))
    }

    /// Wraps a date that is already a period start.
    ///
    /// No alignment check is performed; see [`Self::is_aligned`].
    #[must_use]
    pub const fn from_start(start: NaiveDate) -> Self {
        Self(start)
    }

    /// First day of the period.
    #[must_use]
    pub const fn start(self) -> NaiveDate {
        self.0
    }

    /// Whether this period starts on a bucket boundary for `frequency`.
    #[must_use]
    pub fn is_aligned(self, frequency: Frequency) -> bool {
        frequency.truncate(self.0) == self.0
    }

    /// The period `steps` buckets after this one.
    #[must_use]
    pub fn advance(self, frequency: Frequency, steps: u32) -> Option<Self> {
        frequency.advance(self.0, steps).map(Self)
    }

    /// Microseconds since the Unix epoch at midnight UTC of the first day.
    #[must_use]
    pub fn timestamp_micros(self) -> i64 {
        self.0.and_time(NaiveTime::MIN).and_utc().timestamp_micros()
    }

    /// Inverse of [`Self::timestamp_micros`]. Any time-of-day component is
    /// discarded.
    #[must_use]
    pub fn from_timestamp_micros(micros: i64) -> Option<Self> {
        DateTime::from_timestamp_micros(micros).map(|dt| Self(dt.date_naive()))
    }

    /// `YYYY-MM` label used by reports and query output.
    #[must_use]
    pub fn month_label(self) -> String {
        self.0.format("%Y-%m").to_string()
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn truncates_to_month_start() {
        let p = Period::containing(date(2025, 3, 17), Frequency::Monthly);
        assert_eq!(p.start(), date(2025, 3, 1));
        assert!(p.is_aligned(Frequency::Monthly));
    }

    #[test]
    fn truncates_to_monday() {
        // 2025-03-16 is a Sunday, so it belongs to the week of Monday 03-10.
        let p = Period::containing(date(2025, 3, 16), Frequency::Weekly);
        assert_eq!(p.start(), date(2025, 3, 10));
    }

    #[test]
    fn truncates_to_quarter_and_year() {
        assert_eq!(
            Frequency::Quarterly.truncate(date(2025, 8, 30)),
            date(2025, 7, 1)
        );
        assert_eq!(Frequency::Yearly.truncate(date(2025, 8, 30)), date(2025, 1, 1));
    }

    #[test]
    fn advances_across_year_boundary() {
        let p = Period::from_start(date(2024, 11, 1));
        assert_eq!(
            p.advance(Frequency::Monthly, 3).unwrap().start(),
            date(2025, 2, 1)
        );
        assert_eq!(
            p.advance(Frequency::Quarterly, 1).unwrap().start(),
            date(2025, 2, 1)
        );
    }

    #[test]
    fn timestamp_round_trip_drops_time() {
        let p = Period::from_start(date(2025, 1, 1));
        let micros = p.timestamp_micros();
        assert_eq!(micros, 1_735_689_600_000_000);
        assert_eq!(Period::from_timestamp_micros(micros + 3_600_000_000), Some(p));
    }

    #[test]
    fn parses_frequency_codes() {
        assert_eq!("m".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert_eq!(Frequency::Quarterly.to_string(), "Q");
        assert!("fortnight".parse::<Frequency>().is_err());
    }
}
