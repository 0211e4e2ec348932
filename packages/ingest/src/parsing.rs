//! Field parsing for raw count files.

use chrono::NaiveDate;

/// Width that pincodes are zero-padded to.
pub const PINCODE_WIDTH: usize = 6;

/// Parses a source date with the configured format. Returns `None` for
/// anything that does not match.
#[must_use]
pub fn parse_source_date(s: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), format).ok()
}

/// Left-pads a pincode with zeros to [`PINCODE_WIDTH`] characters. Longer
/// values are returned unchanged.
#[must_use]
pub fn pad_pincode(s: &str) -> String {
    format!("{s:0>PINCODE_WIDTH$}")
}

/// Parses a count cell. Empty or non-numeric cells are missing (`None`).
///
/// Integral floats (`"12.0"`) are accepted since spreadsheet exports often
/// write counts that way.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_count(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<u64>() {
        return Some(v);
    }
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as u64)
}
