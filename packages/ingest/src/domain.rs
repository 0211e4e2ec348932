//! Config-driven transaction domain definition.
//!
//! [`DomainDefinition`] captures everything that differs between the
//! enrolment, demographic-update, and biometric-update feeds: where the raw
//! files live, which columns hold counts, and how headers need renaming. A
//! single generic aggregator handles all three.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::IngestError;

/// Default date format of raw files (`31-01-2025`).
pub const DEFAULT_DATE_FORMAT: &str = "%d-%m-%Y";

/// A transaction domain, loaded from an embedded TOML config.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainDefinition {
    /// Unique identifier, also used as the artifact file prefix
    /// (e.g. `"enrolment"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Directory of raw files, relative to the raw data root.
    pub subdir: String,
    /// Output column holding the per-row sum of the value columns.
    pub total_column: String,
    /// Count columns to sum, named after any rename is applied.
    pub value_columns: Vec<String>,
    /// Header renames applied before columns are looked up.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    /// How raw files are laid out.
    #[serde(default)]
    pub input: InputFormat,
}

/// Layout of the raw delimited files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputFormat {
    /// File extension to pick up (without the dot).
    pub extension: String,
    /// Field delimiter.
    pub delimiter: char,
    /// Column holding the transaction date.
    pub date_column: String,
    /// `chrono` format string for the date column.
    pub date_format: String,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            delimiter: ',',
            date_column: "date".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl DomainDefinition {
    /// Directory holding this domain's raw files under `raw_root`.
    #[must_use]
    pub fn source_dir(&self, raw_root: &Path) -> PathBuf {
        raw_root.join(&self.subdir)
    }

    /// Canonical header name for a raw header.
    #[must_use]
    pub fn canonical_header<'a>(&'a self, raw: &'a str) -> &'a str {
        self.rename.get(raw).map_or(raw, String::as_str)
    }

    /// Delimiter as a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidArgument`] if the delimiter is not ASCII.
    pub fn delimiter_byte(&self) -> Result<u8, IngestError> {
        let delimiter = self.input.delimiter;
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| IngestError::InvalidArgument {
                message: format!(
                    "domain '{}': delimiter {delimiter:?} is not a single ASCII character",
                    self.id
                ),
            })
    }
}

/// Parses a domain definition from TOML.
///
/// # Errors
///
/// Returns a TOML error if the config is malformed.
pub fn parse_domain_toml(toml_str: &str) -> Result<DomainDefinition, toml::de::Error> {
    toml::from_str(toml_str)
}
