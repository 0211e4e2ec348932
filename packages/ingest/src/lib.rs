#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation of raw per-geography transaction counts into period panels.
//!
//! Each domain (enrolment, demographic update, biometric update) is a
//! directory of delimited files with a date column, geography columns, and
//! count columns. Every file is summed per `(period, geography)` on its own,
//! then the per-file partial sums are merged so that a geography split
//! across files is counted once per row, never overwritten.
//!
//! Rows whose date does not parse are dropped without failing the run. The
//! number dropped is reported per file in [`FileStats`].

pub mod domain;
pub mod parsing;
pub mod progress;
pub mod registry;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asie_panel_models::{
    AggregatedRecord, AggregatedTable, Frequency, GeoLevel, GeographyKey, Period,
};

use crate::domain::DomainDefinition;
use crate::parsing::{pad_pincode, parse_count, parse_source_date};
use crate::progress::ProgressCallback;

/// Errors that can occur while aggregating raw files.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// No raw files matched in the domain directory.
    #[error("No .{extension} files found in {}", dir.display())]
    NotFound {
        /// Directory that was searched.
        dir: PathBuf,
        /// Extension that was searched for.
        extension: String,
    },

    /// A required column is absent from a file header.
    #[error("{}: missing required column '{column}'", path.display())]
    SchemaMismatch {
        /// File with the incomplete header.
        path: PathBuf,
        /// The missing column (after renames).
        column: String,
    },

    /// Caller supplied an unsupported parameter.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error (directory listing, file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Per-file accounting of what happened to each raw row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    pub path: PathBuf,
    /// Data rows read (header excluded).
    pub rows_read: u64,
    /// Rows that contributed to a group.
    pub rows_aggregated: u64,
    /// Rows dropped because their date did not parse.
    pub dropped_dates: u64,
    /// Rows dropped because a geography field was empty.
    pub dropped_keys: u64,
}

/// Output of aggregating one domain.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub table: AggregatedTable,
    /// One entry per file, in read order.
    pub files: Vec<FileStats>,
}

impl Aggregation {
    /// Rows dropped across all files for an unparseable date.
    #[must_use]
    pub fn dropped_dates(&self) -> u64 {
        self.files.iter().map(|f| f.dropped_dates).sum()
    }

    /// Rows dropped across all files for an empty geography field.
    #[must_use]
    pub fn dropped_keys(&self) -> u64 {
        self.files.iter().map(|f| f.dropped_keys).sum()
    }
}

/// Running sums for one `(period, geography)` group.
#[derive(Debug, Clone)]
struct GroupSum {
    counts: Vec<Option<u64>>,
    total: u64,
}

impl GroupSum {
    fn new(width: usize) -> Self {
        Self {
            counts: vec![None; width],
            total: 0,
        }
    }

    /// Adds counters, keeping a counter missing only while every
    /// contribution to it is missing.
    fn add(&mut self, counts: &[Option<u64>], total: u64) {
        for (acc, v) in self.counts.iter_mut().zip(counts) {
            if let Some(v) = v {
                *acc = Some(acc.unwrap_or(0).saturating_add(*v));
            }
        }
        self.total = self.total.saturating_add(total);
    }
}

type Groups = BTreeMap<(Period, GeographyKey), GroupSum>;

/// Aggregates a domain from its directory under `raw_root`.
///
/// # Errors
///
/// See [`aggregate_dir`].
pub fn aggregate_domain(
    raw_root: &Path,
    domain: &DomainDefinition,
    frequency: Frequency,
    geo_level: GeoLevel,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Aggregation, IngestError> {
    aggregate_dir(
        &domain.source_dir(raw_root),
        domain,
        frequency,
        geo_level,
        progress,
    )
}

/// Aggregates every raw file of `domain` found directly in `dir`.
///
/// Files are read in lexical order so that output is deterministic.
///
/// # Errors
///
/// * [`IngestError::InvalidArgument`] if the domain's delimiter is not ASCII.
/// * [`IngestError::NotFound`] if `dir` is missing or holds no files with
///   the domain's extension.
/// * [`IngestError::SchemaMismatch`] if a file lacks the date column, a
///   geography column for `geo_level`, or a value column.
/// * [`IngestError::Io`] / [`IngestError::Csv`] on read failures.
pub fn aggregate_dir(
    dir: &Path,
    domain: &DomainDefinition,
    frequency: Frequency,
    geo_level: GeoLevel,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Aggregation, IngestError> {
    let delimiter = domain.delimiter_byte()?;
    let files = list_source_files(dir, &domain.input.extension)?;
    if files.is_empty() {
        return Err(IngestError::NotFound {
            dir: dir.to_path_buf(),
            extension: domain.input.extension.clone(),
        });
    }

    log::info!(
        "[{}] Aggregating {} file(s) from {} by {geo_level}/{frequency}",
        domain.id,
        files.len(),
        dir.display()
    );
    progress.set_total(files.len() as u64);

    let width = domain.value_columns.len();
    let mut merged = Groups::new();
    let mut stats = Vec::with_capacity(files.len());

    for path in &files {
        progress.set_message(format!("[{}] {}", domain.id, path.display()));
        let (partial, file_stats) = aggregate_file(path, domain, delimiter, frequency, geo_level)?;

        if file_stats.dropped_dates > 0 || file_stats.dropped_keys > 0 {
            log::debug!(
                "[{}] {}: dropped {} row(s) with unparseable dates, {} with empty geography",
                domain.id,
                path.display(),
                file_stats.dropped_dates,
                file_stats.dropped_keys
            );
        }

        for (group, sum) in partial {
            merged
                .entry(group)
                .or_insert_with(|| GroupSum::new(width))
                .add(&sum.counts, sum.total);
        }
        stats.push(file_stats);
        progress.inc(1);
    }

    let records: Vec<AggregatedRecord> = merged
        .into_iter()
        .map(|((period, key), sum)| AggregatedRecord {
            period,
            key,
            counts: sum.counts,
            total: sum.total,
        })
        .collect();

    let aggregation = Aggregation {
        table: AggregatedTable {
            domain: domain.id.clone(),
            geo_level,
            frequency,
            value_columns: domain.value_columns.clone(),
            total_column: domain.total_column.clone(),
            records,
        },
        files: stats,
    };

    log::info!(
        "[{}] {} group(s) from {} file(s); {} row(s) dropped for unparseable dates",
        domain.id,
        aggregation.table.len(),
        aggregation.files.len(),
        aggregation.dropped_dates()
    );
    progress.finish(format!(
        "[{}] aggregated -- {} groups",
        domain.id,
        aggregation.table.len()
    ));

    Ok(aggregation)
}

/// Files in `dir` whose extension matches, sorted by path.
fn list_source_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, IngestError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Column positions resolved from one file's header.
struct ColumnLayout {
    date: usize,
    geo: Vec<usize>,
    pincode: Option<usize>,
    values: Vec<usize>,
}

impl ColumnLayout {
    fn resolve(
        headers: &csv::StringRecord,
        path: &Path,
        domain: &DomainDefinition,
        geo_level: GeoLevel,
    ) -> Result<Self, IngestError> {
        let names: Vec<&str> = headers
            .iter()
            .map(|h| domain.canonical_header(h.trim()))
            .collect();
        let find = |column: &str| {
            names
                .iter()
                .position(|n| *n == column)
                .ok_or_else(|| IngestError::SchemaMismatch {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };

        let date = find(&domain.input.date_column)?;
        let geo = geo_level
            .columns()
            .iter()
            .map(|c| find(c))
            .collect::<Result<Vec<_>, _>>()?;
        let pincode = geo_level
            .columns()
            .iter()
            .position(|c| *c == "pincode");
        let values = domain
            .value_columns
            .iter()
            .map(|c| find(c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            date,
            geo,
            pincode,
            values,
        })
    }
}

/// Sums one file by `(period, geography)`.
fn aggregate_file(
    path: &Path,
    domain: &DomainDefinition,
    delimiter: u8,
    frequency: Frequency,
    geo_level: GeoLevel,
) -> Result<(Groups, FileStats), IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let layout = ColumnLayout::resolve(reader.headers()?, path, domain, geo_level)?;

    let mut groups = Groups::new();
    let mut stats = FileStats {
        path: path.to_path_buf(),
        ..FileStats::default()
    };
    let mut counts = vec![None; layout.values.len()];

    for row in reader.records() {
        let row = row?;
        stats.rows_read += 1;

        let Some(date) = row
            .get(layout.date)
            .and_then(|s| parse_source_date(s, &domain.input.date_format))
        else {
            stats.dropped_dates += 1;
            continue;
        };

        let mut fields = Vec::with_capacity(layout.geo.len());
        for (i, &col) in layout.geo.iter().enumerate() {
            match row.get(col) {
                Some(v) if !v.trim().is_empty() => {
                    if layout.pincode == Some(i) {
                        fields.push(pad_pincode(v.trim()));
                    } else {
                        fields.push(v.to_string());
                    }
                }
                _ => break,
            }
        }
        let Ok(key) = GeographyKey::new(geo_level, fields) else {
            stats.dropped_keys += 1;
            continue;
        };

        for (slot, &col) in counts.iter_mut().zip(&layout.values) {
            *slot = row.get(col).and_then(parse_count);
        }
        let row_total = counts.iter().flatten().fold(0u64, |acc, v| acc.saturating_add(*v));

        groups
            .entry((Period::containing(date, frequency), key))
            .or_insert_with(|| GroupSum::new(layout.values.len()))
            .add(&counts, row_total);
        stats.rows_aggregated += 1;
    }

    Ok((groups, stats))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::progress::null_progress;
    use crate::registry::{ENROLMENT, find_domain};

    use super::*;

    fn enrolment() -> DomainDefinition {
        find_domain(ENROLMENT).unwrap()
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = aggregate_dir(
            &tmp.path().join("nope"),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn non_ascii_delimiter_is_rejected_before_reading() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.csv", "date\u{e9}state\n");
        let mut domain = enrolment();
        domain.input.delimiter = '\u{e9}';
        let err = aggregate_dir(
            tmp.path(),
            &domain,
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::InvalidArgument { .. }));
    }

    #[test]
    fn ignores_other_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "notes.txt", "not a csv");
        let err = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn missing_value_column_is_schema_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.csv",
            "date,state,age_0_5,age_5_17\n01-01-2025,A,1,2\n",
        );
        let err = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap_err();
        match err {
            IngestError::SchemaMismatch { column, .. } => assert_eq!(column, "age_18_greater"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sums_rows_within_a_month() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.csv",
            "date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n\
             01-03-2025,A,X,1,1,2,3\n\
             15-03-2025,A,Y,2,4,5,6\n\
             02-04-2025,A,X,1,1,1,1\n",
        );
        let agg = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap();

        let rows = &agg.table.records;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period.start().to_string(), "2025-03-01");
        assert_eq!(rows[0].counts, vec![Some(5), Some(7), Some(9)]);
        assert_eq!(rows[0].total, 21);
        assert_eq!(rows[1].period.start().to_string(), "2025-04-01");
        assert_eq!(rows[1].total, 3);
    }

    #[test]
    fn merges_the_same_group_across_files() {
        let tmp = tempfile::tempdir().unwrap();
        let header = "date,state,age_0_5,age_5_17,age_18_greater\n";
        write(tmp.path(), "part1.csv", &format!("{header}10-05-2025,X,10,0,0\n"));
        write(tmp.path(), "part2.csv", &format!("{header}20-05-2025,X,10,0,0\n"));

        let agg = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap();

        assert_eq!(agg.files.len(), 2);
        assert_eq!(agg.table.records.len(), 1);
        assert_eq!(agg.table.records[0].counts[0], Some(20));
        assert_eq!(agg.table.records[0].total, 20);
    }

    #[test]
    fn drops_unparseable_dates_and_counts_them() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.csv",
            "date,state,age_0_5,age_5_17,age_18_greater\n\
             2025-01-01,A,100,0,0\n\
             not a date,A,100,0,0\n\
             03-01-2025,A,1,0,0\n",
        );
        let agg = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap();

        assert_eq!(agg.dropped_dates(), 2);
        assert_eq!(agg.files[0].rows_read, 3);
        assert_eq!(agg.files[0].rows_aggregated, 1);
        assert_eq!(agg.table.records[0].total, 1);
    }

    #[test]
    fn missing_counts_stay_missing_until_a_value_arrives() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.csv",
            "date,state,age_0_5,age_5_17,age_18_greater\n\
             01-01-2025,A,,,4\n\
             02-01-2025,A,,3,\n\
             01-01-2025,B,,,\n",
        );
        let agg = aggregate_dir(
            tmp.path(),
            &enrolment(),
            Frequency::Monthly,
            GeoLevel::State,
            &null_progress(),
        )
        .unwrap();

        let a = &agg.table.records[0];
        assert_eq!(a.counts, vec![None, Some(3), Some(4)]);
        assert_eq!(a.total, 7);
        let b = &agg.table.records[1];
        assert_eq!(b.counts, vec![None, None, None]);
        assert_eq!(b.total, 0);
    }

    #[test]
    fn pads_pincodes_and_applies_renames() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "a.csv",
            "date,state,district,pincode,bio_age_5_17,bio_age_17_\n\
             01-01-2025,A,X,1100,1,2\n\
             05-01-2025,A,X,001100,3,4\n\
             05-01-2025,A,,001100,3,4\n",
        );
        let bio = find_domain(crate::registry::BIOMETRIC).unwrap();
        let agg = aggregate_dir(
            tmp.path(),
            &bio,
            Frequency::Monthly,
            GeoLevel::Pincode,
            &null_progress(),
        )
        .unwrap();

        assert_eq!(agg.table.records.len(), 1);
        let row = &agg.table.records[0];
        assert_eq!(row.key.fields(), ["A", "X", "001100"]);
        assert_eq!(row.counts, vec![Some(4), Some(6)]);
        assert_eq!(agg.dropped_keys(), 1);
    }
}
