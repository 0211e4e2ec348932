#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite index engine.
//!
//! Merges the enrolment, demographic-update, and biometric-update panels on
//! `(period, geography)` and derives ratios, lifecycle shares, momentum
//! terms, and five composite indices. Each index is a weighted blend of
//! percentile ranks taken over the whole panel, scaled to `[0, 100]`.

pub mod stats;

use std::collections::BTreeMap;

use asie_panel_models::{
    AggregatedTable, Frequency, GeoLevel, GeographyKey, MetricsRecord, MetricsTable, Period,
};
use thiserror::Error;

use crate::stats::{pct_rank, rolling_cv, round2, safe_div, zscores};

/// Errors that can occur while building the metrics panel.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The input tables do not fit together.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of what went wrong.
        message: String,
    },
}

fn mismatch(message: impl Into<String>) -> MetricsError {
    MetricsError::SchemaMismatch {
        message: message.into(),
    }
}

/// Counter columns and total column each domain must provide.
const ENROL_COLUMNS: (&[&str], &str) = (&["age_0_5", "age_5_17", "age_18_greater"], "enrol_total");
const DEMO_COLUMNS: (&[&str], &str) = (&["demo_age_5_17", "demo_age_17_plus"], "demo_total");
const BIO_COLUMNS: (&[&str], &str) = (&["bio_age_5_17", "bio_age_17_plus"], "bio_total");

/// Column positions within one domain table, in the order of the domain's
/// expected counters.
fn resolve_columns(
    table: &AggregatedTable,
    (counters, total): (&[&str], &str),
) -> Result<Vec<usize>, MetricsError> {
    if table.total_column != total {
        return Err(mismatch(format!(
            "{} table has total column '{}', expected '{total}'",
            table.domain, table.total_column
        )));
    }
    counters
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                mismatch(format!("{} table has no '{name}' column", table.domain))
            })
        })
        .collect()
}

/// Merged counters for one `(period, geography)` before derivation.
#[derive(Debug, Default, Clone, Copy)]
struct Joined {
    enrol: [u64; 3],
    enrol_total: u64,
    demo: [u64; 2],
    demo_total: u64,
    bio: [u64; 2],
    bio_total: u64,
}

/// Outer-joins one domain into `joined`, writing its counters through
/// `apply`. Absent counters become 0.
fn join_domain<F>(
    joined: &mut BTreeMap<(Period, GeographyKey), Joined>,
    table: &AggregatedTable,
    columns: &[usize],
    apply: F,
) where
    F: Fn(&mut Joined, &[u64], u64),
{
    let mut counts = Vec::with_capacity(columns.len());
    for record in &table.records {
        counts.clear();
        counts.extend(
            columns
                .iter()
                .map(|&i| record.counts.get(i).copied().flatten().unwrap_or(0)),
        );
        let entry = joined
            .entry((record.period, record.key.clone()))
            .or_default();
        apply(entry, &counts, record.total);
    }
}

/// Builds the metrics panel from the three domain tables.
///
/// # Errors
///
/// Returns [`MetricsError::SchemaMismatch`] if the tables disagree on geo
/// level or frequency, or a table lacks its domain's columns.
pub fn compute_indices(
    enrol: &AggregatedTable,
    demo: &AggregatedTable,
    bio: &AggregatedTable,
) -> Result<MetricsTable, MetricsError> {
    let geo_level = enrol.geo_level;
    let frequency = enrol.frequency;
    for table in [demo, bio] {
        check_shape(table, geo_level, frequency)?;
    }

    let enrol_cols = resolve_columns(enrol, ENROL_COLUMNS)?;
    let demo_cols = resolve_columns(demo, DEMO_COLUMNS)?;
    let bio_cols = resolve_columns(bio, BIO_COLUMNS)?;

    let mut joined = BTreeMap::new();
    join_domain(&mut joined, enrol, &enrol_cols, |j, c, total| {
        j.enrol.copy_from_slice(c);
        j.enrol_total = total;
    });
    join_domain(&mut joined, demo, &demo_cols, |j, c, total| {
        j.demo.copy_from_slice(c);
        j.demo_total = total;
    });
    join_domain(&mut joined, bio, &bio_cols, |j, c, total| {
        j.bio.copy_from_slice(c);
        j.bio_total = total;
    });

    // BTreeMap order is (period, key), the panel's row order.
    let records = joined
        .into_iter()
        .map(|((period, key), j)| base_record(period, key, &j))
        .collect();

    let mut table = MetricsTable {
        geo_level,
        frequency,
        records,
    };
    derive_indices(&mut table);

    log::info!(
        "[metrics] {} row(s) over {} geograph(ies) at {geo_level}/{frequency}",
        table.records.len(),
        table.groups().len()
    );

    Ok(table)
}

fn check_shape(
    table: &AggregatedTable,
    geo_level: GeoLevel,
    frequency: Frequency,
) -> Result<(), MetricsError> {
    if table.geo_level != geo_level {
        return Err(mismatch(format!(
            "{} table is at {} level, expected {geo_level}",
            table.domain, table.geo_level
        )));
    }
    if table.frequency != frequency {
        return Err(mismatch(format!(
            "{} table has frequency {}, expected {frequency}",
            table.domain, table.frequency
        )));
    }
    Ok(())
}

/// Row with counters, ratios, shares, and load filled in. Momentum terms
/// and indices are filled by [`derive_indices`].
#[allow(clippy::cast_precision_loss)]
fn base_record(period: Period, key: GeographyKey, j: &Joined) -> MetricsRecord {
    let enrol_total = j.enrol_total as f64;
    let demo_total = j.demo_total as f64;
    let bio_total = j.bio_total as f64;

    MetricsRecord {
        period,
        key,
        age_0_5: j.enrol[0],
        age_5_17: j.enrol[1],
        age_18_greater: j.enrol[2],
        enrol_total: j.enrol_total,
        demo_age_5_17: j.demo[0],
        demo_age_17_plus: j.demo[1],
        demo_total: j.demo_total,
        bio_age_5_17: j.bio[0],
        bio_age_17_plus: j.bio[1],
        bio_total: j.bio_total,
        demo_to_enrol: safe_div(demo_total, enrol_total),
        bio_to_enrol: safe_div(bio_total, enrol_total),
        youth_enrol_share: safe_div((j.enrol[0] + j.enrol[1]) as f64, enrol_total),
        adult_enrol_share: safe_div(j.enrol[2] as f64, enrol_total),
        youth_bio_share: safe_div(j.bio[0] as f64, bio_total),
        adult_bio_share: safe_div(j.bio[1] as f64, bio_total),
        demo_mom: 0.0,
        demo_positive_diff: 0.0,
        tx_load: j.enrol_total + j.demo_total + j.bio_total,
        digital_inclusion_index: 0.0,
        migration_intensity_score: 0.0,
        service_stress_index: 0.0,
        data_quality_friction_index: 0.0,
        biometric_failure_risk_score: 0.0,
    }
}

/// Weighted sum of percentile ranks, scaled to `[0, 100]` and rounded.
fn blend(parts: &[(f64, &[f64])], i: usize) -> f64 {
    let raw: f64 = parts.iter().map(|(w, ranks)| w * ranks[i]).sum();
    round2(raw * 100.0).clamp(0.0, 100.0)
}

#[allow(clippy::cast_precision_loss)]
fn derive_indices(table: &mut MetricsTable) {
    let n = table.records.len();
    let groups: Vec<Vec<usize>> = table.groups().into_values().collect();

    let mut tx_load_z = vec![0.0; n];
    let mut demo_cv = vec![0.0; n];

    for rows in &groups {
        let mut prev: Option<f64> = None;
        for &i in rows {
            let record = &mut table.records[i];
            let current = record.demo_total as f64;
            if let Some(prev) = prev {
                // a zero predecessor gives 0 here, not an infinite change
                record.demo_mom = safe_div(current - prev, prev);
                record.demo_positive_diff = (current - prev).max(0.0);
            }
            prev = Some(current);
        }

        let load: Vec<f64> = rows
            .iter()
            .map(|&i| table.records[i].tx_load as f64)
            .collect();
        for (&i, z) in rows.iter().zip(zscores(&load)) {
            tx_load_z[i] = z;
        }

        let demo: Vec<f64> = rows
            .iter()
            .map(|&i| table.records[i].demo_total as f64)
            .collect();
        for (&i, cv) in rows.iter().zip(rolling_cv(&demo)) {
            demo_cv[i] = cv;
        }
    }

    let column = |f: &dyn Fn(&MetricsRecord) -> f64| -> Vec<f64> {
        pct_rank(&table.records.iter().map(f).collect::<Vec<_>>())
    };

    let enrol_total = column(&|r| r.enrol_total as f64);
    let demo_total = column(&|r| r.demo_total as f64);
    let demo_to_enrol = column(&|r| r.demo_to_enrol);
    let demo_positive_diff = column(&|r| r.demo_positive_diff);
    let tx_load = column(&|r| r.tx_load as f64);
    let rework_ratio = column(&|r| safe_div((r.demo_total + r.bio_total) as f64, r.enrol_total as f64));
    let youth_bio_share = column(&|r| r.youth_bio_share);
    let bio_to_enrol = column(&|r| r.bio_to_enrol);
    let load_spike = pct_rank(&tx_load_z);
    let variability = pct_rank(&demo_cv);

    for (i, record) in table.records.iter_mut().enumerate() {
        record.digital_inclusion_index = blend(
            &[(0.4, &enrol_total), (0.4, &demo_total), (0.2, &demo_to_enrol)],
            i,
        );
        record.migration_intensity_score =
            blend(&[(0.6, &demo_to_enrol), (0.4, &demo_positive_diff)], i);
        record.service_stress_index = blend(&[(0.7, &tx_load), (0.3, &load_spike)], i);
        record.data_quality_friction_index =
            blend(&[(0.6, &rework_ratio), (0.4, &variability)], i);
        record.biometric_failure_risk_score =
            blend(&[(0.6, &youth_bio_share), (0.4, &bio_to_enrol)], i);
    }
}
