//! Arrow schemas and record batch conversion for every artifact.
//!
//! Common layout:
//! - `period`: `Timestamp(Microsecond)`, midnight UTC of the period start
//! - geography key columns (`state`, `district`, `pincode`): `Utf8`
//! - counters: `Int64` (nullable only in aggregated domain tables)
//! - derived values: `Float64`
//! - `metric`, `direction`: `Utf8`
//!
//! The geo level and frequency travel in the Arrow schema metadata (one
//! JSON entry under `asie`) so a reader never infers key columns from column
//! names. A single entry keeps the encoded file byte-stable across runs.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use arrow_array::{
    Array as _, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use asie_panel_models::{
    AggregatedRecord, AggregatedTable, AnomalyRecord, AnomalyTable, Direction, ForecastRecord,
    ForecastTable, Frequency, GeoLevel, GeographyKey, Metric, MetricsRecord, MetricsTable, Period,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;

use crate::StoreError;

const META_KEY: &str = "asie";

/// Table shape stored in the schema metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub geo_level: GeoLevel,
    pub frequency: Frequency,
    /// Domain identifier, aggregated tables only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Total column name, aggregated tables only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_column: Option<String>,
}

impl TableMeta {
    const fn new(geo_level: GeoLevel, frequency: Frequency) -> Self {
        Self {
            geo_level,
            frequency,
            domain: None,
            total_column: None,
        }
    }

    fn into_metadata(self) -> Result<HashMap<String, String>, StoreError> {
        let json = serde_json::to_string(&self)?;
        Ok(HashMap::from([(META_KEY.to_string(), json)]))
    }
}

// ============================================================================
// Schema Definitions
// ============================================================================

fn period_field() -> Field {
    Field::new(
        "period",
        DataType::Timestamp(TimeUnit::Microsecond, None),
        false,
    )
}

fn key_fields(geo_level: GeoLevel) -> impl Iterator<Item = Field> {
    geo_level
        .columns()
        .iter()
        .map(|c| Field::new(*c, DataType::Utf8, false))
}

fn metadata(
    geo_level: GeoLevel,
    frequency: Frequency,
) -> Result<HashMap<String, String>, StoreError> {
    TableMeta::new(geo_level, frequency).into_metadata()
}

/// Schema of an aggregated domain table.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn aggregated_schema(table: &AggregatedTable) -> Result<SchemaRef, StoreError> {
    let mut fields = vec![period_field()];
    fields.extend(key_fields(table.geo_level));
    fields.extend(
        table
            .value_columns
            .iter()
            .map(|c| Field::new(c, DataType::Int64, true)),
    );
    fields.push(Field::new(&table.total_column, DataType::Int64, false));

    let meta = TableMeta {
        domain: Some(table.domain.clone()),
        total_column: Some(table.total_column.clone()),
        ..TableMeta::new(table.geo_level, table.frequency)
    };
    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        meta.into_metadata()?,
    )))
}

/// Schema of the metrics panel. Counter metrics are `Int64`, derived ones
/// `Float64`, in [`Metric`] declaration order.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn metrics_schema(
    geo_level: GeoLevel,
    frequency: Frequency,
) -> Result<SchemaRef, StoreError> {
    let mut fields = vec![period_field()];
    fields.extend(key_fields(geo_level));
    fields.extend(Metric::iter().map(|m| {
        let data_type = if m.is_count() {
            DataType::Int64
        } else {
            DataType::Float64
        };
        Field::new(m.as_ref(), data_type, false)
    }));
    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        metadata(geo_level, frequency)?,
    )))
}

/// Schema of the anomaly table.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn anomalies_schema(
    geo_level: GeoLevel,
    frequency: Frequency,
) -> Result<SchemaRef, StoreError> {
    let mut fields = vec![period_field()];
    fields.extend(key_fields(geo_level));
    fields.extend([
        Field::new("metric", DataType::Utf8, false),
        Field::new("zscore", DataType::Float64, false),
        Field::new("direction", DataType::Utf8, false),
    ]);
    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        metadata(geo_level, frequency)?,
    )))
}

/// Schema of the forecast table.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn forecast_schema(
    geo_level: GeoLevel,
    frequency: Frequency,
) -> Result<SchemaRef, StoreError> {
    let mut fields: Vec<Field> = key_fields(geo_level).collect();
    fields.extend([
        Field::new("metric", DataType::Utf8, false),
        period_field(),
        Field::new("forecast", DataType::Float64, false),
    ]);
    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        metadata(geo_level, frequency)?,
    )))
}

// ============================================================================
// Encoding
// ============================================================================

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn period_array<'a>(periods: impl Iterator<Item = &'a Period>) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(
        periods.map(|p| p.timestamp_micros()).collect::<Vec<_>>(),
    ))
}

fn key_arrays<'a>(
    geo_level: GeoLevel,
    keys: impl Iterator<Item = &'a GeographyKey> + Clone,
) -> Vec<ArrayRef> {
    (0..geo_level.arity())
        .map(|i| {
            Arc::new(StringArray::from(
                keys.clone()
                    .map(|k| k.fields().get(i).map(String::as_str))
                    .collect::<Vec<_>>(),
            )) as ArrayRef
        })
        .collect()
}

/// Encodes an aggregated domain table.
///
/// # Errors
///
/// Returns [`StoreError::Arrow`] if the columns do not fit the schema, or
/// [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn aggregated_to_batch(table: &AggregatedTable) -> Result<RecordBatch, StoreError> {
    let rows = &table.records;
    let mut columns = vec![period_array(rows.iter().map(|r| &r.period))];
    columns.extend(key_arrays(table.geo_level, rows.iter().map(|r| &r.key)));
    for i in 0..table.value_columns.len() {
        columns.push(Arc::new(Int64Array::from(
            rows.iter()
                .map(|r| r.counts.get(i).copied().flatten().map(to_i64))
                .collect::<Vec<_>>(),
        )));
    }
    columns.push(Arc::new(Int64Array::from(
        rows.iter().map(|r| to_i64(r.total)).collect::<Vec<_>>(),
    )));

    Ok(RecordBatch::try_new(aggregated_schema(table)?, columns)?)
}

/// Encodes the metrics panel.
///
/// # Errors
///
/// Returns [`StoreError::Arrow`] if the columns do not fit the schema, or
/// [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn metrics_to_batch(table: &MetricsTable) -> Result<RecordBatch, StoreError> {
    let rows = &table.records;
    let mut columns = vec![period_array(rows.iter().map(|r| &r.period))];
    columns.extend(key_arrays(table.geo_level, rows.iter().map(|r| &r.key)));
    for metric in Metric::iter() {
        let column: ArrayRef = if metric.is_count() {
            Arc::new(Int64Array::from(
                rows.iter()
                    .map(|r| r.count(metric).map_or(0, to_i64))
                    .collect::<Vec<_>>(),
            ))
        } else {
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.value(metric)).collect::<Vec<_>>(),
            ))
        };
        columns.push(column);
    }

    Ok(RecordBatch::try_new(
        metrics_schema(table.geo_level, table.frequency)?,
        columns,
    )?)
}

/// Encodes the anomaly table.
///
/// # Errors
///
/// Returns [`StoreError::Arrow`] if the columns do not fit the schema, or
/// [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn anomalies_to_batch(table: &AnomalyTable) -> Result<RecordBatch, StoreError> {
    let rows = &table.records;
    let mut columns = vec![period_array(rows.iter().map(|r| &r.period))];
    columns.extend(key_arrays(table.geo_level, rows.iter().map(|r| &r.key)));
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|r| r.metric.as_ref()).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(Float64Array::from(
        rows.iter().map(|r| r.zscore).collect::<Vec<_>>(),
    )));
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|r| r.direction.as_ref()).collect::<Vec<_>>(),
    )));

    Ok(RecordBatch::try_new(
        anomalies_schema(table.geo_level, table.frequency)?,
        columns,
    )?)
}

/// Encodes the forecast table.
///
/// # Errors
///
/// Returns [`StoreError::Arrow`] if the columns do not fit the schema, or
/// [`StoreError::Json`] if the table metadata cannot be encoded.
pub fn forecast_to_batch(table: &ForecastTable) -> Result<RecordBatch, StoreError> {
    let rows = &table.records;
    let mut columns = key_arrays(table.geo_level, rows.iter().map(|r| &r.key));
    columns.push(Arc::new(StringArray::from(
        rows.iter().map(|r| r.metric.as_ref()).collect::<Vec<_>>(),
    )));
    columns.push(period_array(rows.iter().map(|r| &r.period)));
    columns.push(Arc::new(Float64Array::from(
        rows.iter().map(|r| r.forecast).collect::<Vec<_>>(),
    )));

    Ok(RecordBatch::try_new(
        forecast_schema(table.geo_level, table.frequency)?,
        columns,
    )?)
}

// ============================================================================
// Decoding
// ============================================================================

fn mismatch(path: &Path, message: impl Into<String>) -> StoreError {
    StoreError::SchemaMismatch {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Table shape recorded in a schema's metadata.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] if the entry is absent or
/// malformed.
pub fn table_meta(schema: &Schema, path: &Path) -> Result<TableMeta, StoreError> {
    let json = schema
        .metadata()
        .get(META_KEY)
        .ok_or_else(|| mismatch(path, format!("schema metadata has no '{META_KEY}' entry")))?;
    serde_json::from_str(json).map_err(|e| mismatch(path, format!("bad table metadata: {e}")))
}

fn column<'a, T: 'static>(
    batch: &'a RecordBatch,
    name: &str,
    type_name: &str,
    path: &Path,
) -> Result<&'a T, StoreError> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| mismatch(path, format!("missing column '{name}'")))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| mismatch(path, format!("column '{name}' is not {type_name}")))
}

fn col_string<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, StoreError> {
    column(batch, name, "Utf8", path)
}

fn col_i64<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Int64Array, StoreError> {
    column(batch, name, "Int64", path)
}

fn col_f64<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Float64Array, StoreError> {
    column(batch, name, "Float64", path)
}

/// Row-wise reader for the period and key columns shared by every table.
struct KeyColumns<'a> {
    geo_level: GeoLevel,
    period: &'a TimestampMicrosecondArray,
    keys: Vec<&'a StringArray>,
}

impl<'a> KeyColumns<'a> {
    fn new(batch: &'a RecordBatch, geo_level: GeoLevel, path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            geo_level,
            period: column(batch, "period", "Timestamp(Microsecond)", path)?,
            keys: geo_level
                .columns()
                .iter()
                .map(|c| col_string(batch, c, path))
                .collect::<Result<_, _>>()?,
        })
    }

    fn period(&self, row: usize, path: &Path) -> Result<Period, StoreError> {
        if self.period.is_null(row) {
            return Err(mismatch(path, format!("null period at row {row}")));
        }
        Period::from_timestamp_micros(self.period.value(row))
            .ok_or_else(|| mismatch(path, format!("period out of range at row {row}")))
    }

    fn key(&self, row: usize, path: &Path) -> Result<GeographyKey, StoreError> {
        let fields = self.keys.iter().map(|c| c.value(row).to_string()).collect();
        GeographyKey::new(self.geo_level, fields).map_err(|e| mismatch(path, e.to_string()))
    }
}

fn to_u64(v: i64, name: &str, path: &Path) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| mismatch(path, format!("negative count {v} in '{name}'")))
}

fn parse_metric(s: &str, path: &Path) -> Result<Metric, StoreError> {
    Metric::from_str(s).map_err(|_| mismatch(path, format!("unknown metric '{s}'")))
}

/// Decodes an aggregated domain table.
///
/// Value columns are every column other than `period`, the key columns, and
/// the total column recorded in the schema metadata.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] if a column is missing, has the
/// wrong type, or holds an out-of-range value.
pub fn aggregated_from_batches(
    schema: &Schema,
    batches: &[RecordBatch],
    path: &Path,
) -> Result<AggregatedTable, StoreError> {
    let TableMeta {
        geo_level,
        frequency,
        domain,
        total_column,
    } = table_meta(schema, path)?;
    let total_column =
        total_column.ok_or_else(|| mismatch(path, "table metadata has no total column"))?;
    let domain = domain.unwrap_or_default();
    let value_columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|n| {
            n != "period" && *n != total_column && !geo_level.columns().contains(&n.as_str())
        })
        .collect();

    let mut records = Vec::new();
    for batch in batches {
        let keys = KeyColumns::new(batch, geo_level, path)?;
        let values = value_columns
            .iter()
            .map(|c| col_i64(batch, c, path))
            .collect::<Result<Vec<_>, _>>()?;
        let total = col_i64(batch, &total_column, path)?;

        for row in 0..batch.num_rows() {
            let counts = values
                .iter()
                .zip(&value_columns)
                .map(|(col, name)| {
                    if col.is_null(row) {
                        Ok(None)
                    } else {
                        to_u64(col.value(row), name, path).map(Some)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            records.push(AggregatedRecord {
                period: keys.period(row, path)?,
                key: keys.key(row, path)?,
                counts,
                total: to_u64(total.value(row), &total_column, path)?,
            });
        }
    }

    Ok(AggregatedTable {
        domain,
        geo_level,
        frequency,
        value_columns,
        total_column,
        records,
    })
}

/// Decodes the metrics panel.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] if a column is missing or has the
/// wrong type.
pub fn metrics_from_batches(
    schema: &Schema,
    batches: &[RecordBatch],
    path: &Path,
) -> Result<MetricsTable, StoreError> {
    let TableMeta {
        geo_level,
        frequency,
        ..
    } = table_meta(schema, path)?;

    let mut records = Vec::new();
    for batch in batches {
        let keys = KeyColumns::new(batch, geo_level, path)?;
        let mut counts = HashMap::new();
        let mut values = HashMap::new();
        for metric in Metric::iter() {
            if metric.is_count() {
                counts.insert(metric, col_i64(batch, metric.as_ref(), path)?);
            } else {
                values.insert(metric, col_f64(batch, metric.as_ref(), path)?);
            }
        }
        let count = |metric: Metric, row: usize| -> Result<u64, StoreError> {
            let v = counts.get(&metric).map_or(0, |c| c.value(row));
            to_u64(v, metric.as_ref(), path)
        };
        let value = |metric: Metric, row: usize| values.get(&metric).map_or(0.0, |c| c.value(row));

        for row in 0..batch.num_rows() {
            records.push(MetricsRecord {
                period: keys.period(row, path)?,
                key: keys.key(row, path)?,
                age_0_5: count(Metric::Age0To5, row)?,
                age_5_17: count(Metric::Age5To17, row)?,
                age_18_greater: count(Metric::Age18Greater, row)?,
                enrol_total: count(Metric::EnrolTotal, row)?,
                demo_age_5_17: count(Metric::DemoAge5To17, row)?,
                demo_age_17_plus: count(Metric::DemoAge17Plus, row)?,
                demo_total: count(Metric::DemoTotal, row)?,
                bio_age_5_17: count(Metric::BioAge5To17, row)?,
                bio_age_17_plus: count(Metric::BioAge17Plus, row)?,
                bio_total: count(Metric::BioTotal, row)?,
                demo_to_enrol: value(Metric::DemoToEnrol, row),
                bio_to_enrol: value(Metric::BioToEnrol, row),
                youth_enrol_share: value(Metric::YouthEnrolShare, row),
                adult_enrol_share: value(Metric::AdultEnrolShare, row),
                youth_bio_share: value(Metric::YouthBioShare, row),
                adult_bio_share: value(Metric::AdultBioShare, row),
                demo_mom: value(Metric::DemoMom, row),
                demo_positive_diff: value(Metric::DemoPositiveDiff, row),
                tx_load: count(Metric::TxLoad, row)?,
                digital_inclusion_index: value(Metric::DigitalInclusionIndex, row),
                migration_intensity_score: value(Metric::MigrationIntensityScore, row),
                service_stress_index: value(Metric::ServiceStressIndex, row),
                data_quality_friction_index: value(Metric::DataQualityFrictionIndex, row),
                biometric_failure_risk_score: value(Metric::BiometricFailureRiskScore, row),
            });
        }
    }

    Ok(MetricsTable {
        geo_level,
        frequency,
        records,
    })
}

/// Decodes the anomaly table.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] if a column is missing, has the
/// wrong type, or names an unknown metric or direction.
pub fn anomalies_from_batches(
    schema: &Schema,
    batches: &[RecordBatch],
    path: &Path,
) -> Result<AnomalyTable, StoreError> {
    let TableMeta {
        geo_level,
        frequency,
        ..
    } = table_meta(schema, path)?;

    let mut records = Vec::new();
    for batch in batches {
        let keys = KeyColumns::new(batch, geo_level, path)?;
        let metric = col_string(batch, "metric", path)?;
        let zscore = col_f64(batch, "zscore", path)?;
        let direction = col_string(batch, "direction", path)?;

        for row in 0..batch.num_rows() {
            let dir = direction.value(row);
            records.push(AnomalyRecord {
                period: keys.period(row, path)?,
                key: keys.key(row, path)?,
                metric: parse_metric(metric.value(row), path)?,
                zscore: zscore.value(row),
                direction: Direction::from_str(dir)
                    .map_err(|_| mismatch(path, format!("unknown direction '{dir}'")))?,
            });
        }
    }

    Ok(AnomalyTable {
        geo_level,
        frequency,
        records,
    })
}

/// Decodes the forecast table.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] if a column is missing, has the
/// wrong type, or names an unknown metric.
pub fn forecast_from_batches(
    schema: &Schema,
    batches: &[RecordBatch],
    path: &Path,
) -> Result<ForecastTable, StoreError> {
    let TableMeta {
        geo_level,
        frequency,
        ..
    } = table_meta(schema, path)?;

    let mut records = Vec::new();
    for batch in batches {
        let keys = KeyColumns::new(batch, geo_level, path)?;
        let metric = col_string(batch, "metric", path)?;
        let forecast = col_f64(batch, "forecast", path)?;

        for row in 0..batch.num_rows() {
            records.push(ForecastRecord {
                key: keys.key(row, path)?,
                metric: parse_metric(metric.value(row), path)?,
                period: keys.period(row, path)?,
                forecast: forecast.value(row),
            });
        }
    }

    Ok(ForecastTable {
        geo_level,
        frequency,
        records,
    })
}
