use std::path::Path;

use arrow_array::RecordBatch;
use asie_panel_models::{
    AnomalyRecord, AnomalyTable, Direction, ForecastRecord, ForecastTable, Frequency, GeoLevel,
    GeographyKey, Metric, MetricsRecord, MetricsTable, Period, Severity,
};
use asie_query::{QueryEngine, QueryError, SeriesQuery};
use asie_store::paths::{anomalies_file, forecast_file, metrics_file};
use asie_store::{Staging, tables};
use chrono::NaiveDate;

const FREQ: Frequency = Frequency::Monthly;
const DII: Metric = Metric::DigitalInclusionIndex;

fn month(m: u32) -> Period {
    Period::from_start(NaiveDate::from_ymd_opt(2025, m, 1).unwrap())
}

fn key(level: GeoLevel, fields: &[&str]) -> GeographyKey {
    GeographyKey::new(level, fields.iter().map(ToString::to_string).collect()).unwrap()
}

fn record(level: GeoLevel, m: u32, fields: &[&str], dii: f64) -> MetricsRecord {
    MetricsRecord {
        period: month(m),
        key: key(level, fields),
        age_0_5: 0,
        age_5_17: 0,
        age_18_greater: 0,
        enrol_total: u64::from(m) * 10,
        demo_age_5_17: 0,
        demo_age_17_plus: 0,
        demo_total: 0,
        bio_age_5_17: 0,
        bio_age_17_plus: 0,
        bio_total: 0,
        demo_to_enrol: 0.0,
        bio_to_enrol: 0.0,
        youth_enrol_share: 1.0 / 3.0,
        adult_enrol_share: 0.0,
        youth_bio_share: 0.0,
        adult_bio_share: 0.0,
        demo_mom: 0.0,
        demo_positive_diff: 0.0,
        tx_load: 0,
        digital_inclusion_index: dii,
        migration_intensity_score: 0.0,
        service_stress_index: 0.0,
        data_quality_friction_index: 0.0,
        biometric_failure_risk_score: 0.0,
    }
}

fn write(path: &Path, batch: &RecordBatch) {
    let mut staging = Staging::new();
    staging.stage_batch(path, batch).unwrap();
    staging.commit().unwrap();
}

fn state_panel() -> MetricsTable {
    let s = GeoLevel::State;
    MetricsTable {
        geo_level: s,
        frequency: FREQ,
        records: vec![
            record(s, 1, &["Kerala"], 10.0),
            record(s, 1, &["Punjab"], 90.0),
            record(s, 2, &["Goa"], 50.0),
            record(s, 2, &["Kerala"], 20.0),
            record(s, 3, &["Assam"], 5.0),
            record(s, 3, &["Goa"], 40.0),
            record(s, 3, &["Kerala"], 35.0),
        ],
    }
}

fn district_panel() -> MetricsTable {
    let d = GeoLevel::District;
    MetricsTable {
        geo_level: d,
        frequency: FREQ,
        records: vec![
            record(d, 2, &["Goa", "North Goa"], 30.0),
            record(d, 2, &["Kerala", "Ernakulam"], 25.0),
            record(d, 2, &["Kerala", "Kollam"], 15.0),
            record(d, 3, &["Goa", "North Goa"], 31.0),
            record(d, 3, &["Kerala", "Ernakulam"], 26.0),
            record(d, 3, &["Kerala", "Kollam"], 16.0),
        ],
    }
}

fn anomaly(m: u32, state: &str, metric: Metric, zscore: f64) -> AnomalyRecord {
    AnomalyRecord {
        period: month(m),
        key: key(GeoLevel::State, &[state]),
        metric,
        zscore,
        direction: Direction::from_zscore(zscore),
    }
}

fn write_state(dir: &Path) {
    write(
        &dir.join(metrics_file(GeoLevel::State, FREQ)),
        &tables::metrics_to_batch(&state_panel()).unwrap(),
    );
}

fn write_district(dir: &Path) {
    write(
        &dir.join(metrics_file(GeoLevel::District, FREQ)),
        &tables::metrics_to_batch(&district_panel()).unwrap(),
    );
}

fn write_anomalies(dir: &Path) {
    let table = AnomalyTable {
        geo_level: GeoLevel::State,
        frequency: FREQ,
        records: vec![
            anomaly(2, "Goa", Metric::TxLoad, 3.2),
            anomaly(3, "Kerala", Metric::TxLoad, -2.6),
            anomaly(3, "Goa", Metric::DemoToEnrol, 2.1),
        ],
    };
    write(
        &dir.join(anomalies_file(GeoLevel::State, FREQ)),
        &tables::anomalies_to_batch(&table).unwrap(),
    );
}

fn write_forecast(dir: &Path) {
    let table = ForecastTable {
        geo_level: GeoLevel::State,
        frequency: FREQ,
        records: [(4, 47.5), (5, 60.0)]
            .into_iter()
            .map(|(m, v)| ForecastRecord {
                key: key(GeoLevel::State, &["Kerala"]),
                metric: DII,
                period: month(m),
                forecast: v,
            })
            .collect(),
    };
    write(
        &dir.join(forecast_file(GeoLevel::State)),
        &tables::forecast_to_batch(&table).unwrap(),
    );
}

fn series<'a>(state: &'a str, since: Option<&'a str>) -> SeriesQuery<'a> {
    SeriesQuery {
        level: GeoLevel::State,
        state,
        district: None,
        pincode: None,
        metric: DII,
        since,
    }
}

#[test]
fn meta_reports_periods_and_district_availability() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let meta = engine.meta().unwrap();
    assert_eq!(meta.periods, ["2025-01", "2025-02", "2025-03"]);
    assert_eq!(meta.latest_period.as_deref(), Some("2025-03"));
    assert!(!meta.has_district);
    assert_eq!(meta.indices, Metric::INDICES);

    write_district(tmp.path());
    assert!(engine.meta().unwrap().has_district);
}

#[test]
fn missing_state_panel_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = QueryEngine::new(tmp.path(), FREQ);
    assert!(matches!(engine.meta(), Err(QueryError::NotFound { .. })));
    assert!(matches!(engine.states(), Err(QueryError::NotFound { .. })));
}

#[test]
fn states_and_districts() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    assert_eq!(engine.states().unwrap(), ["Assam", "Goa", "Kerala", "Punjab"]);
    assert!(matches!(
        engine.districts("Kerala"),
        Err(QueryError::NotFound { .. })
    ));

    write_district(tmp.path());
    assert_eq!(engine.districts("kerala").unwrap(), ["Ernakulam", "Kollam"]);
    assert!(matches!(
        engine.districts("Atlantis"),
        Err(QueryError::NotFound { .. })
    ));
}

#[test]
fn summary_ranks_latest_period_with_deltas() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let summary = engine.summary(GeoLevel::State, None, 5).unwrap();
    assert_eq!(summary.latest_period, "2025-03");
    assert_eq!(summary.indices.len(), 5);
    assert_eq!(summary.indices[0].metric, DII);

    let rows = &summary.indices[0].rows;
    let names: Vec<&str> = rows.iter().map(|r| r.state.as_str()).collect();
    // Punjab has no row in the latest period
    assert_eq!(names, ["Goa", "Kerala", "Assam"]);
    assert_eq!(rows.iter().map(|r| r.rank).collect::<Vec<_>>(), [1, 2, 3]);
    assert_eq!(rows[0].delta, Some(-10.0));
    assert_eq!(rows[1].delta, Some(15.0));
    // no earlier row to compare against
    assert_eq!(rows[2].delta, None);
}

#[test]
fn summary_filters_and_caps() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let summary = engine.summary(GeoLevel::State, Some("GOA"), 500).unwrap();
    assert_eq!(summary.indices[0].rows.len(), 1);
    assert_eq!(summary.indices[0].rows[0].state, "Goa");

    assert!(matches!(
        engine.summary(GeoLevel::State, None, 0),
        Err(QueryError::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.summary(GeoLevel::State, Some("Punjab"), 5),
        Err(QueryError::NotFound { .. })
    ));
}

#[test]
fn table_ranks_any_metric() {
    let tmp = tempfile::tempdir().unwrap();
    write_district(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let rows = engine
        .table(GeoLevel::District, DII, Some("Kerala"), 1)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].district.as_deref(), Some("Ernakulam"));
    assert!((rows[0].value - 26.0).abs() < f64::EPSILON);
    assert_eq!(rows[0].delta, None);

    let json = serde_json::to_value(&rows[0]).unwrap();
    assert_eq!(json["metric"], "digital_inclusion_index");
    assert!(json.get("delta").is_none());
    assert!(json.get("pincode").is_none());
}

#[test]
fn timeseries_with_forecast_overlay() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let plain = engine.timeseries(&series("kerala", None)).unwrap();
    assert_eq!(plain.key, ["Kerala"]);
    assert_eq!(plain.periods, ["2025-01", "2025-02", "2025-03"]);
    assert_eq!(plain.values, [10.0, 20.0, 35.0]);
    assert!(plain.forecast.is_none());

    write_forecast(tmp.path());
    let with_forecast = engine.timeseries(&series("Kerala", Some("2025-02"))).unwrap();
    assert_eq!(with_forecast.periods, ["2025-02", "2025-03"]);
    let overlay = with_forecast.forecast.unwrap();
    assert_eq!(overlay.periods, ["2025-04", "2025-05"]);
    assert_eq!(overlay.values, [47.5, 60.0]);
}

#[test]
fn timeseries_rounds_values() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let shares = engine
        .timeseries(&SeriesQuery {
            metric: Metric::YouthEnrolShare,
            ..series("Goa", None)
        })
        .unwrap();
    assert_eq!(shares.values, [0.33, 0.33]);
}

#[test]
fn timeseries_argument_errors() {
    let tmp = tempfile::tempdir().unwrap();
    write_state(tmp.path());
    write_district(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);

    let district_without_name = SeriesQuery {
        level: GeoLevel::District,
        ..series("Kerala", None)
    };
    assert!(matches!(
        engine.timeseries(&district_without_name),
        Err(QueryError::InvalidArgument { .. })
    ));

    let kollam = engine
        .timeseries(&SeriesQuery {
            district: Some("kollam"),
            ..district_without_name
        })
        .unwrap();
    assert_eq!(kollam.key, ["Kerala", "Kollam"]);
    assert_eq!(kollam.values, [15.0, 16.0]);

    assert!(matches!(
        engine.timeseries(&series("Kerala", Some("March"))),
        Err(QueryError::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.timeseries(&series("Atlantis", None)),
        Err(QueryError::NotFound { .. })
    ));
    assert!(matches!(
        engine.timeseries(&series("Kerala", Some("2026-01"))),
        Err(QueryError::NotFound { .. })
    ));
}

#[test]
fn anomalies_newest_first_with_severity() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = QueryEngine::new(tmp.path(), FREQ);
    assert!(matches!(
        engine.anomalies(GeoLevel::State, None, None, None),
        Err(QueryError::NotFound { .. })
    ));

    write_anomalies(tmp.path());
    let rows = engine.anomalies(GeoLevel::State, None, None, None).unwrap();
    let order: Vec<(&str, Metric)> = rows.iter().map(|r| (r.period.as_str(), r.metric)).collect();
    assert_eq!(
        order,
        [
            ("2025-03", Metric::DemoToEnrol),
            ("2025-03", Metric::TxLoad),
            ("2025-02", Metric::TxLoad),
        ]
    );
    assert_eq!(rows[0].severity, Severity::Low);
    assert_eq!(rows[1].severity, Severity::Medium);
    assert_eq!(rows[1].direction, Direction::Drop);
    assert_eq!(rows[2].severity, Severity::High);

    let filtered = engine
        .anomalies(GeoLevel::State, Some(Metric::TxLoad), Some("2025-03"), Some("kerala"))
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].state, "Kerala");
}

#[test]
fn replaced_artifacts_are_reloaded() {
    let tmp = tempfile::tempdir().unwrap();
    write_district(tmp.path());
    let engine = QueryEngine::new(tmp.path(), FREQ);
    assert_eq!(engine.districts("Goa").unwrap(), ["North Goa"]);

    let mut panel = district_panel();
    panel
        .records
        .push(record(GeoLevel::District, 3, &["Goa", "South Goa"], 12.0));
    write(
        &tmp.path().join(metrics_file(GeoLevel::District, FREQ)),
        &tables::metrics_to_batch(&panel).unwrap(),
    );
    assert_eq!(engine.districts("Goa").unwrap(), ["North Goa", "South Goa"]);
}

#[test]
fn parse_since_formats() {
    use asie_query::parse_since;

    let march = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    assert_eq!(parse_since("2025-03").unwrap(), march);
    assert_eq!(parse_since("2025-03-01").unwrap(), march);
    assert!(parse_since("03/2025").is_err());
    assert!(parse_since("").is_err());
}
