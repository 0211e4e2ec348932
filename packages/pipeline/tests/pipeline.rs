use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asie_ingest::progress::{ProgressCallback, null_progress};
use asie_panel_models::{GeoLevel, Metric};
use asie_pipeline::{PipelineConfig, PipelineError, run_forecasts, run_pipeline};
use asie_store::paths::{LOCK_FILE, anomalies_file, forecast_file, metrics_file};
use asie_store::{RunLock, StoreError, read_forecast, read_metrics};

const MONTHS: [&str; 4] = ["01", "02", "03", "04"];

fn no_progress(_: &asie_ingest::domain::DomainDefinition) -> Arc<dyn ProgressCallback> {
    null_progress()
}

fn write_csv(dir: &Path, name: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

/// Raw tree with two states reporting every domain for four months, plus a
/// row with an unparseable date.
fn raw_tree(root: &Path) {
    let mut enrol = String::from("date,state,district,pincode,age_0_5,age_5_17,age_18_greater\n");
    let mut demo = String::from("date,state,district,pincode,demo_age_5_17,demo_age_17_\n");
    let mut bio = String::from("date,state,district,pincode,bio_age_5_17,bio_age_17_\n");

    for (i, month) in (1u64..).zip(MONTHS) {
        for (state, scale) in [("Kerala", 1), ("Goa", 3)] {
            let n = i * scale;
            enrol.push_str(&format!(
                "05-{month}-2025,{state},D1,{n}00,{n},{},{}\n",
                n * 2,
                n * 3
            ));
            demo.push_str(&format!("07-{month}-2025,{state},D1,{n}00,{},{n}\n", n + 4));
            bio.push_str(&format!("09-{month}-2025,{state},D1,{n}00,{n},{}\n", n * 5));
        }
    }
    enrol.push_str("2025/04/30,Kerala,D1,100,1000,1000,1000\n");

    write_csv(&root.join("enrolment/api_data_aadhar_enrolment"), "part_0.csv", &enrol);
    write_csv(&root.join("demographic/api_data_aadhar_demographic"), "part_0.csv", &demo);
    write_csv(&root.join("biometric/api_data_aadhar_biometric"), "part_0.csv", &bio);
}

fn config(root: &Path, processed: &str) -> PipelineConfig {
    PipelineConfig {
        raw_root: root.join("raw"),
        processed_root: root.join(processed),
        reports_root: root.join("reports"),
        ..PipelineConfig::default()
    }
}

fn listing(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    entries
}

#[test]
fn two_states_four_months() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));
    let config = config(tmp.path(), "processed");

    let report = run_pipeline(&config, &no_progress).unwrap();

    assert_eq!(report.metrics_rows, 8);
    assert_eq!(report.domains.len(), 3);
    assert_eq!(report.domains[0].dropped_dates, 1);
    assert_eq!(report.latest_period.unwrap().month_label(), "2025-04");
    // 3 domains + metrics + anomalies + report
    assert_eq!(report.artifacts.len(), 6);

    let metrics = read_metrics(&config.processed_root.join(metrics_file(
        GeoLevel::State,
        config.frequency,
    )))
    .unwrap();
    assert_eq!(metrics.records.len(), 8);
    let goa_april = metrics
        .records
        .iter()
        .find(|r| r.key.state() == "Goa" && r.period.month_label() == "2025-04")
        .unwrap();
    // n = 12: 12 + 24 + 36
    assert_eq!(goa_april.enrol_total, 72);
    for r in &metrics.records {
        for m in Metric::INDICES {
            assert!((0.0..=100.0).contains(&r.value(m)));
        }
    }

    let summary = fs::read_to_string(tmp.path().join("reports/summary.md")).unwrap();
    assert!(summary.contains("Latest period: **2025-04**"));
    assert!(summary.contains("## Recommendations"));
}

#[test]
fn identical_input_gives_identical_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));

    let first = config(tmp.path(), "first");
    let second = config(tmp.path(), "second");
    run_pipeline(&first, &no_progress).unwrap();
    run_pipeline(&second, &no_progress).unwrap();

    for name in [
        metrics_file(GeoLevel::State, first.frequency),
        anomalies_file(GeoLevel::State, first.frequency),
    ] {
        let a = fs::read(first.processed_root.join(&name)).unwrap();
        let b = fs::read(second.processed_root.join(&name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}

#[test]
fn missing_domain_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));
    fs::remove_dir_all(tmp.path().join("raw/biometric")).unwrap();
    let config = config(tmp.path(), "processed");

    let err = run_pipeline(&config, &no_progress).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ingest(asie_ingest::IngestError::NotFound { .. })
    ));

    // only the lock file was created
    assert_eq!(
        listing(&config.processed_root),
        [config.processed_root.join(LOCK_FILE)]
    );
    assert!(!tmp.path().join("reports/summary.md").exists());
}

#[test]
fn concurrent_run_is_busy() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));
    let config = config(tmp.path(), "processed");

    let _held = RunLock::acquire(&config.processed_root).unwrap();
    let err = run_pipeline(&config, &no_progress).unwrap_err();
    assert!(matches!(err, PipelineError::Store(StoreError::Busy { .. })));
}

#[test]
fn forecasts_follow_a_run() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));
    let mut config = config(tmp.path(), "processed");
    config.forecast.min_history = 4;
    config.forecast.horizon = 3;

    run_pipeline(&config, &no_progress).unwrap();
    let reports = run_forecasts(&config).unwrap();

    // no district panel was produced, so only the state level is forecast
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].geo_level, GeoLevel::State);

    let forecast = read_forecast(&config.processed_root.join(forecast_file(GeoLevel::State))).unwrap();
    // 2 states x 9 metrics x 3 periods
    assert_eq!(forecast.records.len(), 2 * 9 * 3);
    let kerala_enrol: Vec<_> = forecast
        .records
        .iter()
        .filter(|r| r.key.state() == "Kerala" && r.metric == Metric::EnrolTotal)
        .collect();
    let labels: Vec<String> = kerala_enrol.iter().map(|r| r.period.month_label()).collect();
    assert_eq!(labels, ["2025-05", "2025-06", "2025-07"]);
    // Kerala enrolment grows by 6 a month from 6
    let values: Vec<f64> = kerala_enrol.iter().map(|r| r.forecast).collect();
    assert_eq!(values, [30.0, 36.0, 42.0]);
}

#[test]
fn forecasts_skip_when_history_is_short() {
    let tmp = tempfile::tempdir().unwrap();
    raw_tree(&tmp.path().join("raw"));
    let config = config(tmp.path(), "processed");

    run_pipeline(&config, &no_progress).unwrap();
    let reports = run_forecasts(&config).unwrap();

    // four months is below the default history of six
    assert_eq!(reports[0].rows, 0);
}
