//! Markdown summary report.

use asie_panel_models::{AnomalyTable, Metric, MetricsRecord, MetricsTable};

const TITLE: &str = "# Aadhaar Societal Intelligence Engine (ASIE)";

const NO_ANOMALIES: &str = "No anomalies detected with current threshold.";

/// One recommendation per index, in [`Metric::INDICES`] order.
const PLAYBOOK: [&str; 5] = [
    "- **Digital Inclusion (high DII leaders):** Consolidate gains with self-service + assisted channels; replicate playbook in mid-tier regions.",
    "- **Migration Intensity (high MIS):** Pre-position address/mobile update capacity; mobile camps in in-migration hotspots; multilingual comms.",
    "- **Service Stress (high ASSI):** Add temporary staff/slots, monitor kit uptime, triage complex cases to assisted counters.",
    "- **Data Friction (high DQFI):** Review exception codes/docs, simplify checklists, deploy senior resolver at centers with repeated rework.",
    "- **Biometric Risk (high BFRS):** Prioritize iris/face capture for youth/elderly; refresh/maintain devices; schedule proactive recapture drives.",
];

/// Heading used for an index in the report.
#[must_use]
pub const fn index_title(metric: Metric) -> &'static str {
    match metric {
        Metric::DigitalInclusionIndex => "Top Digital Inclusion Index",
        Metric::MigrationIntensityScore => "Top Migration Intensity Score",
        Metric::ServiceStressIndex => "Top Service Stress Index",
        Metric::DataQualityFrictionIndex => "Highest Data Quality & Friction",
        Metric::BiometricFailureRiskScore => "Highest Biometric Failure Risk",
        _ => "Other",
    }
}

/// Latest-period rows ordered by `metric` descending, ties by key, at most
/// `n` of them.
#[must_use]
pub fn top_rows(table: &MetricsTable, metric: Metric, n: usize) -> Vec<&MetricsRecord> {
    let Some(latest) = table.latest_period() else {
        return Vec::new();
    };
    let mut rows: Vec<&MetricsRecord> = table
        .records
        .iter()
        .filter(|r| r.period == latest)
        .collect();
    rows.sort_by(|a, b| {
        b.value(metric)
            .total_cmp(&a.value(metric))
            .then_with(|| a.key.cmp(&b.key))
    });
    rows.truncate(n);
    rows
}

/// Appends `text` and a newline.
fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

/// Appends `text` followed by a blank line.
fn block(out: &mut String, text: &str) {
    out.push_str(text);
    out.push_str("\n\n");
}

fn table_header(out: &mut String, columns: &[&str]) {
    line(out, &format!("| {} |", columns.join(" | ")));
    line(out, &format!("|{}", "---|".repeat(columns.len())));
}

/// Renders the report for one run.
#[must_use]
pub fn render(
    metrics: &MetricsTable,
    anomalies: &AnomalyTable,
    top_n: usize,
    recent_anomalies: usize,
) -> String {
    let key_columns = metrics.geo_level.columns();
    let mut out = String::new();

    block(&mut out, TITLE);
    let latest = metrics
        .latest_period()
        .map_or_else(|| "n/a".to_string(), |p| p.month_label());
    block(
        &mut out,
        &format!(
            "Geo level: **{}** | Frequency: **{}** | Latest period: **{latest}**",
            metrics.geo_level, metrics.frequency
        ),
    );

    block(&mut out, "## Highlights (latest period)");
    for metric in Metric::INDICES {
        block(&mut out, &format!("### {}", index_title(metric)));
        let rows = top_rows(metrics, metric, top_n);
        if rows.is_empty() {
            block(&mut out, "No data.");
            continue;
        }
        let mut columns = key_columns.to_vec();
        columns.push(metric.as_ref());
        table_header(&mut out, &columns);
        for r in rows {
            line(
                &mut out,
                &format!("| {} | {:.2} |", r.key.fields().join(" | "), r.value(metric)),
            );
        }
        out.push('\n');
    }

    block(&mut out, "## Anomalies");
    if anomalies.records.is_empty() {
        block(&mut out, NO_ANOMALIES);
    } else {
        let mut recent: Vec<_> = anomalies.records.iter().collect();
        // Stable, so rows within a period keep their (metric, key) order.
        recent.sort_by(|a, b| b.period.cmp(&a.period));
        recent.truncate(recent_anomalies);

        let mut columns = vec!["period"];
        columns.extend_from_slice(anomalies.geo_level.columns());
        columns.extend(["metric", "zscore", "direction"]);
        table_header(&mut out, &columns);
        for a in recent {
            line(
                &mut out,
                &format!(
                    "| {} | {} | {} | {:.2} | {} |",
                    a.period,
                    a.key.fields().join(" | "),
                    a.metric,
                    a.zscore,
                    a.direction
                ),
            );
        }
        out.push('\n');
    }

    block(&mut out, "## Recommendations (state/district playbook)");
    for text in PLAYBOOK {
        line(&mut out, text);
    }

    out
}

#[cfg(test)]
mod tests {
    use asie_panel_models::{
        AnomalyRecord, Direction, Frequency, GeoLevel, GeographyKey, MetricsRecord, Period,
    };
    use chrono::NaiveDate;

    use super::*;

    fn period(month: u32) -> Period {
        Period::from_start(NaiveDate::from_ymd_opt(2025, month, 1).unwrap())
    }

    fn key(state: &str) -> GeographyKey {
        GeographyKey::new(GeoLevel::State, vec![state.to_string()]).unwrap()
    }

    fn row(month: u32, state: &str, dii: f64) -> MetricsRecord {
        MetricsRecord {
            period: period(month),
            key: key(state),
            age_0_5: 0,
            age_5_17: 0,
            age_18_greater: 0,
            enrol_total: 0,
            demo_age_5_17: 0,
            demo_age_17_plus: 0,
            demo_total: 0,
            bio_age_5_17: 0,
            bio_age_17_plus: 0,
            bio_total: 0,
            demo_to_enrol: 0.0,
            bio_to_enrol: 0.0,
            youth_enrol_share: 0.0,
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

    fn metrics(records: Vec<MetricsRecord>) -> MetricsTable {
        MetricsTable {
            geo_level: GeoLevel::State,
            frequency: Frequency::Monthly,
            records,
        }
    }

    fn no_anomalies() -> AnomalyTable {
        AnomalyTable {
            geo_level: GeoLevel::State,
            frequency: Frequency::Monthly,
            records: Vec::new(),
        }
    }

    #[test]
    fn top_rows_use_latest_period_only() {
        let table = metrics(vec![
            row(1, "Old", 99.0),
            row(2, "A", 10.0),
            row(2, "B", 30.0),
            row(2, "C", 30.0),
        ]);
        let top: Vec<&str> = top_rows(&table, Metric::DigitalInclusionIndex, 2)
            .iter()
            .map(|r| r.key.state())
            .collect();
        assert_eq!(top, ["B", "C"]);
    }

    #[test]
    fn report_without_anomalies() {
        let table = metrics(vec![row(3, "A", 12.5)]);
        let md = render(&table, &no_anomalies(), 5, 20);

        assert!(md.starts_with(TITLE));
        assert!(md.contains("Latest period: **2025-03**"));
        assert!(md.contains("| state | digital_inclusion_index |"));
        assert!(md.contains("| A | 12.50 |"));
        assert!(md.contains(NO_ANOMALIES));
        assert_eq!(md.matches("- **").count(), PLAYBOOK.len());
    }

    #[test]
    fn lists_most_recent_anomalies_first() {
        let table = metrics(vec![row(1, "A", 1.0), row(2, "A", 2.0)]);
        let anomalies = AnomalyTable {
            records: (1..=3)
                .map(|m| AnomalyRecord {
                    period: period(m),
                    key: key("A"),
                    metric: Metric::TxLoad,
                    zscore: 2.5,
                    direction: Direction::Spike,
                })
                .collect(),
            ..no_anomalies()
        };
        let md = render(&table, &anomalies, 5, 2);

        assert!(md.contains("| period | state | metric | zscore | direction |"));
        assert!(md.contains("| 2025-03-01 | A | tx_load | 2.50 | spike |"));
        assert!(md.contains("| 2025-02-01 | A |"));
        assert!(!md.contains("| 2025-01-01 | A |"));
        let third = md.find("2025-03-01").unwrap();
        let second = md.find("2025-02-01").unwrap();
        assert!(third < second);
    }

    #[test]
    fn sections_are_separated_by_blank_lines() {
        let md = render(&metrics(vec![row(3, "A", 12.5)]), &no_anomalies(), 5, 20);

        assert!(md.starts_with(&format!("{TITLE}\n\nGeo level: **state**")));
        assert!(md.contains(
            "### Top Digital Inclusion Index\n\n| state | digital_inclusion_index |\n|---|---|\n| A | 12.50 |\n\n"
        ));
        assert!(md.contains(&format!("## Anomalies\n\n{NO_ANOMALIES}\n\n## Recommendations")));
        assert!(md.ends_with(&format!("{}\n", PLAYBOOK[4])));
    }

    #[test]
    fn empty_panel_renders() {
        let md = render(&metrics(Vec::new()), &no_anomalies(), 5, 20);
        assert!(md.contains("Latest period: **n/a**"));
        assert_eq!(md.matches("No data.").count(), 5);
    }
}
