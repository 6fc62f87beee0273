use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::ParserError;
use crate::formats::{DataloggerFormat, DataloggerParser, HubFormat, HubParser};
use crate::interval::{IntervalSpec, DEFAULT_TIMEZONE};
use crate::model::{HubReading, HubSnapshot, SeriesOrigin};

fn fixture(path: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let full_path = base.join("tests/data").join(path);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {}", full_path.display(), err))
}

fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
    DEFAULT_TIMEZONE
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("unambiguous local time")
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("rfc3339 timestamp")
        .with_timezone(&Utc)
}

fn datalogger() -> DataloggerParser {
    DataloggerParser::new(DataloggerFormat::default(), IntervalSpec::default())
}

fn hub() -> HubParser {
    HubParser::new(HubFormat::default())
}

#[test]
fn datalogger_merges_devices_into_site_deltas() {
    let content = fixture("datalogger_two_devices.csv");
    let date = local(2023, 1, 28, 12, 25);

    let parsed = datalogger().parse(&content, &date).expect("datalogger parse failed");

    assert_eq!(parsed.origin, SeriesOrigin::Observed);
    assert_eq!(parsed.len(), 4);
    assert_eq!(parsed.get(&utc("2023-01-28T11:00:00Z")), Some(0.0));
    assert_eq!(parsed.get(&utc("2023-01-28T11:05:00Z")), Some(12.0));
    assert_eq!(parsed.get(&utc("2023-01-28T11:10:00Z")), Some(3.0));
    // INV2 resets to zero on shutdown; the site total drops and the delta clamps.
    assert_eq!(parsed.get(&utc("2023-01-28T11:15:00Z")), Some(0.0));
    assert!((parsed.total() - 15.0).abs() < 1e-9);
}

#[test]
fn datalogger_two_device_step_sums_counters() {
    let content = "\
#Time;Device;E-Day
2024-06-01 10:00:00;INV1;10
2024-06-01 10:05:00;INV1;15
#Time;Device;E-Day
2024-06-01 10:00:00;INV2;20
2024-06-01 10:05:00;INV2;27
";
    let parsed = datalogger()
        .parse(content, &local(2024, 6, 1, 10, 5))
        .expect("parse");

    assert_eq!(parsed.get(&utc("2024-06-01T08:05:00Z")), Some(12.0));
    assert_eq!(parsed.get(&utc("2024-06-01T08:00:00Z")), Some(0.0));
}

#[test]
fn datalogger_without_energy_column_yields_placeholder() {
    let content = fixture("datalogger_missing_energy.csv");
    let date = local(2023, 1, 28, 12, 25);

    let parsed = datalogger().parse(&content, &date).expect("resilient parse");

    assert_eq!(parsed.origin, SeriesOrigin::Placeholder);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.get(&utc("2023-01-27T23:00:00Z")), Some(0.0));
}

#[test]
fn datalogger_empty_file_yields_midnight_placeholder() {
    let content = fixture("datalogger_empty.csv");
    let date = local(2023, 1, 28, 12, 25);

    let parsed = datalogger().parse(&content, &date).expect("empty parse");

    assert!(parsed.is_placeholder());
    let (first, value) = parsed.deltas.iter().next().expect("one row");
    assert_eq!(*first, utc("2023-01-27T23:00:00Z"));
    assert_eq!(*value, 0.0);
}

#[test]
fn datalogger_skips_orphan_rows_and_bad_values() {
    let content = "\
2024-06-01 09:55:00;INV0;99
#INV1 ESN:1
#Time;Device;E-Day
2024-06-01 10:00:00;INV1;1.5
not a time;INV1;2.0
2024-06-01 10:05:00;INV1;offline
2024/06/01 10:10:00;INV1;2.25
";
    let parsed = datalogger()
        .parse(content, &local(2024, 6, 1, 10, 10))
        .expect("parse");

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.get(&utc("2024-06-01T08:00:00Z")), Some(0.0));
    assert_eq!(parsed.get(&utc("2024-06-01T08:10:00Z")), Some(0.75));
}

#[test]
fn datalogger_rounds_deltas_to_three_decimals() {
    let content = "\
#Time;E-Day
2024-06-01 10:00:00;1.0001
2024-06-01 10:05:00;1.1235
";
    let parsed = datalogger()
        .parse(content, &local(2024, 6, 1, 10, 5))
        .expect("parse");

    assert_eq!(parsed.get(&utc("2024-06-01T08:05:00Z")), Some(0.123));
}

#[test]
fn datalogger_rounds_exact_ties_to_even() {
    let content = "\
#Time;E-Day
2024-06-01 10:00:00;1
2024-06-01 10:05:00;1.0625
2024-06-01 10:10:00;1.25
";
    let parsed = datalogger()
        .parse(content, &local(2024, 6, 1, 10, 10))
        .expect("parse");

    assert_eq!(parsed.get(&utc("2024-06-01T08:05:00Z")), Some(0.062));
    assert_eq!(parsed.get(&utc("2024-06-01T08:10:00Z")), Some(0.188));
}

#[test]
fn datalogger_infers_autumn_fold_from_row_order() {
    let content = "\
#Time;E-Day
2024-10-27 02:00:00;1
2024-10-27 02:30:00;2
2024-10-27 02:00:00;3
2024-10-27 02:30:00;4
2024-10-27 03:00:00;5
";
    let parsed = datalogger()
        .parse(content, &local(2024, 10, 27, 3, 0))
        .expect("parse");

    let index: Vec<String> = parsed.deltas.keys().map(|ts| ts.to_rfc3339()).collect();
    assert_eq!(
        index,
        vec![
            "2024-10-27T00:00:00+00:00",
            "2024-10-27T00:30:00+00:00",
            "2024-10-27T01:00:00+00:00",
            "2024-10-27T01:30:00+00:00",
            "2024-10-27T02:00:00+00:00",
        ]
    );
    assert!((parsed.total() - 4.0).abs() < 1e-9);
}

#[test]
fn datalogger_drops_spring_gap_rows() {
    let content = "\
#Time;E-Day
2024-03-31 01:55:00;1
2024-03-31 02:30:00;2
2024-03-31 03:00:00;3
";
    let parsed = datalogger()
        .parse(content, &local(2024, 3, 31, 3, 0))
        .expect("parse");

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.get(&utc("2024-03-31T01:00:00Z")), Some(2.0));
}

#[test]
fn datalogger_honours_custom_columns() {
    let format = DataloggerFormat {
        delimiter: ',',
        header_marker: "Timestamp".to_string(),
        timestamp_column: "Timestamp".to_string(),
        energy_column: "DailyYield".to_string(),
        ..DataloggerFormat::default()
    };
    let parser = DataloggerParser::new(format, IntervalSpec::default());
    let content = "\
Timestamp,DailyYield
2024-06-01 10:00:00,4
2024-06-01 10:05:00,6.5
";
    let parsed = parser.parse(content, &local(2024, 6, 1, 10, 5)).expect("parse");

    assert_eq!(parsed.get(&utc("2024-06-01T08:05:00Z")), Some(2.5));
}

#[test]
fn hub_snapshot_sums_reading_columns() {
    let snapshot = hub().parse(&fixture("hub_window.csv")).expect("hub parse");

    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot.readings[0].timestamp, utc("2024-03-03T10:01:00Z"));
    assert!((snapshot.readings[0].cumulative - 350.0).abs() < 1e-9);
    // the empty third cell contributes nothing
    assert!((snapshot.readings[3].cumulative - 302.25).abs() < 1e-9);
}

#[test]
fn hub_snapshot_with_wrong_row_count_is_empty() {
    let snapshot = hub().parse(&fixture("hub_short.csv")).expect("hub parse");
    assert!(snapshot.is_empty());

    let snapshot = hub().parse("").expect("empty hub parse");
    assert!(snapshot.is_empty());
}

#[test]
fn hub_snapshot_rejects_non_numeric_readings() {
    let err = hub()
        .parse(&fixture("hub_malformed.csv"))
        .expect_err("malformed snapshot should fail");
    assert!(matches!(err, ParserError::DataRow { line_index: 1, .. }));
}

#[test]
fn hub_resample_differences_bucket_maxima() {
    let parser = hub();
    let first = parser.parse(&fixture("hub_window.csv")).expect("first window");
    let second = parser.parse(&fixture("hub_window_next.csv")).expect("second window");

    let series = parser
        .resample(&[second, first], &IntervalSpec::default())
        .expect("resample");

    assert_eq!(series.len(), 1);
    assert_eq!(series.get(&utc("2024-03-03T10:05:00Z")), Some(4.25));
}

#[test]
fn hub_resample_fills_missing_buckets_and_clamps_resets() {
    let reading = |ts: &str, cumulative: f64| HubReading {
        timestamp: utc(ts),
        cumulative,
    };
    let snapshots = vec![
        HubSnapshot {
            readings: vec![reading("2024-03-03T10:05:00Z", 10.0)],
        },
        HubSnapshot {
            readings: vec![reading("2024-03-03T10:20:00Z", 12.5)],
        },
        HubSnapshot {
            readings: vec![reading("2024-03-03T10:25:00Z", 1.0)],
        },
    ];

    let series = hub()
        .resample(&snapshots, &IntervalSpec::new(DEFAULT_TIMEZONE, 5))
        .expect("resample");

    assert_eq!(series.get(&utc("2024-03-03T10:00:00Z")), None);
    assert_eq!(series.get(&utc("2024-03-03T10:05:00Z")), Some(0.0));
    assert_eq!(series.get(&utc("2024-03-03T10:10:00Z")), Some(0.0));
    assert_eq!(series.get(&utc("2024-03-03T10:15:00Z")), Some(2.5));
    assert_eq!(series.get(&utc("2024-03-03T10:20:00Z")), Some(0.0));
}

#[test]
fn hub_resample_of_nothing_is_empty() {
    let series = hub()
        .resample(&[], &IntervalSpec::default())
        .expect("resample");
    assert!(series.is_empty());
}
