use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Europe::Budapest;
use podflux_core::aggregate::aggregate_hub_files;
use podflux_core::replacement::replacement_data;
use podflux_core::series::DataValidity;
use podflux_core::IntervalSpec;
use podflux_parser::{HubFormat, HubParser, HubReading, HubSnapshot};

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("rfc3339")
        .with_timezone(&Utc)
}

fn window(first_minute: &str, start: f64) -> HubSnapshot {
    let first = utc(first_minute);
    HubSnapshot {
        readings: (0..5)
            .map(|i| HubReading {
                timestamp: first + Duration::minutes(i),
                cumulative: start + i as f64,
            })
            .collect(),
    }
}

#[test]
fn consecutive_windows_become_one_verified_delta() {
    let spec = IntervalSpec::default();
    let parser = HubParser::new(HubFormat::default());
    let date = Budapest.with_ymd_and_hms(2024, 3, 3, 11, 5, 0).unwrap();
    let snapshots = vec![
        window("2024-03-03T10:01:00Z", 100.0),
        window("2024-03-03T10:06:00Z", 105.0),
    ];

    let series = aggregate_hub_files(&parser, &snapshots, &date, &spec).expect("aggregate");

    assert_eq!(series.len(), 134);
    let row = series.get(&utc("2024-03-03T10:05:00Z")).expect("row");
    assert_eq!(row.quantity, 5.0);
    assert_eq!(row.status, DataValidity::Verified);
    // the first bucket has nothing to difference against
    let row = series.get(&utc("2024-03-03T10:00:00Z")).expect("row");
    assert_eq!(row.status, DataValidity::Fallback);
    assert_eq!(series.count(DataValidity::Verified), 1);
}

#[test]
fn no_snapshots_yield_replacement() {
    let spec = IntervalSpec::default();
    let parser = HubParser::new(HubFormat::default());
    let date = Budapest.with_ymd_and_hms(2024, 3, 3, 11, 5, 0).unwrap();

    let series = aggregate_hub_files(&parser, &[], &date, &spec).expect("aggregate");
    assert_eq!(series, replacement_data(&date, &spec));

    let invalid = vec![HubSnapshot::default(), HubSnapshot::default()];
    let series = aggregate_hub_files(&parser, &invalid, &date, &spec).expect("aggregate");
    assert_eq!(series, replacement_data(&date, &spec));
}

#[test]
fn short_snapshot_text_falls_back_to_replacement() {
    let spec = IntervalSpec::default();
    let parser = HubParser::new(HubFormat::default());
    let date = Budapest.with_ymd_and_hms(2024, 3, 3, 11, 5, 0).unwrap();
    let short = parser
        .parse("timestamp,a\n2024-03-03 10:01:00,1.0\n2024-03-03 10:02:00,1.5\n")
        .expect("short snapshot parses to empty");

    let series = aggregate_hub_files(&parser, &[short], &date, &spec).expect("aggregate");
    assert_eq!(series.count(DataValidity::Verified), 0);
    assert_eq!(series.len(), replacement_data(&date, &spec).len());
}
