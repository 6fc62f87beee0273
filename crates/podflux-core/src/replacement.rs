use chrono::{DateTime, NaiveDateTime, TimeZone};
use podflux_parser::IntervalSpec;

use crate::series::{SeriesRow, TimeSeries};

/// All-zero fallback series covering every interval from local midnight of `date`'s day up
/// to and including `date`.
pub fn replacement_data<Z: TimeZone>(date: &DateTime<Z>, interval: &IntervalSpec) -> TimeSeries {
    interval
        .day_grid(date)
        .into_iter()
        .map(|ts| (ts, SeriesRow::fallback()))
        .collect()
}

/// Same as [`replacement_data`] for a wall-clock `date` already in the configured zone.
/// Returns `None` when the wall-clock time does not exist there (spring gap).
pub fn replacement_data_naive(date: NaiveDateTime, interval: &IntervalSpec) -> Option<TimeSeries> {
    interval
        .localize(date)
        .map(|local| replacement_data(&local, interval))
}
