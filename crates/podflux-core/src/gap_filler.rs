use chrono::{DateTime, TimeZone};
use podflux_parser::{DeltaSeries, IntervalSpec, SeriesOrigin};
use tracing::debug;

use crate::replacement::replacement_data;
use crate::series::{DataValidity, SeriesRow, TimeSeries};

/// Lays `series` over the full-day fallback scaffold for `date`.
///
/// Scaffold intervals with a matching delta become verified rows carrying that delta (a
/// verified zero stays verified). Intervals without one keep quantity 0 and fallback status.
/// Rows of a placeholder series never count as verified. Deltas outside the scaffold are
/// dropped.
pub fn handle_missing_intervals<Z: TimeZone>(
    series: &DeltaSeries,
    date: &DateTime<Z>,
    interval: &IntervalSpec,
) -> TimeSeries {
    let scaffold = replacement_data(date, interval);

    let matched_status = match series.origin {
        SeriesOrigin::Observed => DataValidity::Verified,
        SeriesOrigin::Placeholder => DataValidity::Fallback,
    };

    let outside = series
        .deltas
        .keys()
        .filter(|ts| scaffold.get(ts).is_none())
        .count();
    if outside > 0 {
        debug!(outside, "dropping deltas outside the reporting day");
    }

    let filled: TimeSeries = scaffold
        .iter()
        .map(|(ts, shell)| match series.get(ts) {
            Some(quantity) => (
                *ts,
                SeriesRow {
                    quantity,
                    status: matched_status,
                },
            ),
            None => (*ts, *shell),
        })
        .collect();

    debug!(
        rows = filled.len(),
        verified = filled.count(DataValidity::Verified),
        "gap fill complete"
    );
    filled
}
