use chrono::{DateTime, TimeZone};
use podflux_parser::{HubParser, HubSnapshot, IntervalSpec};
use tracing::{info, warn};

use crate::error::Result;
use crate::gap_filler::handle_missing_intervals;
use crate::replacement::replacement_data;
use crate::series::TimeSeries;

/// Merges the hub snapshots of one reporting day into a gap-free series for `date`.
/// No snapshots, or only invalid (empty) ones, yields replacement data.
pub fn aggregate_hub_files<Z: TimeZone>(
    parser: &HubParser,
    snapshots: &[HubSnapshot],
    date: &DateTime<Z>,
    interval: &IntervalSpec,
) -> Result<TimeSeries> {
    let usable = snapshots.iter().filter(|s| !s.is_empty()).count();
    if usable == 0 {
        warn!(
            files = snapshots.len(),
            "no usable hub snapshots, using replacement data"
        );
        return Ok(replacement_data(date, interval));
    }

    info!(usable, files = snapshots.len(), "aggregating hub snapshots");
    let deltas = parser.resample(snapshots, interval)?;
    Ok(handle_missing_intervals(&deltas, date, interval))
}
