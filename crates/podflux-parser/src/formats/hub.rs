use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::ParserError;
use crate::interval::IntervalSpec;
use crate::model::{DeltaSeries, HubReading, HubSnapshot};

use super::common::{
    aggregate_by_timestamp, clamped_delta, delimiter_byte, fill_gaps, parse_optional_f64,
    Aggregation,
};

/// Layout of a hub export: one file per reporting window, one row per minute, timestamp in
/// the first column (already UTC) followed by one cumulative reading per string/inverter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HubFormat {
    pub delimiter: char,
    pub has_header: bool,
    pub timestamp_format: String,
    pub expected_rows: usize,
    /// Snapshot rows are stamped at the end of their minute; this moves them to its start.
    pub shift_minutes: i64,
}

impl Default for HubFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            expected_rows: 5,
            shift_minutes: 1,
        }
    }
}

pub struct HubParser {
    pub format: HubFormat,
}

impl HubParser {
    pub const NAME: &'static str = "HUB";

    pub fn new(format: HubFormat) -> Self {
        Self { format }
    }

    /// Parses one hub snapshot. A file with a row count other than the configured window
    /// length (an empty file included) is not an error; it yields an empty snapshot.
    pub fn parse(&self, raw_text: &str) -> Result<HubSnapshot, ParserError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter_byte(Self::NAME, self.format.delimiter)?)
            .has_headers(self.format.has_header)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(raw_text.as_bytes());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            records.push(record);
        }

        if records.len() != self.format.expected_rows {
            let err = if records.is_empty() {
                ParserError::Empty { parser: Self::NAME }
            } else {
                ParserError::RowCount {
                    parser: Self::NAME,
                    expected: self.format.expected_rows,
                    found: records.len(),
                }
            };
            warn!(error = %err, "hub snapshot ignored");
            return Ok(HubSnapshot::default());
        }

        let mut readings = Vec::with_capacity(records.len());
        for (line_index, record) in records.iter().enumerate() {
            let raw_ts = record.get(0).unwrap_or_default();
            let timestamp = NaiveDateTime::parse_from_str(raw_ts, &self.format.timestamp_format)
                .map_err(|_| ParserError::Timestamp {
                    parser: Self::NAME,
                    line_index,
                    value: raw_ts.to_string(),
                })?
                .and_utc();

            let mut cumulative = 0.0;
            for (column, cell) in record.iter().enumerate().skip(1) {
                let column_name = format!("column {column}");
                if let Some(value) = parse_optional_f64(Self::NAME, cell, line_index, &column_name)? {
                    cumulative += value;
                }
            }

            readings.push(HubReading {
                timestamp,
                cumulative,
            });
        }

        Ok(HubSnapshot { readings })
    }

    /// Merges the snapshots of one reporting day into per-interval deltas.
    ///
    /// Readings are moved back by the configured shift, bucketed onto the interval grid
    /// keeping the highest cumulative reading per bucket, missing buckets are filled from
    /// their neighbours and consecutive buckets are differenced. The first bucket has no
    /// predecessor and so carries no delta.
    pub fn resample(
        &self,
        snapshots: &[HubSnapshot],
        interval: &IntervalSpec,
    ) -> Result<DeltaSeries, ParserError> {
        let shift = Duration::minutes(self.format.shift_minutes);
        let samples: Vec<(DateTime<Utc>, f64)> = snapshots
            .iter()
            .flat_map(|snapshot| snapshot.readings.iter())
            .map(|reading| {
                (
                    interval.floor_utc(reading.timestamp - shift),
                    reading.cumulative,
                )
            })
            .collect();

        if samples.is_empty() {
            return Ok(DeltaSeries::empty());
        }

        let buckets = aggregate_by_timestamp(Self::NAME, samples, Aggregation::Max)?;
        let observed: BTreeMap<DateTime<Utc>, f64> = buckets.into_iter().collect();

        let (Some(first), Some(last)) = (
            observed.keys().next().copied(),
            observed.keys().next_back().copied(),
        ) else {
            return Ok(DeltaSeries::empty());
        };

        let mut grid = Vec::new();
        let mut cursor = first;
        while cursor <= last {
            grid.push(cursor);
            cursor += interval.width();
        }

        let mut values: Vec<Option<f64>> = grid.iter().map(|ts| observed.get(ts).copied()).collect();
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            debug!(missing, "filling hub buckets without readings");
        }
        fill_gaps(&mut values);

        let mut deltas = BTreeMap::new();
        for (idx, window) in values.windows(2).enumerate() {
            if let [Some(previous), Some(current)] = window {
                deltas.insert(grid[idx + 1], clamped_delta(*previous, *current));
            }
        }

        Ok(DeltaSeries::observed(deltas))
    }
}
