use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::ParserError;
use crate::interval::IntervalSpec;
use crate::model::DeltaSeries;

use super::common::{
    aggregate_by_timestamp, clamped_delta, delimiter_byte, parse_naive_timestamp,
    parse_optional_f64, Aggregation, FoldResolver,
};

static DEFAULT_TIMESTAMP_FORMATS: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        "%Y-%m-%d %H:%M:%S".to_string(),
        "%Y/%m/%d %H:%M:%S".to_string(),
    ]
});

/// Layout of a smartlogger export: semicolon separated, one table per inverter, each
/// table introduced by a header row carrying the timestamp marker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataloggerFormat {
    pub delimiter: char,
    pub header_marker: String,
    pub comment_marker: char,
    pub timestamp_column: String,
    pub energy_column: String,
    pub timestamp_formats: Vec<String>,
}

impl Default for DataloggerFormat {
    fn default() -> Self {
        Self {
            delimiter: ';',
            header_marker: "#Time".to_string(),
            comment_marker: '#',
            timestamp_column: "#Time".to_string(),
            energy_column: "E-Day".to_string(),
            timestamp_formats: DEFAULT_TIMESTAMP_FORMATS.clone(),
        }
    }
}

struct DeviceTable {
    header: Option<StringRecord>,
    rows: Vec<(usize, StringRecord)>,
}

pub struct DataloggerParser {
    pub format: DataloggerFormat,
    pub interval: IntervalSpec,
}

impl DataloggerParser {
    pub const NAME: &'static str = "DATALOGGER";

    pub fn new(format: DataloggerFormat, interval: IntervalSpec) -> Self {
        Self { format, interval }
    }

    /// Parses one multi-device export into per-interval site production.
    ///
    /// Device tables are summed per timestamp into a whole-site daily counter, which is then
    /// differenced into per-interval deltas. When no table yields a single usable row the
    /// result is a one-row placeholder at local midnight of `date`.
    pub fn parse<Z: TimeZone>(
        &self,
        raw_text: &str,
        date: &DateTime<Z>,
    ) -> Result<DeltaSeries, ParserError> {
        let tables = self.split_tables(raw_text)?;

        let mut samples: Vec<(DateTime<Utc>, f64)> = Vec::new();
        for (device_index, table) in tables.iter().enumerate() {
            match self.table_samples(table) {
                Ok(rows) => {
                    debug!(device_index, rows = rows.len(), "datalogger device table parsed");
                    samples.extend(rows);
                }
                Err(err) => {
                    warn!(device_index, error = %err, "skipping datalogger device table");
                }
            }
        }

        if samples.is_empty() {
            warn!("datalogger export held no usable rows, emitting placeholder");
            return Ok(DeltaSeries::placeholder(self.interval.local_midnight(date)));
        }

        let site_totals = aggregate_by_timestamp(Self::NAME, samples, Aggregation::Sum)?;

        let mut deltas = BTreeMap::new();
        let mut previous: Option<f64> = None;
        for (ts, total) in site_totals {
            let delta = previous.map_or(0.0, |prev| clamped_delta(prev, total));
            deltas.insert(ts, delta);
            previous = Some(total);
        }

        Ok(DeltaSeries::observed(deltas))
    }

    fn split_tables(&self, raw_text: &str) -> Result<Vec<DeviceTable>, ParserError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter_byte(Self::NAME, self.format.delimiter)?)
            .has_headers(false)
            .flexible(true)
            .from_reader(raw_text.as_bytes());

        let mut tables: Vec<DeviceTable> = Vec::new();
        let mut current = DeviceTable {
            header: None,
            rows: Vec::new(),
        };

        for (line_index, record) in reader.records().enumerate() {
            let record = record.map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?;

            if self.is_header(&record) {
                let finished = std::mem::replace(
                    &mut current,
                    DeviceTable {
                        header: Some(record),
                        rows: Vec::new(),
                    },
                );
                if finished.header.is_some() || !finished.rows.is_empty() {
                    tables.push(finished);
                }
            } else if !self.is_comment(&record) {
                current.rows.push((line_index, record));
            }
        }
        if current.header.is_some() || !current.rows.is_empty() {
            tables.push(current);
        }

        Ok(tables)
    }

    fn is_header(&self, record: &StringRecord) -> bool {
        record
            .iter()
            .any(|cell| cell.contains(self.format.header_marker.as_str()))
    }

    fn is_comment(&self, record: &StringRecord) -> bool {
        record
            .iter()
            .map(str::trim)
            .find(|cell| !cell.is_empty())
            .is_none_or(|cell| cell.starts_with(self.format.comment_marker))
    }

    fn column_index(&self, header: &StringRecord, name: &str) -> Result<usize, ParserError> {
        header
            .iter()
            .position(|cell| cell.trim() == name)
            .ok_or_else(|| ParserError::MissingColumn {
                parser: Self::NAME,
                column: name.to_string(),
            })
    }

    fn table_samples(&self, table: &DeviceTable) -> Result<Vec<(DateTime<Utc>, f64)>, ParserError> {
        let Some(header) = &table.header else {
            return Err(ParserError::MissingColumn {
                parser: Self::NAME,
                column: self.format.timestamp_column.clone(),
            });
        };
        let ts_idx = self.column_index(header, &self.format.timestamp_column)?;
        let energy_idx = self.column_index(header, &self.format.energy_column)?;

        let mut resolver = FoldResolver::new(&self.interval);
        let mut samples = Vec::with_capacity(table.rows.len());

        for (line_index, row) in &table.rows {
            let line_index = *line_index;
            let raw_ts = row.get(ts_idx).unwrap_or_default();
            let Some(naive) = parse_naive_timestamp(raw_ts, &self.format.timestamp_formats) else {
                let err = ParserError::Timestamp {
                    parser: Self::NAME,
                    line_index,
                    value: raw_ts.trim().to_string(),
                };
                warn!(error = %err, "skipping datalogger row");
                continue;
            };

            let energy = match parse_optional_f64(
                Self::NAME,
                row.get(energy_idx).unwrap_or_default(),
                line_index,
                &self.format.energy_column,
            ) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    debug!(line_index, "datalogger row has no energy reading");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "skipping datalogger row");
                    continue;
                }
            };

            match resolver.resolve(naive) {
                Some(ts) => samples.push((ts, energy)),
                None => warn!(
                    line_index,
                    timestamp = %naive,
                    "datalogger timestamp does not exist in the site time zone, skipping row"
                ),
            }
        }

        Ok(samples)
    }
}
