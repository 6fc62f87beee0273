use std::collections::HashSet;

use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use polars::prelude::*;

use crate::errors::ParserError;
use crate::interval::IntervalSpec;
use crate::model::round_kwh;

pub(crate) const TIMESTAMP_COLUMN: &str = "startDate";
pub(crate) const QUANTITY_COLUMN: &str = "quantity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Aggregation {
    Sum,
    Max,
}

pub(crate) fn delimiter_byte(parser: &'static str, delimiter: char) -> Result<u8, ParserError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| ParserError::DataRow {
            parser,
            line_index: 0,
            message: format!("delimiter '{delimiter}' is not a single ASCII character"),
        })
}

pub(crate) fn parse_naive_timestamp(value: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

pub(crate) fn parse_optional_f64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
        Ok(_) => Ok(None),
        Err(err) => Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as float: {err}"),
        }),
    }
}

/// Resolves wall-clock timestamps of one device table to UTC, inferring the side of an
/// autumn fold from row order: the first pass through the repeated hour is summer time,
/// a repeat (or a step backwards) inside the fold switches to standard time.
pub(crate) struct FoldResolver<'a> {
    interval: &'a IntervalSpec,
    seen: HashSet<NaiveDateTime>,
    last: Option<NaiveDateTime>,
    second_pass: bool,
}

impl<'a> FoldResolver<'a> {
    pub fn new(interval: &'a IntervalSpec) -> Self {
        Self {
            interval,
            seen: HashSet::new(),
            last: None,
            second_pass: false,
        }
    }

    pub fn resolve(&mut self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let resolved = match self.interval.timezone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => {
                self.second_pass = false;
                Some(dt)
            }
            LocalResult::Ambiguous(earliest, latest) => {
                let went_back = self.last.is_some_and(|prev| naive <= prev);
                if !self.seen.insert(naive) || went_back {
                    self.second_pass = true;
                }
                Some(if self.second_pass { latest } else { earliest })
            }
            LocalResult::None => None,
        };
        self.last = Some(naive);
        resolved.map(|dt| dt.with_timezone(&Utc))
    }
}

/// Collapses duplicate timestamps with the given aggregation and returns the result in
/// ascending timestamp order.
pub(crate) fn aggregate_by_timestamp(
    parser: &'static str,
    samples: Vec<(DateTime<Utc>, f64)>,
    aggregation: Aggregation,
) -> Result<Vec<(DateTime<Utc>, f64)>, ParserError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let to_parser_error = |source: PolarsError| ParserError::Polars { parser, source };

    let (timestamps, quantities): (Vec<i64>, Vec<f64>) = samples
        .iter()
        .map(|(ts, value)| (ts.timestamp_micros(), *value))
        .unzip();

    let frame = df![
        TIMESTAMP_COLUMN => timestamps,
        QUANTITY_COLUMN => quantities,
    ]
    .map_err(to_parser_error)?;

    let aggregate = match aggregation {
        Aggregation::Sum => col(QUANTITY_COLUMN).sum(),
        Aggregation::Max => col(QUANTITY_COLUMN).max(),
    };

    let grouped = frame
        .lazy()
        .group_by([col(TIMESTAMP_COLUMN)])
        .agg([aggregate.alias(QUANTITY_COLUMN)])
        .sort([TIMESTAMP_COLUMN], SortMultipleOptions::default())
        .collect()
        .map_err(to_parser_error)?;

    let keys = grouped
        .column(TIMESTAMP_COLUMN)
        .and_then(|column| column.i64())
        .map_err(to_parser_error)?;
    let values = grouped
        .column(QUANTITY_COLUMN)
        .and_then(|column| column.f64())
        .map_err(to_parser_error)?;

    let mut rows = Vec::with_capacity(grouped.height());
    for (key, value) in keys.into_iter().zip(values.into_iter()) {
        let (Some(micros), Some(value)) = (key, value) else {
            continue;
        };
        if let Some(ts) = DateTime::<Utc>::from_timestamp_micros(micros) {
            rows.push((ts, value));
        }
    }
    Ok(rows)
}

/// Successive differences of a cumulative counter. Negative steps (counter resets) clamp
/// to zero and every delta is rounded to three decimals.
pub(crate) fn clamped_delta(previous: f64, current: f64) -> f64 {
    round_kwh((current - previous).max(0.0))
}

/// Forward-fills gaps from the preceding value, then back-fills any leading gap from the
/// first known value.
pub(crate) fn fill_gaps(values: &mut [Option<f64>]) {
    let mut carry = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => carry = Some(*v),
            None => *value = carry,
        }
    }

    let mut carry = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(v) => carry = Some(*v),
            None => *value = carry,
        }
    }
}
