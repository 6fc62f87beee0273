// crates/podflux-core/src/schema.rs

use chrono::{DateTime, SecondsFormat, Utc};
use podflux_parser::round_kwh;
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::Result;
use crate::series::{DataValidity, SeriesRow, TimeSeries};

pub const UNIT_TYPE: &str = "kWh";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const INDENT: &[u8] = b"    ";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("row {row}: startDate {value} is not a timezone-aware timestamp")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: quantity {value} must be a finite number >= 0")]
    Quantity { row: usize, value: String },

    #[error("row {row}: status {value} is not one of \"w\", \"f\"")]
    Status { row: usize, value: String },

    #[error("row {row}: missing field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("document header invalid: {0}")]
    Document(String),
}

/// One validated output row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_date: DateTime<Utc>,
    pub quantity: f64,
    pub status: DataValidity,
}

/// The published artifact for one POD and one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionDocument {
    pub unit_type: String,
    pub interval_minutes: u32,
    pub production: Vec<ProductionRow>,
}

fn serialize_timestamp<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Lowers a series to the loosely-typed records the validator checks.
pub fn to_records(series: &TimeSeries) -> Vec<Value> {
    series
        .iter()
        .map(|(ts, row)| {
            json!({
                "startDate": ts.to_rfc3339_opts(SecondsFormat::Micros, true),
                "quantity": row.quantity,
                "status": row.status.code(),
            })
        })
        .collect()
}

/// Validates a single `{startDate, quantity, status}` record.
pub fn validate_record(
    row: usize,
    record: &Value,
) -> std::result::Result<ProductionRow, ValidationError> {
    let start_date = match record.get("startDate") {
        None | Some(Value::Null) => {
            return Err(ValidationError::MissingField {
                row,
                field: "startDate",
            })
        }
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw.trim())
            .map_err(|_| ValidationError::Timestamp {
                row,
                value: format!("'{raw}'"),
            })?
            .with_timezone(&Utc),
        Some(other) => {
            return Err(ValidationError::Timestamp {
                row,
                value: other.to_string(),
            })
        }
    };

    let quantity = match record.get("quantity") {
        None => {
            return Err(ValidationError::MissingField {
                row,
                field: "quantity",
            })
        }
        Some(value) => match value.as_f64().map(|q| (q, round_kwh(q))) {
            // the rounded value is what gets serialized, so it must stay finite too
            Some((q, rounded)) if q >= 0.0 && rounded.is_finite() => rounded,
            _ => {
                return Err(ValidationError::Quantity {
                    row,
                    value: value.to_string(),
                })
            }
        },
    };

    let status = match record.get("status") {
        None | Some(Value::Null) => {
            return Err(ValidationError::MissingField {
                row,
                field: "status",
            })
        }
        Some(value) => value
            .as_str()
            .and_then(DataValidity::from_code)
            .ok_or_else(|| ValidationError::Status {
                row,
                value: value.to_string(),
            })?,
    };

    Ok(ProductionRow {
        start_date,
        quantity,
        status,
    })
}

impl ProductionDocument {
    /// Validates every row of `series`; the first invalid row fails the whole document.
    pub fn from_series(
        series: &TimeSeries,
        interval_minutes: u32,
    ) -> std::result::Result<Self, ValidationError> {
        let production = to_records(series)
            .iter()
            .enumerate()
            .map(|(row, record)| validate_record(row, record))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            unit_type: UNIT_TYPE.to_string(),
            interval_minutes,
            production,
        })
    }

    /// Parses and re-validates a published document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;

        let unit_type = value
            .get("unitType")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::Document("unitType missing".to_string()))?;
        if unit_type != UNIT_TYPE {
            return Err(ValidationError::Document(format!(
                "unitType '{unit_type}' is not '{UNIT_TYPE}'"
            ))
            .into());
        }

        let interval_minutes = value
            .get("intervalMinutes")
            .and_then(Value::as_u64)
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| *m > 0)
            .ok_or_else(|| {
                ValidationError::Document("intervalMinutes must be a positive integer".to_string())
            })?;

        let rows = value
            .get("production")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::Document("production must be a list".to_string()))?;

        let production = rows
            .iter()
            .enumerate()
            .map(|(row, record)| validate_record(row, record))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            unit_type: unit_type.to_string(),
            interval_minutes,
            production,
        })
    }

    pub fn to_series(&self) -> TimeSeries {
        self.production
            .iter()
            .map(|row| {
                (
                    row.start_date,
                    SeriesRow {
                        quantity: row.quantity,
                        status: row.status,
                    },
                )
            })
            .collect()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(INDENT);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        Ok(buffer)
    }
}

/// Validates `series` and renders the published JSON document.
pub fn validate_and_serialize(series: &TimeSeries, interval_minutes: u32) -> Result<Vec<u8>> {
    ProductionDocument::from_series(series, interval_minutes)?.to_json_bytes()
}
