use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the rows of a parsed series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesOrigin {
    /// Rows derived from readings the device actually reported.
    Observed,
    /// A stand-in row emitted because the input held no usable readings.
    Placeholder,
}

impl SeriesOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesOrigin::Observed => "observed",
            SeriesOrigin::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for SeriesOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-interval energy deltas (kWh) keyed by interval start, in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSeries {
    pub deltas: BTreeMap<DateTime<Utc>, f64>,
    pub origin: SeriesOrigin,
}

impl DeltaSeries {
    pub fn observed(deltas: BTreeMap<DateTime<Utc>, f64>) -> Self {
        Self {
            deltas,
            origin: SeriesOrigin::Observed,
        }
    }

    pub fn placeholder(start: DateTime<Utc>) -> Self {
        let mut deltas = BTreeMap::new();
        deltas.insert(start, 0.0);
        Self {
            deltas,
            origin: SeriesOrigin::Placeholder,
        }
    }

    pub fn empty() -> Self {
        Self::observed(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == SeriesOrigin::Placeholder
    }

    pub fn total(&self) -> f64 {
        self.deltas.values().sum()
    }

    pub fn get(&self, ts: &DateTime<Utc>) -> Option<f64> {
        self.deltas.get(ts).copied()
    }
}

/// One cumulative reading from a hub snapshot: the snapshot-row timestamp and the sum of
/// every reading column on that row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubReading {
    pub timestamp: DateTime<Utc>,
    pub cumulative: f64,
}

/// One hub export file. An invalid file parses to an empty snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubSnapshot {
    pub readings: Vec<HubReading>,
}

impl HubSnapshot {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

/// Rounds a kWh value to the three decimals carried by the published documents. Ties go
/// to the even neighbour.
pub fn round_kwh(value: f64) -> f64 {
    (value * 1000.0).round_ties_even() / 1000.0
}
