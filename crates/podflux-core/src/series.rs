use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data-validity flag carried by every published row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataValidity {
    /// Backed by a reading actually observed for the interval.
    #[serde(rename = "w")]
    Verified,
    /// Synthetic, gap-filled or estimated.
    #[serde(rename = "f")]
    Fallback,
}

impl DataValidity {
    pub fn code(&self) -> &'static str {
        match self {
            DataValidity::Verified => "w",
            DataValidity::Fallback => "f",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "w" => Some(DataValidity::Verified),
            "f" => Some(DataValidity::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for DataValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesRow {
    pub quantity: f64,
    pub status: DataValidity,
}

impl SeriesRow {
    pub fn verified(quantity: f64) -> Self {
        Self {
            quantity,
            status: DataValidity::Verified,
        }
    }

    pub fn fallback() -> Self {
        Self {
            quantity: 0.0,
            status: DataValidity::Fallback,
        }
    }
}

/// Per-interval production of one POD, keyed by interval start in UTC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    rows: BTreeMap<DateTime<Utc>, SeriesRow>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ts: DateTime<Utc>, row: SeriesRow) -> Option<SeriesRow> {
        self.rows.insert(ts, row)
    }

    pub fn get(&self, ts: &DateTime<Utc>) -> Option<&SeriesRow> {
        self.rows.get(ts)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &SeriesRow)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> Vec<DateTime<Utc>> {
        self.rows.keys().copied().collect()
    }

    pub fn first(&self) -> Option<(&DateTime<Utc>, &SeriesRow)> {
        self.rows.iter().next()
    }

    pub fn last(&self) -> Option<(&DateTime<Utc>, &SeriesRow)> {
        self.rows.iter().next_back()
    }

    pub fn total(&self) -> f64 {
        self.rows.values().map(|row| row.quantity).sum()
    }

    pub fn count(&self, status: DataValidity) -> usize {
        self.rows.values().filter(|row| row.status == status).count()
    }
}

impl FromIterator<(DateTime<Utc>, SeriesRow)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, SeriesRow)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
