use chrono::offset::LocalResult;
use chrono::{
    DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::Deserialize;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Budapest;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// Reporting grid: the civil time zone the sites report in and the interval width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntervalSpec {
    pub timezone: Tz,
    pub minutes: u32,
}

impl Default for IntervalSpec {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

impl IntervalSpec {
    pub fn new(timezone: Tz, minutes: u32) -> Self {
        Self { timezone, minutes }
    }

    pub fn width(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }

    /// Attaches the configured zone to a wall-clock time. A time inside the autumn fold
    /// resolves to the earlier (summer time) instant; a time inside the spring gap does not
    /// exist and yields `None`.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
        match self.timezone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        }
    }

    /// Start of the civil day containing `date`, expressed in UTC.
    pub fn local_midnight<Z: TimeZone>(&self, date: &DateTime<Z>) -> DateTime<Utc> {
        let day = date.with_timezone(&self.timezone).date_naive();
        self.day_start(day)
    }

    pub fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        let mut wall = day.and_time(NaiveTime::MIN);
        // Zones that skip midnight start the day at the first existing wall-clock minute.
        for _ in 0..=180 {
            if let Some(dt) = self.timezone.from_local_datetime(&wall).earliest() {
                return dt.with_timezone(&Utc);
            }
            wall += Duration::minutes(1);
        }
        day.and_time(NaiveTime::MIN).and_utc()
    }

    /// Floors the local wall-clock time of `date` to the interval width, keeping the UTC
    /// offset `date` carries.
    pub fn floor_local<Z: TimeZone>(&self, date: &DateTime<Z>) -> DateTime<Tz> {
        let local = date.with_timezone(&self.timezone);
        let offset = local.offset().fix();
        let naive = local.naive_local();
        let minute = naive.minute() - naive.minute() % self.minutes.max(1);
        let floored = naive
            .date()
            .and_hms_opt(naive.hour(), minute, 0)
            .unwrap_or(naive);
        match offset.from_local_datetime(&floored) {
            LocalResult::Single(dt) => dt.with_timezone(&self.timezone),
            _ => local,
        }
    }

    /// Floors an instant onto the epoch-aligned interval grid.
    pub fn floor_utc(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = i64::from(self.minutes.max(1)) * 60;
        let secs = ts.timestamp().div_euclid(width) * width;
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(ts)
    }

    /// Local calendar date of the interval `date` belongs to.
    pub fn local_date<Z: TimeZone>(&self, date: &DateTime<Z>) -> NaiveDate {
        date.with_timezone(&self.timezone).date_naive()
    }

    /// Every interval boundary from local midnight of `date`'s day up to and including
    /// `date`, as UTC instants.
    pub fn day_grid<Z: TimeZone>(&self, date: &DateTime<Z>) -> Vec<DateTime<Utc>> {
        let end = date.with_timezone(&Utc);
        let start = self.local_midnight(date);
        let width = self.width();
        let mut grid = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            grid.push(cursor);
            cursor += width;
        }
        grid
    }
}
