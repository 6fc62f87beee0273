use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use podflux_parser::IntervalSpec;

/// Most recently completed interval boundary at `now`: the local wall-clock time floored to
/// the interval width, then moved back one interval.
pub fn last_interval_at<Z: TimeZone>(now: &DateTime<Z>, interval: &IntervalSpec) -> DateTime<Tz> {
    interval.floor_local(now) - interval.width()
}

/// [`last_interval_at`] evaluated against the system clock.
pub fn last_interval_date(interval: &IntervalSpec) -> DateTime<Tz> {
    last_interval_at(&Utc::now(), interval)
}

/// The next wall-clock interval boundary strictly after `now`.
pub fn next_boundary<Z: TimeZone>(now: &DateTime<Z>, interval: &IntervalSpec) -> DateTime<Utc> {
    (interval.floor_local(now) + interval.width()).with_timezone(&Utc)
}
