//! Local calendar boundaries for reports.
//!
//! Timestamps are stored in UTC but reports count days and weeks in a fixed
//! local offset. These helpers convert between the two without reading the
//! wall clock.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

/// Report display format for timestamps.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fixed_offset(offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Start of the local day and of the local week (Monday) containing `now`,
/// both expressed in UTC.
pub fn local_day_boundary(now: DateTime<Utc>, offset_hours: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = fixed_offset(offset_hours);
    let local_day = now.with_timezone(&offset).date_naive();
    let week_day = local_day - Duration::days(i64::from(local_day.weekday().num_days_from_monday()));

    let to_utc = |day: NaiveDate| {
        (day.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(offset.local_minus_utc())))
            .and_utc()
    };

    (to_utc(local_day), to_utc(week_day))
}

/// Render a UTC timestamp in the local offset.
pub fn format_local(ts: DateTime<Utc>, offset_hours: i32) -> String {
    ts.with_timezone(&fixed_offset(offset_hours))
        .format(DISPLAY_FORMAT)
        .to_string()
}
