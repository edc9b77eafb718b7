//! Fixed-offset civil calendar helpers.
//!
//! Every timestamp in the system is a naive datetime in a single UTC+8
//! civil calendar. The offset is applied exactly once, here, when reading
//! the wall clock; nothing else in the workspace performs timezone
//! conversion.

use time::format_description::FormatItem;
use time::macros::{format_description, offset};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub const CIVIL_OFFSET: UtcOffset = offset!(+8);

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Current civil datetime, with the offset stripped.
pub fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc().to_offset(CIVIL_OFFSET);
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Midnight opening the given civil day.
pub fn day_start(date: Date) -> PrimitiveDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
}

/// Exclusive end of the given civil day (the next day's midnight).
pub fn day_end(date: Date) -> PrimitiveDateTime {
    day_start(date) + Duration::days(1)
}

/// Parse a `YYYY-MM-DD` date. Returns `None` on malformed input so callers
/// can fall back to today, as the query layer requires.
pub fn parse_date(input: &str) -> Option<Date> {
    Date::parse(input.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .expect("formatting a date into a string is infallible")
}

pub fn format_datetime(ts: PrimitiveDateTime) -> String {
    ts.format(DATETIME_FORMAT)
        .expect("formatting a datetime into a string is infallible")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn parses_and_formats_dates() {
        assert_eq!(parse_date("2024-03-05"), Some(date!(2024-03-05)));
        assert_eq!(parse_date(" 2024-03-05 "), Some(date!(2024-03-05)));
        assert_eq!(parse_date("2024-3-5"), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(format_date(date!(2024-03-05)), "2024-03-05");
    }

    #[test]
    fn day_bounds_cover_exactly_one_day() {
        let start = day_start(date!(2024-03-05));
        let end = day_end(date!(2024-03-05));
        assert_eq!(start, datetime!(2024-03-05 00:00:00));
        assert_eq!(end, datetime!(2024-03-06 00:00:00));
    }

    #[test]
    fn formats_datetimes_without_offset() {
        let ts = datetime!(2024-03-05 09:07:01);
        assert_eq!(format_datetime(ts), "2024-03-05 09:07:01");
    }
}
