use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::{Error, Result};

/// Storage and display format for timestamps. Fixed width, so it sorts
/// lexicographically in SQLite.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Smallest distinguishable step between two instants. Two spans whose
/// edges are one resolution apart have no instant between them.
pub fn resolution() -> Duration {
    Duration::seconds(1)
}

/// Drop sub-second precision.
pub fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last instant (at [`resolution`]) of `date`.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - resolution()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

/// First instant of the calendar month containing `ts`.
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(first_of_month(ts.date_naive()))
}

/// First instant of the calendar month after the one containing `ts`.
pub fn next_month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let first = first_of_month(ts.date_naive());
    // Day 32 of any month always lands in the following month.
    start_of_day(first_of_month(first + Duration::days(32)))
}

/// Last instant of the calendar month containing `ts`.
pub fn month_end(ts: DateTime<Utc>) -> DateTime<Utc> {
    next_month_start(ts) - resolution()
}

/// Whether two instants fall in the same UTC calendar month.
pub fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(first_of_month(first + Duration::days(32)) - Duration::days(1))
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| Error::Other(format!("invalid timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31)
        );
        assert_eq!(
            last_day_of_month(2025, 2),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        assert_eq!(last_day_of_month(2025, 13), None);
    }

    #[test]
    fn test_month_boundaries() {
        let t = ts(2024, 2, 17, 13, 45, 9);
        assert_eq!(month_start(t), ts(2024, 2, 1, 0, 0, 0));
        assert_eq!(next_month_start(t), ts(2024, 3, 1, 0, 0, 0));
        assert_eq!(month_end(t), ts(2024, 2, 29, 23, 59, 59));

        let dec = ts(2023, 12, 31, 23, 59, 59);
        assert_eq!(next_month_start(dec), ts(2024, 1, 1, 0, 0, 0));
        assert_eq!(month_start(dec), ts(2023, 12, 1, 0, 0, 0));
    }

    #[test]
    fn test_same_month() {
        assert!(same_month(ts(2023, 2, 1, 0, 0, 0), ts(2023, 2, 28, 23, 59, 59)));
        assert!(!same_month(ts(2023, 2, 1, 0, 0, 0), ts(2023, 1, 31, 23, 59, 59)));
        assert!(!same_month(ts(2023, 2, 1, 0, 0, 0), ts(2024, 2, 1, 0, 0, 0)));
    }

    #[test]
    fn test_truncate_drops_subseconds() {
        let t = ts(2023, 5, 5, 5, 5, 5) + Duration::milliseconds(750);
        assert_eq!(truncate(t), ts(2023, 5, 5, 5, 5, 5));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let t = ts(2023, 1, 3, 4, 5, 6);
        assert_eq!(format_ts(t), "2023-01-03T04:05:06Z");
        assert_eq!(parse_ts("2023-01-03T04:05:06Z").unwrap(), t);
        assert_eq!(parse_ts("2023-01-03T05:05:06+01:00").unwrap(), t);
        assert!(parse_ts("yesterday").is_err());
    }
}
