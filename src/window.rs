use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;

use crate::date_util::{end_of_day, last_day_of_month, start_of_day, truncate};
use crate::error::{Error, Result};
use crate::range::DateRange;

static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-[Qq]([1-4])$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)[dD]$").unwrap());
static RE_BETWEEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap());

/// A span of time to inspect coverage over, as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u8),
    /// The last N days up to now.
    Rolling(u32),
    /// Whole days from the first date through the second.
    Between(NaiveDate, NaiveDate),
}

fn bad(s: &str) -> Error {
    Error::WindowParse(format!("unrecognized window: {s}"))
}

fn num<T: FromStr>(s: &str, raw: &str) -> Result<T> {
    s.parse().map_err(|_| bad(raw))
}

fn date(s: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad(raw))
}

impl Window {
    /// Parse a window string.
    ///
    /// Supported formats:
    /// - `2025`: year
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `30d`: rolling last N days
    /// - `2025-01-01..2025-02-15`: explicit days, both inclusive
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(caps) = RE_ROLLING.captures(s) {
            return Ok(Window::Rolling(num(&caps[1], s)?));
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Window::Year(year));
            }
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            return Ok(Window::Quarter(num(&caps[1], s)?, num(&caps[2], s)?));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let month: u8 = num(&caps[2], s)?;
            if (1..=12).contains(&month) {
                return Ok(Window::Month(num(&caps[1], s)?, month));
            }
        }

        if let Some(caps) = RE_BETWEEN.captures(s) {
            let from = date(&caps[1], s)?;
            let to = date(&caps[2], s)?;
            if from > to {
                return Err(Error::WindowParse(format!("window ends before it starts: {s}")));
            }
            return Ok(Window::Between(from, to));
        }

        Err(bad(s))
    }

    /// The window as an inclusive range of instants. Rolling windows end at `now`.
    pub fn to_range(&self, now: DateTime<Utc>) -> Result<DateRange> {
        let ymd = |y: i32, m: u32, d: u32| {
            NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| Error::WindowParse(self.to_string()))
        };
        let last = |y: i32, m: u32| {
            last_day_of_month(y, m).ok_or_else(|| Error::WindowParse(self.to_string()))
        };

        let (from, to) = match *self {
            Window::Year(y) => (ymd(y, 1, 1)?, ymd(y, 12, 31)?),
            Window::Quarter(y, q) => {
                let first_month = (q as u32 - 1) * 3 + 1;
                (ymd(y, first_month, 1)?, last(y, first_month + 2)?)
            }
            Window::Month(y, m) => (ymd(y, m as u32, 1)?, last(y, m as u32)?),
            Window::Rolling(days) => {
                let end = truncate(now);
                let start = TimeDelta::try_days(days as i64)
                    .and_then(|span| end.checked_sub_signed(span))
                    .ok_or_else(|| {
                        Error::WindowParse(format!("{self} reaches past the earliest representable date"))
                    })?;
                return DateRange::new(start, end);
            }
            Window::Between(from, to) => (from, to),
        };
        DateRange::new(start_of_day(from), end_of_day(to))
    }
}

impl FromStr for Window {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Window::parse(s)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Year(y) => write!(f, "{y}"),
            Window::Quarter(y, q) => write!(f, "{y}-Q{q}"),
            Window::Month(y, m) => write!(f, "{y}-{m:02}"),
            Window::Rolling(n) => write!(f, "{n}d"),
            Window::Between(a, b) => write!(f, "{a}..{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(Window::parse("2025").unwrap(), Window::Year(2025));
        assert_eq!(Window::parse("2025-Q3").unwrap(), Window::Quarter(2025, 3));
        assert_eq!(Window::parse("2025-02").unwrap(), Window::Month(2025, 2));
        assert_eq!(Window::parse(" 30d ").unwrap(), Window::Rolling(30));
        assert_eq!(
            "2025-01-01..2025-02-15".parse::<Window>().unwrap(),
            Window::Between(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 15).unwrap()
            )
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "2025-13", "2025-Q5", "abc", "2025-02-30..2025-03-01", "2025-03-02..2025-03-01"] {
            assert!(
                matches!(Window::parse(bad), Err(Error::WindowParse(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_ranges() {
        let now = at(2025, 6, 15, 12, 30, 0);

        let q1 = Window::Quarter(2025, 1).to_range(now).unwrap();
        assert_eq!(q1.start, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(q1.end, at(2025, 3, 31, 23, 59, 59));

        let feb = Window::Month(2024, 2).to_range(now).unwrap();
        assert_eq!(feb.end, at(2024, 2, 29, 23, 59, 59));

        let rolling = Window::Rolling(7).to_range(now).unwrap();
        assert_eq!(rolling.start, at(2025, 6, 8, 12, 30, 0));
        assert_eq!(rolling.end, now);
    }

    #[test]
    fn test_rolling_past_representable_dates_is_an_error() {
        let window = Window::parse("1000000000d").unwrap();
        assert!(matches!(window.to_range(Utc::now()), Err(Error::WindowParse(_))));
        assert!(Window::parse("99999999999d").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for s in ["2025", "2025-Q1", "2025-01", "30d", "2025-01-01..2025-02-15"] {
            assert_eq!(Window::parse(s).unwrap().to_string(), s);
        }
    }
}
