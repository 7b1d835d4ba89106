use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::date_util::{self, format_ts};
use crate::error::{Error, Result};

/// Render an optionally open range in the remote search convention:
/// `X..Y` when both ends are known, `>X` or `<Y` when only one is.
pub fn render_range<T: fmt::Display>(lower: Option<T>, upper: Option<T>) -> Option<String> {
    match (lower, upper) {
        (Some(l), Some(u)) => Some(format!("{l}..{u}")),
        (Some(l), None) => Some(format!(">{l}")),
        (None, Some(u)) => Some(format!("<{u}")),
        (None, None) => None,
    }
}

/// A date range [start, end] inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange(format!(
                "start {} is after end {}",
                format_ts(start),
                format_ts(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// A zero-width range holding a single instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the two ranges share at least one instant.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The shared part of two ranges, if any.
    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(DateRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Widen to whole UTC days.
    pub fn expand_to_days(&self) -> DateRange {
        DateRange {
            start: date_util::start_of_day(self.start.date_naive()),
            end: date_util::end_of_day(self.end.date_naive()),
        }
    }

    /// Widen to whole calendar months.
    pub fn expand_to_months(&self) -> DateRange {
        DateRange {
            start: date_util::month_start(self.start),
            end: date_util::month_end(self.end),
        }
    }

    pub fn to_query(&self) -> String {
        format!("{}..{}", format_ts(self.start), format_ts(self.end))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

/// An identifier range [lower, upper] inclusive. Either end may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl IdRange {
    pub fn new(lower: Option<i64>, upper: Option<i64>) -> Result<Self> {
        if let (Some(l), Some(u)) = (lower, upper) {
            if l > u {
                return Err(Error::InvalidRange(format!("id {l} is above id {u}")));
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Smallest range holding every id in `ids`; empty for an empty input.
    pub fn spanning(ids: impl IntoIterator<Item = i64>) -> Self {
        ids.into_iter().fold(Self::empty(), |acc, id| {
            acc.union(&IdRange {
                lower: Some(id),
                upper: Some(id),
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Open ends are unbounded.
    pub fn contains(&self, id: i64) -> bool {
        self.lower.is_none_or(|l| l <= id) && self.upper.is_none_or(|u| id <= u)
    }

    pub fn union(&self, other: &IdRange) -> IdRange {
        fn pick(a: Option<i64>, b: Option<i64>, f: fn(i64, i64) -> i64) -> Option<i64> {
            match (a, b) {
                (Some(x), Some(y)) => Some(f(x, y)),
                (x, y) => x.or(y),
            }
        }
        IdRange {
            lower: pick(self.lower, other.lower, i64::min),
            upper: pick(self.upper, other.upper, i64::max),
        }
    }

    /// `None` when the range places no constraint.
    pub fn to_query(&self) -> Option<String> {
        render_range(self.lower, self.upper)
    }
}
