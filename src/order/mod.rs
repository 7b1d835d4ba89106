pub mod gap;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::date_util::format_ts;
use crate::error::{Error, Result};
use crate::manifest::{ItemKind, Manifest};
use crate::range::{DateRange, IdRange};

/// One edge of an order: either a raw timestamp (the edge of known data or
/// an artificial window edge) or an adjacent manifest acting as a hard wall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Boundary {
    Timestamp(DateTime<Utc>),
    Manifest(Manifest),
}

impl Boundary {
    /// The instant this boundary contributes when it sits below the gap.
    pub fn date_as_lower(&self) -> DateTime<Utc> {
        match self {
            Boundary::Timestamp(ts) => *ts,
            Boundary::Manifest(m) => m.end(),
        }
    }

    /// The instant this boundary contributes when it sits above the gap.
    pub fn date_as_upper(&self) -> DateTime<Utc> {
        match self {
            Boundary::Timestamp(ts) => *ts,
            Boundary::Manifest(m) => m.start(),
        }
    }

    pub fn id_as_lower(&self) -> Option<i64> {
        match self {
            Boundary::Timestamp(_) => None,
            Boundary::Manifest(m) => m.ids.upper,
        }
    }

    pub fn id_as_upper(&self) -> Option<i64> {
        match self {
            Boundary::Timestamp(_) => None,
            Boundary::Manifest(m) => m.ids.lower,
        }
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            Boundary::Timestamp(_) => None,
            Boundary::Manifest(m) => Some(m),
        }
    }

    pub fn is_manifest(&self) -> bool {
        matches!(self, Boundary::Manifest(_))
    }
}

/// A stretch of time that still has to be fetched for one item kind.
/// Computed fresh from the manifests on file; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    lower: Boundary,
    upper: Boundary,
}

impl Order {
    pub fn new(lower: Boundary, upper: Boundary) -> Result<Self> {
        let (lo, hi) = (lower.date_as_lower(), upper.date_as_upper());
        if lo > hi {
            return Err(Error::InvalidOrder(format!(
                "lower edge {} is after upper edge {}",
                format_ts(lo),
                format_ts(hi)
            )));
        }
        Ok(Self { lower, upper })
    }

    /// An order between two raw timestamps.
    pub fn between(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Result<Self> {
        Self::new(Boundary::Timestamp(lower), Boundary::Timestamp(upper))
    }

    pub fn lower(&self) -> &Boundary {
        &self.lower
    }

    pub fn upper(&self) -> &Boundary {
        &self.upper
    }

    pub fn into_boundaries(self) -> (Boundary, Boundary) {
        (self.lower, self.upper)
    }

    pub fn lower_date(&self) -> DateTime<Utc> {
        self.lower.date_as_lower()
    }

    pub fn upper_date(&self) -> DateTime<Utc> {
        self.upper.date_as_upper()
    }

    pub fn lower_id(&self) -> Option<i64> {
        self.lower.id_as_lower()
    }

    pub fn upper_id(&self) -> Option<i64> {
        self.upper.id_as_upper()
    }

    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.lower_date(),
            end: self.upper_date(),
        }
    }

    /// Ids strictly between the neighbouring manifests, as far as they are known.
    pub fn id_range(&self) -> IdRange {
        IdRange {
            lower: self.lower_id(),
            upper: self.upper_id(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.upper_date() - self.lower_date()
    }

    /// Every manifest this order leans on, lower first.
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.lower.manifest().into_iter().chain(self.upper.manifest())
    }

    /// Kind of the neighbouring manifests, if any neighbour is a manifest.
    pub fn kind(&self) -> Option<ItemKind> {
        self.manifests().next().map(|m| m.kind)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_range())?;
        if let Some(ids) = self.id_range().to_query() {
            write!(f, " ids {ids}")?;
        }
        Ok(())
    }
}
