pub mod merge;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::range::{DateRange, IdRange};

/// One tag per remote collection being mirrored. Coverage never crosses kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Approval,
    Flag,
    Ticket,
    PostVersion,
    Permit,
    Comment,
}

impl ItemKind {
    pub const ALL: [ItemKind; 6] = [
        ItemKind::Approval,
        ItemKind::Flag,
        ItemKind::Ticket,
        ItemKind::PostVersion,
        ItemKind::Permit,
        ItemKind::Comment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Approval => "approval",
            ItemKind::Flag => "flag",
            ItemKind::Ticket => "ticket",
            ItemKind::PostVersion => "post_version",
            ItemKind::Permit => "permit",
            ItemKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ItemKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// One contiguous, already-fetched span of a single item kind.
///
/// `id` is the storage identity and stays `None` until the manifest has been
/// saved once. `refreshed_at` records the last time the span was re-validated
/// for mutations, not merely for existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: Option<i64>,
    pub kind: ItemKind,
    pub dates: DateRange,
    pub ids: IdRange,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Manifest {
    /// An unsaved manifest.
    pub fn new(kind: ItemKind, dates: DateRange, ids: IdRange) -> Self {
        Self {
            id: None,
            kind,
            dates,
            ids,
            refreshed_at: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.dates.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.dates.end
    }

    /// Same kind, same spans. Identity and refresh state are ignored.
    pub fn same_coverage(&self, other: &Manifest) -> bool {
        self.kind == other.kind && self.dates == other.dates && self.ids == other.ids
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}#{id} [{}]", self.kind, self.dates),
            None => write!(f, "{}#new [{}]", self.kind, self.dates),
        }
    }
}
