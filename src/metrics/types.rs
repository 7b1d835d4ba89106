use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manifest::ItemKind;
use crate::range::DateRange;

/// How much of a window has been mirrored for one item kind.
#[derive(Debug, Clone, Serialize)]
pub struct KindAvailability {
    pub kind: ItemKind,
    pub window: DateRange,
    /// 0.0 (nothing mirrored) to 1.0 (fully mirrored).
    pub fraction: f64,
    pub manifest_count: u64,
    pub gap_count: u64,
    /// Seconds of the window's past portion not yet covered.
    pub missing_secs: i64,
}

/// Stored coverage for one item kind.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageSummary {
    pub kind: ItemKind,
    pub manifest_count: u64,
    pub covered_secs: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    /// Manifests never re-validated for mutations.
    pub never_refreshed: u64,
}

/// Coverage across every kind plus when each kind last finished a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatus {
    pub kinds: Vec<CoverageSummary>,
    /// Kind name to completion time of its latest successful run.
    pub last_synced: std::collections::BTreeMap<String, String>,
}
