//! Folding fetched pages back into the coverage record.
//!
//! Precondition: a page's items arrive newest first (descending timestamp).
//! The worker paginates an order from its upper edge downwards, so after
//! each page everything between the oldest item seen and the upper edge is
//! known. Bucketing and boundary selection below depend on this ordering;
//! input that breaks it is rejected rather than re-sorted.

mod bucket;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date_util::{format_ts, same_month, truncate};
use crate::error::{Error, Result};
use crate::manifest::merge::merge;
use crate::manifest::{ItemKind, Manifest};
use crate::order::{Boundary, Order};
use crate::range::DateRange;

use bucket::MonthBuckets;

/// The identity and position of one item returned by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
}

/// What came back from one attempt to fill an order.
#[derive(Debug, Clone)]
pub struct OrderResults {
    pub kind: ItemKind,
    pub order: Order,
    /// Newest first.
    pub items: Vec<FetchedItem>,
    /// The remote returned fewer items than requested: no pages remain.
    pub exhausted: bool,
    /// The order's upper edge is a real edge of the data, not an artificial
    /// window edge that newer items may still appear behind.
    pub reached_top: bool,
    /// The query reached down to the order's lower edge.
    pub reached_bottom: bool,
}

/// Writes needed to fold one [`OrderResults`] into storage, plus what is
/// left of the order afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub discard: Vec<Manifest>,
    pub save: Vec<Manifest>,
    /// `None` once both edges have closed and the order is filled.
    pub remaining: Option<Order>,
}

impl ReconcileOutcome {
    fn unchanged(order: &Order) -> Self {
        Self {
            discard: Vec::new(),
            save: Vec::new(),
            remaining: Some(order.clone()),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.discard.is_empty() && self.save.is_empty()
    }
}

fn validate(results: &OrderResults) -> Result<()> {
    let order = &results.order;
    if let Some(m) = order.manifests().find(|m| m.kind != results.kind) {
        return Err(Error::Precondition(format!(
            "{} order leans on {m}",
            results.kind
        )));
    }

    let range = order.date_range();
    if range.start > range.end {
        return Err(Error::InvalidOrder(format!("inverted order {range}")));
    }

    for pair in results.items.windows(2) {
        if let [newer, older] = pair {
            if newer.timestamp < older.timestamp {
                return Err(Error::Precondition(format!(
                    "items not in descending order: {} ({}) before {} ({})",
                    newer.id,
                    format_ts(newer.timestamp),
                    older.id,
                    format_ts(older.timestamp)
                )));
            }
        }
    }

    if let Some(stray) = results
        .items
        .iter()
        .find(|item| !range.contains(truncate(item.timestamp)))
    {
        return Err(Error::Precondition(format!(
            "item {} at {} lies outside order {range}",
            stray.id,
            format_ts(stray.timestamp)
        )));
    }

    Ok(())
}

/// Decide which manifests to save and discard after fetching a page of `results.order`.
///
/// The upper edge is pinned to the order's upper date when it is a manifest
/// or `reached_top` is set; otherwise coverage stops at the newest item.
/// The lower edge is pinned to the order's lower date only when the fetch is
/// exhausted and the edge is a manifest or `reached_bottom` is set; otherwise
/// coverage stops at the oldest item. An oldest item on a lower manifest's
/// last instant merges into it regardless. With no items and nothing pinned the
/// call is a no-op: nothing is ever claimed without evidence.
///
/// Candidate manifests are cut at calendar-month boundaries (UTC). A
/// candidate in the same month as a neighbouring manifest is merged into it,
/// which is how an existing manifest grows in place.
pub fn reconcile(results: &OrderResults) -> Result<ReconcileOutcome> {
    validate(results)?;

    let order = &results.order;
    let items: Vec<FetchedItem> = results
        .items
        .iter()
        .map(|item| FetchedItem {
            id: item.id,
            timestamp: truncate(item.timestamp),
        })
        .collect();

    let upper_pinned = order.upper().is_manifest() || results.reached_top;
    let lower_pinned =
        results.exhausted && (order.lower().is_manifest() || results.reached_bottom);

    let high = match (upper_pinned, items.first()) {
        (true, _) => order.upper_date(),
        (false, Some(newest)) => newest.timestamp,
        (false, None) => return Ok(ReconcileOutcome::unchanged(order)),
    };
    let low = match (lower_pinned, items.last()) {
        (true, _) => order.lower_date(),
        (false, Some(oldest)) => oldest.timestamp,
        (false, None) => return Ok(ReconcileOutcome::unchanged(order)),
    };

    let span = DateRange::new(low, high)?;
    let mut candidates = MonthBuckets::build(span, &items).into_candidates(results.kind);
    let mut discard = Vec::new();

    if let Boundary::Manifest(upper) = order.upper() {
        if let Some(newest) = candidates.last_mut() {
            if same_month(newest.start(), upper.start()) {
                let merged = merge(upper, newest)?;
                discard.extend(merged.discarded);
                *newest = merged.manifest;
            }
        }
    }

    // An oldest item sitting on the lower manifest's last instant closes the
    // lower edge even when the fetch is not exhausted.
    let mut lower_closed = lower_pinned;
    if let Boundary::Manifest(lower) = order.lower() {
        if let Some(oldest) = candidates.first_mut() {
            let touching = oldest.start() <= lower.end();
            if touching || (lower_pinned && same_month(oldest.end(), lower.end())) {
                let merged = merge(lower, oldest)?;
                discard.extend(merged.discarded);
                *oldest = merged.manifest;
                lower_closed = true;
            }
        }
    }

    let remaining = match (lower_closed, candidates.first(), candidates.last()) {
        (true, _, _) if upper_pinned => None,
        (true, _, Some(newest)) => Some(Order::new(
            Boundary::Manifest(newest.clone()),
            order.upper().clone(),
        )?),
        (false, Some(oldest), _) => Some(Order::new(
            order.lower().clone(),
            Boundary::Manifest(oldest.clone()),
        )?),
        _ => return Err(Error::Other(format!("no candidates for span {span}"))),
    };

    let save: Vec<Manifest> = candidates
        .into_iter()
        .filter(|c| !order.manifests().any(|existing| existing == c))
        .collect();

    log::debug!(
        "reconciled {} {order}: {} items, save {}, discard {}, {}",
        results.kind,
        items.len(),
        save.len(),
        discard.len(),
        if remaining.is_some() { "open" } else { "filled" }
    );

    Ok(ReconcileOutcome {
        discard,
        save,
        remaining,
    })
}
