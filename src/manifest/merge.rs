use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::range::DateRange;

/// Result of folding two manifests into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub manifest: Manifest,
    /// The persisted manifest that lost the identity contest, if any.
    pub discarded: Option<Manifest>,
}

/// Result of coalescing a set of manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub keep: Vec<Manifest>,
    pub discard: Vec<Manifest>,
}

/// Two manifests of the same kind that share at least one instant.
/// Equal end/start counts: a zero-width seam is never tolerated.
pub fn touches_or_overlaps(a: &Manifest, b: &Manifest) -> bool {
    if a.kind != b.kind {
        return false;
    }
    let (first, second) = if a.start() <= b.start() { (a, b) } else { (b, a) };
    first.end() >= second.start()
}

/// Fold two manifests of the same kind into one spanning both.
///
/// The smaller persisted identity survives; the larger is reported in
/// `discarded` so the caller can delete it.
pub fn merge(a: &Manifest, b: &Manifest) -> Result<Merged> {
    if a.kind != b.kind {
        return Err(Error::Precondition(format!(
            "cannot merge {} manifest into {} manifest",
            b.kind, a.kind
        )));
    }

    let dates = DateRange {
        start: a.start().min(b.start()),
        end: a.end().max(b.end()),
    };
    let ids = a.ids.union(&b.ids);
    let refreshed_at = match (a.refreshed_at, b.refreshed_at) {
        (Some(x), Some(y)) => Some(x.min(y)),
        _ => None,
    };

    let (id, discarded) = match (a.id, b.id) {
        (Some(x), Some(y)) if x == y => (Some(x), None),
        (Some(x), Some(y)) if x < y => (Some(x), Some(b.clone())),
        (Some(_), Some(y)) => (Some(y), Some(a.clone())),
        (x, y) => (x.or(y), None),
    };

    Ok(Merged {
        manifest: Manifest {
            id,
            kind: a.kind,
            dates,
            ids,
            refreshed_at,
        },
        discarded,
    })
}

/// Coalesce every touching or overlapping pair in `manifests`.
///
/// Used as housekeeping for manifests that reconciliation left side by side.
/// All inputs must share one kind.
pub fn merge_all(mut manifests: Vec<Manifest>) -> Result<MergeOutcome> {
    if let Some(first) = manifests.first() {
        let kind = first.kind;
        if let Some(other) = manifests.iter().find(|m| m.kind != kind) {
            return Err(Error::Precondition(format!(
                "merge_all given mixed kinds {kind} and {}",
                other.kind
            )));
        }
    }

    manifests.sort_by_key(|m| (m.start(), m.id));

    let mut outcome = MergeOutcome::default();
    let mut iter = manifests.into_iter();
    let Some(mut current) = iter.next() else {
        return Ok(outcome);
    };

    for next in iter {
        if touches_or_overlaps(&current, &next) {
            let merged = merge(&current, &next)?;
            outcome.discard.extend(merged.discarded);
            current = merged.manifest;
        } else {
            outcome.keep.push(std::mem::replace(&mut current, next));
        }
    }
    outcome.keep.push(current);

    Ok(outcome)
}
