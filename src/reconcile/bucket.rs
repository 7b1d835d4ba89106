use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::date_util::{month_end, month_start, next_month_start};
use crate::manifest::{ItemKind, Manifest};
use crate::range::{DateRange, IdRange};
use crate::reconcile::FetchedItem;

/// Fetched items grouped by calendar month, keyed by month start.
///
/// Every month touched by the covered span gets an entry, including months
/// with no items, so the months at either edge can always be found.
#[derive(Debug)]
pub(crate) struct MonthBuckets {
    span: DateRange,
    months: BTreeMap<DateTime<Utc>, Vec<i64>>,
}

impl MonthBuckets {
    pub(crate) fn build(span: DateRange, items: &[FetchedItem]) -> Self {
        let mut months = BTreeMap::new();
        let mut cursor = month_start(span.start);
        while cursor <= span.end {
            months.insert(cursor, Vec::new());
            cursor = next_month_start(cursor);
        }

        for item in items {
            months
                .entry(month_start(item.timestamp))
                .or_insert_with(Vec::new)
                .push(item.id);
        }

        Self { span, months }
    }

    /// One manifest per month, oldest first. Each covers its calendar month
    /// clipped to the covered span; its id span covers the month's items.
    pub(crate) fn into_candidates(self, kind: ItemKind) -> Vec<Manifest> {
        let span = self.span;
        self.months
            .into_iter()
            .map(|(start, ids)| {
                let dates = DateRange {
                    start: start.max(span.start),
                    end: month_end(start).min(span.end),
                };
                Manifest::new(kind, dates, IdRange::spanning(ids))
            })
            .collect()
    }
}
