use chrono::{DateTime, Duration, Utc};

use crate::date_util::resolution;
use crate::manifest::Manifest;
use crate::order::{Boundary, Order};
use crate::range::DateRange;

/// First instant not yet covered once the walk has reached `cursor`.
fn first_uncovered(cursor: &Boundary) -> DateTime<Utc> {
    match cursor {
        Boundary::Timestamp(ts) => *ts,
        Boundary::Manifest(m) => m.end() + resolution(),
    }
}

/// Given a window and the manifests on file for one kind, find the orders
/// that still need fetching.
///
/// Orders come back ascending and non-overlapping; together with the
/// manifests they cover `window` exactly. Manifests outside the window are
/// ignored and manifests nested inside an earlier one are skipped.
pub fn compute_gaps(manifests: &[Manifest], window: &DateRange) -> Vec<Order> {
    let mut sorted: Vec<&Manifest> = manifests
        .iter()
        .filter(|m| m.dates.overlaps(window))
        .collect();
    sorted.sort_by_key(|m| (m.start(), m.id));

    let mut gaps = Vec::new();
    let mut cursor = Boundary::Timestamp(window.start);

    for manifest in sorted {
        if let Boundary::Manifest(current) = &cursor {
            if manifest.end() <= current.end() {
                continue;
            }
        }

        let next = Boundary::Manifest(manifest.clone());
        if first_uncovered(&cursor) < manifest.start() {
            gaps.push(Order {
                lower: std::mem::replace(&mut cursor, next),
                upper: Boundary::Manifest(manifest.clone()),
            });
        } else {
            cursor = next;
        }
    }

    if cursor.date_as_lower() < window.end && first_uncovered(&cursor) <= window.end {
        gaps.push(Order {
            lower: cursor,
            upper: Boundary::Timestamp(window.end),
        });
    }

    gaps
}

/// Cut any order longer than `max_span` into consecutive pieces of at most
/// `max_span`. The first piece keeps the original lower boundary and the
/// last keeps the original upper boundary; cut points are raw timestamps.
pub fn split_long_gaps(gaps: Vec<Order>, max_span: Duration) -> Vec<Order> {
    if max_span <= Duration::zero() {
        return gaps;
    }

    let mut out = Vec::with_capacity(gaps.len());
    for order in gaps {
        if order.duration() <= max_span {
            out.push(order);
            continue;
        }

        let upper_date = order.upper_date();
        let mut cut = order.lower_date() + max_span;
        let (mut lower, upper) = order.into_boundaries();
        while cut < upper_date {
            out.push(Order {
                lower: std::mem::replace(&mut lower, Boundary::Timestamp(cut)),
                upper: Boundary::Timestamp(cut),
            });
            cut += max_span;
        }
        out.push(Order { lower, upper });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ItemKind;
    use crate::range::IdRange;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    fn manifest(id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Manifest {
        Manifest::new(ItemKind::Approval, DateRange::new(start, end).unwrap(), IdRange::empty())
            .with_id(id)
    }

    fn window() -> DateRange {
        DateRange::new(d(2023, 1, 1), d(2023, 1, 10)).unwrap()
    }

    fn spans(gaps: &[Order]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        gaps.iter().map(|g| (g.lower_date(), g.upper_date())).collect()
    }

    #[test]
    fn test_no_manifests() {
        let gaps = compute_gaps(&[], &window());
        assert_eq!(spans(&gaps), vec![(d(2023, 1, 1), d(2023, 1, 10))]);
        assert!(!gaps[0].lower().is_manifest());
        assert!(!gaps[0].upper().is_manifest());
    }

    #[test]
    fn test_manifest_in_middle() {
        let m = manifest(1, d(2023, 1, 3), d(2023, 1, 5));
        let gaps = compute_gaps(&[m.clone()], &window());
        assert_eq!(
            spans(&gaps),
            vec![(d(2023, 1, 1), d(2023, 1, 3)), (d(2023, 1, 5), d(2023, 1, 10))]
        );
        assert_eq!(gaps[0].upper().manifest(), Some(&m));
        assert_eq!(gaps[1].lower().manifest(), Some(&m));
    }

    #[test]
    fn test_fully_covered() {
        let m = manifest(1, d(2022, 12, 20), d(2023, 1, 20));
        assert!(compute_gaps(&[m], &window()).is_empty());
    }

    #[test]
    fn test_manifest_straddling_window_start() {
        let m = manifest(1, d(2022, 12, 20), d(2023, 1, 4));
        let gaps = compute_gaps(&[m], &window());
        assert_eq!(spans(&gaps), vec![(d(2023, 1, 4), d(2023, 1, 10))]);
        assert!(gaps[0].lower().is_manifest());
    }

    #[test]
    fn test_nested_and_overlapping_manifests() {
        let outer = manifest(1, d(2023, 1, 2), d(2023, 1, 6));
        let nested = manifest(2, d(2023, 1, 3), d(2023, 1, 4));
        let overlapping = manifest(3, d(2023, 1, 5), d(2023, 1, 7));
        let gaps = compute_gaps(&[nested, overlapping.clone(), outer], &window());
        assert_eq!(
            spans(&gaps),
            vec![(d(2023, 1, 1), d(2023, 1, 2)), (d(2023, 1, 7), d(2023, 1, 10))]
        );
        assert_eq!(gaps[1].lower().manifest(), Some(&overlapping));
    }

    #[test]
    fn test_adjacent_manifests_leave_no_gap() {
        let jan = manifest(1, d(2023, 1, 1), d(2023, 2, 1) - resolution());
        let feb = manifest(2, d(2023, 2, 1), d(2023, 2, 10));
        let window = DateRange::new(d(2023, 1, 1), d(2023, 2, 10)).unwrap();
        assert!(compute_gaps(&[jan, feb], &window).is_empty());
    }

    #[test]
    fn test_manifests_outside_window_ignored() {
        let before = manifest(1, d(2022, 11, 1), d(2022, 11, 5));
        let after = manifest(2, d(2023, 3, 1), d(2023, 3, 5));
        let gaps = compute_gaps(&[before, after], &window());
        assert_eq!(spans(&gaps), vec![(d(2023, 1, 1), d(2023, 1, 10))]);
    }

    #[test]
    fn test_zero_width_window_has_no_gap() {
        let w = DateRange::instant(d(2023, 1, 1));
        assert!(compute_gaps(&[], &w).is_empty());
    }

    #[test]
    fn test_split_long_gaps() {
        let top = manifest(1, d(2023, 1, 25), d(2023, 1, 31));
        let gap = Order::new(Boundary::Timestamp(d(2023, 1, 1)), Boundary::Manifest(top.clone())).unwrap();
        let pieces = split_long_gaps(vec![gap], Duration::days(10));
        assert_eq!(
            spans(&pieces),
            vec![
                (d(2023, 1, 1), d(2023, 1, 11)),
                (d(2023, 1, 11), d(2023, 1, 21)),
                (d(2023, 1, 21), d(2023, 1, 25)),
            ]
        );
        assert!(!pieces[0].lower().is_manifest());
        assert!(!pieces[1].upper().is_manifest());
        assert_eq!(pieces[2].upper().manifest(), Some(&top));
    }

    #[test]
    fn test_split_leaves_short_gaps_alone() {
        let gap = Order::between(d(2023, 1, 1), d(2023, 1, 11)).unwrap();
        let pieces = split_long_gaps(vec![gap.clone()], Duration::days(10));
        assert_eq!(pieces, vec![gap]);
    }
}
